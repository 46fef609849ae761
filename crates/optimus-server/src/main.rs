//! Optimus server entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use optimus_server::config::{Cli, ServerConfig};
use optimus_server::logging::init_logging;
use optimus_server::state::AppState;
use optimus_store::bigquery::rest::RestClientProvider;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load(&cli)?;
    init_logging(config.log_format);

    info!("starting optimus server");

    let clients = Arc::new(RestClientProvider::new(config.rest_config()));
    let (state, worker) = AppState::build(&config, clients).await?;

    let listener = TcpListener::bind(&config.serve.address)
        .await
        .with_context(|| format!("binding {}", config.serve.address))?;
    optimus_server::serve(listener, Arc::new(state), shutdown_signal()).await?;

    if let Some(worker) = worker {
        if let Err(err) = worker.close().await {
            error!(error = %err, "event worker did not shut down cleanly");
        }
    }

    info!("optimus server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
