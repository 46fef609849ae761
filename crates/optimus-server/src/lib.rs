//! Optimus Server: configuration, logging bootstrap and the HTTP binding of
//! the resource and backup services.

pub mod config;
pub mod error;
pub mod logging;
pub mod lookup;
pub mod routes;
pub mod state;

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

pub use config::{Cli, ServerConfig};
pub use state::AppState;

/// Serves the API on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "listening");
    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
