//! Start-up wiring: database, stores, event worker and services.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use optimus_core::models::resource::Store;
use optimus_db::DbManager;
use optimus_db::repository::{SurrealBackupRepository, SurrealResourceRepository};
use optimus_event::{EventHandler, EventMetrics, LogWriter, Worker};
use optimus_resource::{BackupService, DeployMetrics, ResourceManager, ResourceService};
use optimus_store::bigquery::{BigqueryStore, ClientProvider};
use prometheus::Registry;
use surrealdb::engine::any::Any;
use tracing::info;

use crate::config::ServerConfig;
use crate::lookup::{ConfigSecrets, ConfigTenants};

pub type Repo = SurrealResourceRepository<Any>;
pub type Resources = ResourceService<Repo, ConfigTenants>;
pub type Backups = BackupService<Repo, SurrealBackupRepository<Any>>;

/// Shared state of every request handler.
pub struct AppState {
    pub resources: Resources,
    pub backups: Backups,
    pub deploy_timeout: Duration,
    pub registry: Registry,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("deploy_timeout", &self.deploy_timeout)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Connects to the database and builds the services.
    ///
    /// The returned worker, if any, delivers change events and must be
    /// closed on shutdown so buffered events are flushed.
    pub async fn build(
        config: &ServerConfig,
        clients: Arc<dyn ClientProvider>,
    ) -> anyhow::Result<(Self, Option<Worker>)> {
        // 1. Database and schema.
        let db = DbManager::connect(&config.db_config())
            .await
            .context("connecting to the database")?;
        optimus_db::run_migrations(db.client())
            .await
            .context("running migrations")?;
        let repo = Arc::new(SurrealResourceRepository::new(db.client().clone()));

        // 2. Stores.
        let bigquery = BigqueryStore::new(
            ConfigSecrets::new(config.secrets.clone()),
            clients,
            config.reconcile.concurrency,
        );
        let mut manager = ResourceManager::new(repo.clone());
        manager.register_store(Store::Bigquery, Arc::new(bigquery));
        let manager = Arc::new(manager);

        // 3. Metrics and events.
        let registry = Registry::new();
        let event_metrics = EventMetrics::new(&registry)?;
        let deploy_metrics = DeployMetrics::new(&registry)?;
        let (worker, events) = if config.publisher.enabled {
            let (worker, handler) = Worker::start(
                Box::new(LogWriter::default()),
                config.worker_config(),
                event_metrics,
            );
            (Some(worker), handler)
        } else {
            info!("event publishing disabled");
            (None, EventHandler::disabled(event_metrics))
        };

        // 4. Services.
        let tenants = ConfigTenants::new(config.known_tenants()?);
        let resources = ResourceService::new(
            repo.clone(),
            manager.clone(),
            tenants,
            events,
            deploy_metrics,
        );
        let backups = BackupService::new(
            repo,
            SurrealBackupRepository::new(db.client().clone()),
            manager,
        );

        let state = Self {
            resources,
            backups,
            deploy_timeout: config.serve.deploy_timeout,
            registry,
        };
        Ok((state, worker))
    }
}
