//! Shared fixtures: an in-memory database, a recording data store and a
//! fixed tenant list.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use optimus_core::models::backup::{Backup, BackupResult};
use optimus_core::models::resource::{Resource, Status, Store};
use optimus_core::models::tenant::Tenant;
use optimus_core::repository::{ResourceRepository, TenantDetailsGetter};
use optimus_core::{MultiError, OptimusError, OptimusResult};
use optimus_db::repository::{SurrealBackupRepository, SurrealResourceRepository};
use optimus_event::proto::EventMessage;
use optimus_event::{ChannelWriter, EventMetrics, Worker, WorkerConfig};
use optimus_resource::{BackupService, DeployMetrics, ResourceManager, ResourceService};
use optimus_store::DataStore;
use optimus_store::bigquery::{backup, naming, spec};
use prometheus::Registry;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use tokio::sync::mpsc;

/// Records every call and fails the names listed in `failing`.
#[derive(Default)]
pub struct FakeStore {
    pub failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn outcome(&self, res: &Resource) -> OptimusResult<()> {
        if self.failing.contains(res.full_name()) {
            return Err(OptimusError::internal(
                "resource_bigquery",
                format!("backend rejected {}", res.full_name()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for FakeStore {
    async fn create(&self, res: &Resource) -> OptimusResult<()> {
        self.record(format!("create {}", res.full_name()));
        self.outcome(res)
    }

    async fn update(&self, res: &Resource) -> OptimusResult<()> {
        self.record(format!("update {}", res.full_name()));
        self.outcome(res)
    }

    async fn batch_update(&self, resources: &mut [Resource]) -> OptimusResult<()> {
        let mut me = MultiError::new("error while processing batch update");
        for res in resources.iter_mut() {
            if !matches!(res.status(), Status::ToCreate | Status::ToUpdate) {
                continue;
            }
            self.record(format!("{} {}", res.status(), res.full_name()));
            match self.outcome(res) {
                Ok(()) => {
                    me.append_result(res.mark_success());
                }
                Err(err) => {
                    me.append_result(res.mark_failure());
                    me.append(err);
                }
            }
        }
        me.into_result()
    }

    fn validate(&self, res: &Resource) -> OptimusResult<()> {
        naming::validate_name(res.kind(), res.full_name())?;
        spec::validate_spec(res)
    }

    fn get_urn(&self, res: &Resource) -> OptimusResult<String> {
        naming::urn_for(res.kind(), res.full_name())
    }

    fn backup_plan(&self, _backup: &Backup, resources: &[Resource]) -> BackupResult {
        let (tables, ignored) = backup::plan(resources);
        BackupResult {
            resource_names: tables.iter().map(|r| r.full_name().to_string()).collect(),
            ignored_resources: ignored,
        }
    }

    async fn backup(&self, backup: &Backup, resources: &[Resource]) -> OptimusResult<BackupResult> {
        let (tables, ignored) = backup::plan(resources);
        let mut resource_names = Vec::new();
        for table in tables {
            let source = naming::table_name_for(table.kind(), table.full_name())?;
            let name = backup::destination_table_name(&source, backup);
            self.record(format!("backup {} -> {name}", table.full_name()));
            resource_names.push(name);
        }
        Ok(BackupResult {
            resource_names,
            ignored_resources: ignored,
        })
    }
}

pub struct KnownTenants(pub Vec<Tenant>);

impl TenantDetailsGetter for KnownTenants {
    async fn ensure_exists(&self, tenant: &Tenant) -> OptimusResult<()> {
        if self.0.contains(tenant) {
            Ok(())
        } else {
            Err(OptimusError::not_found("tenant", format!("tenant {tenant} not found")))
        }
    }
}

pub type Repo = SurrealResourceRepository<Db>;

pub struct Harness {
    pub service: ResourceService<Repo, KnownTenants>,
    pub backups: BackupService<Repo, SurrealBackupRepository<Db>>,
    pub repo: Arc<Repo>,
    pub store: Arc<FakeStore>,
    pub worker: Worker,
    pub events: mpsc::UnboundedReceiver<Vec<u8>>,
    pub metrics: DeployMetrics,
}

impl Harness {
    /// Flushes the event worker and returns everything published so far.
    pub async fn published(&mut self) -> Vec<EventMessage> {
        self.worker.flush().await.unwrap();
        let mut out = Vec::new();
        while let Ok(bytes) = self.events.try_recv() {
            out.push(optimus_event::event::decode(&bytes).unwrap());
        }
        out
    }

    /// Stored row of `full_name` in the default tenant.
    pub async fn repo_row(&self, full_name: &str) -> Resource {
        self.repo
            .read_by_full_name(&tenant(), Store::Bigquery, full_name)
            .await
            .unwrap()
    }
}

pub fn tenant() -> Tenant {
    Tenant::new("t-optimus", "ns").unwrap()
}

pub async fn setup(store: FakeStore) -> Harness {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    optimus_db::run_migrations(&db).await.unwrap();

    let repo = Arc::new(SurrealResourceRepository::new(db.clone()));
    let store = Arc::new(store);
    let mut manager = ResourceManager::new(repo.clone());
    manager.register_store(Store::Bigquery, store.clone());
    let manager = Arc::new(manager);

    let (writer, events) = ChannelWriter::new();
    let (worker, handler) = Worker::start(
        Box::new(writer),
        WorkerConfig::default(),
        EventMetrics::new(&Registry::new()).unwrap(),
    );
    let metrics = DeployMetrics::new(&Registry::new()).unwrap();

    let tenants = KnownTenants(vec![tenant(), Tenant::new("t-optimus", "ns-b").unwrap()]);
    let service = ResourceService::new(
        repo.clone(),
        manager.clone(),
        tenants,
        handler,
        metrics.clone(),
    );
    let backups = BackupService::new(repo.clone(), SurrealBackupRepository::new(db), manager);

    Harness {
        service,
        backups,
        repo,
        store,
        worker,
        events,
        metrics,
    }
}
