//! Reconciler behaviour of `BigqueryStore::batch_update` against an
//! in-memory client.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optimus_core::models::resource::{Kind, Metadata, Resource, Status, Store};
use optimus_core::models::tenant::Tenant;
use optimus_core::repository::SecretProvider;
use optimus_core::{ErrorKind, OptimusError, OptimusResult};
use optimus_store::DataStore;
use optimus_store::bigquery::{
    BigqueryStore, Client, ClientProvider, CopyJob, Dataset, ResourceHandle, TableCopier,
    TableName, TableResourceHandle,
};
use pretty_assertions::assert_eq;
use serde_json::json;

#[derive(Default)]
struct Backend {
    existing: HashSet<String>,
    conflicting: HashSet<String>,
    broken: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl Backend {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

struct FakeHandle {
    backend: Arc<Backend>,
    full_name: String,
    table: Option<TableName>,
}

#[async_trait]
impl ResourceHandle for FakeHandle {
    async fn create(&self, _res: &Resource) -> OptimusResult<()> {
        self.backend.record(format!("create {}", self.full_name));
        if self.backend.conflicting.contains(&self.full_name) {
            return Err(OptimusError::already_exists("resource_bigquery", "Already Exists"));
        }
        if self.backend.broken.contains(&self.full_name) {
            return Err(OptimusError::internal("resource_bigquery", "backend error"));
        }
        Ok(())
    }

    async fn update(&self, _res: &Resource) -> OptimusResult<()> {
        self.backend.record(format!("update {}", self.full_name));
        if self.backend.broken.contains(&self.full_name) {
            return Err(OptimusError::internal("resource_bigquery", "backend error"));
        }
        Ok(())
    }

    async fn exists(&self) -> bool {
        self.backend.existing.contains(&self.full_name)
    }
}

struct NoopJob;

#[async_trait]
impl CopyJob for NoopJob {
    async fn wait(&self) -> OptimusResult<()> {
        Ok(())
    }
}

#[async_trait]
impl TableCopier for NoopJob {
    async fn run(&self) -> OptimusResult<Box<dyn CopyJob>> {
        Ok(Box::new(NoopJob))
    }
}

#[async_trait]
impl TableResourceHandle for FakeHandle {
    fn table_name(&self) -> &TableName {
        self.table.as_ref().unwrap()
    }

    fn copier_from(&self, _source: &dyn TableResourceHandle) -> Box<dyn TableCopier> {
        Box::new(NoopJob)
    }

    async fn update_expiry(&self, _name: &str, _expire_at: DateTime<Utc>) -> OptimusResult<()> {
        Ok(())
    }
}

struct FakeClient(Arc<Backend>);

impl FakeClient {
    fn handle(&self, full_name: String, table: Option<TableName>) -> FakeHandle {
        FakeHandle {
            backend: self.0.clone(),
            full_name,
            table,
        }
    }
}

impl Client for FakeClient {
    fn dataset_handle(&self, dataset: &Dataset) -> Box<dyn ResourceHandle> {
        Box::new(self.handle(dataset.full_name(), None))
    }

    fn table_handle(&self, name: &TableName) -> Box<dyn TableResourceHandle> {
        Box::new(self.handle(name.full_name(), Some(name.clone())))
    }

    fn view_handle(&self, name: &TableName) -> Box<dyn ResourceHandle> {
        Box::new(self.handle(name.full_name(), Some(name.clone())))
    }

    fn external_table_handle(&self, name: &TableName) -> Box<dyn ResourceHandle> {
        Box::new(self.handle(name.full_name(), Some(name.clone())))
    }
}

struct FakeProvider(Arc<Backend>);

#[async_trait]
impl ClientProvider for FakeProvider {
    async fn get(&self, credential: &str) -> OptimusResult<Arc<dyn Client>> {
        assert_eq!(credential, "sa-credential");
        Ok(Arc::new(FakeClient(self.0.clone())))
    }
}

struct Secrets {
    present: bool,
}

impl SecretProvider for Secrets {
    async fn get_secret(&self, _tenant: &Tenant, name: &str) -> OptimusResult<String> {
        if self.present {
            Ok("sa-credential".into())
        } else {
            Err(OptimusError::not_found("secret", format!("secret {name} not found")))
        }
    }
}

fn store(backend: &Arc<Backend>) -> BigqueryStore<Secrets> {
    BigqueryStore::new(
        Secrets { present: true },
        Arc::new(FakeProvider(backend.clone())),
        4,
    )
}

fn resource(name: &str, kind: Kind, create: bool) -> Resource {
    let spec = match kind {
        Kind::View => json!({ "view_query": "select 1" }),
        _ => json!({ "description": "test" }),
    };
    let mut res = Resource::new(
        name,
        kind,
        Store::Bigquery,
        Tenant::new("t-optimus", "ns").unwrap(),
        Metadata::default(),
        spec.as_object().cloned().unwrap(),
    )
    .unwrap();
    res.mark_validation_success().unwrap();
    if create {
        res.mark_to_create().unwrap();
    } else {
        res.mark_to_update().unwrap();
    }
    res
}

fn statuses(resources: &[Resource]) -> Vec<Status> {
    resources.iter().map(Resource::status).collect()
}

#[tokio::test]
async fn dataset_is_created_before_its_members() {
    let backend = Arc::new(Backend::default());
    let mut resources = vec![
        resource("t-optimus.playground.orders", Kind::Table, true),
        resource("t-optimus.playground.orders_view", Kind::View, true),
    ];

    store(&backend).batch_update(&mut resources).await.unwrap();

    let calls = backend.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], "create t-optimus.playground");
    assert!(calls.contains(&"create t-optimus.playground.orders".to_string()));
    assert!(calls.contains(&"create t-optimus.playground.orders_view".to_string()));
    assert_eq!(statuses(&resources), vec![Status::Success, Status::Success]);
}

#[tokio::test]
async fn declared_dataset_is_reconciled_in_place() {
    let backend = Arc::new(Backend::default());
    let mut resources = vec![
        resource("t-optimus.playground.orders", Kind::Table, false),
        resource("t-optimus.playground", Kind::Dataset, false),
    ];

    store(&backend).batch_update(&mut resources).await.unwrap();

    assert_eq!(
        backend.calls(),
        vec![
            "update t-optimus.playground".to_string(),
            "update t-optimus.playground.orders".to_string(),
        ]
    );
    assert_eq!(statuses(&resources), vec![Status::Success, Status::Success]);
}

#[tokio::test]
async fn create_of_present_object_counts_as_success() {
    let backend = Arc::new(Backend {
        existing: HashSet::from([
            "t-optimus.playground".to_string(),
            "t-optimus.playground.orders".to_string(),
        ]),
        conflicting: HashSet::from(["t-optimus.playground.events".to_string()]),
        ..Default::default()
    });
    let mut resources = vec![
        resource("t-optimus.playground.orders", Kind::Table, true),
        resource("t-optimus.playground.events", Kind::ExternalTable, true),
    ];

    store(&backend).batch_update(&mut resources).await.unwrap();

    assert_eq!(
        backend.calls(),
        vec!["create t-optimus.playground.events".to_string()]
    );
    assert_eq!(statuses(&resources), vec![Status::Success, Status::Success]);
}

#[tokio::test]
async fn failures_are_isolated_per_resource() {
    let backend = Arc::new(Backend {
        broken: HashSet::from([
            "t-optimus.playground.orders".to_string(),
            "t-optimus.other.users".to_string(),
        ]),
        ..Default::default()
    });
    let mut resources = vec![
        resource("t-optimus.playground.orders", Kind::Table, false),
        resource("t-optimus.playground.payments", Kind::Table, false),
        resource("t-optimus.other.users", Kind::Table, true),
    ];

    let err = store(&backend)
        .batch_update(&mut resources)
        .await
        .unwrap_err();

    assert_eq!(
        statuses(&resources),
        vec![Status::UpdateFailure, Status::Success, Status::CreateFailure]
    );
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(err.leaves().len(), 2);
}

#[tokio::test]
async fn missing_credential_fails_every_pending_resource() {
    let backend = Arc::new(Backend::default());
    let store = BigqueryStore::new(
        Secrets { present: false },
        Arc::new(FakeProvider(backend.clone())),
        4,
    );
    let mut skipped = resource("t-optimus.playground.kept", Kind::Table, false).renewed();
    skipped.mark_validation_success().unwrap();
    skipped.mark_skipped().unwrap();
    let mut resources = vec![
        resource("t-optimus.playground.orders", Kind::Table, true),
        skipped,
    ];

    let err = store.batch_update(&mut resources).await.unwrap_err();

    assert!(backend.calls().is_empty());
    assert_eq!(
        statuses(&resources),
        vec![Status::CreateFailure, Status::Skipped]
    );
    assert!(err.to_string().contains("not able to get secret"));
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let backend = Arc::new(Backend::default());
    store(&backend).batch_update(&mut []).await.unwrap();
    assert!(backend.calls().is_empty());
}

#[test]
fn validate_checks_name_and_spec() {
    let backend = Arc::new(Backend::default());
    let store = store(&backend);

    store
        .validate(&resource("t-optimus.playground.orders_view", Kind::View, true))
        .unwrap();

    let bad_name = resource("t-optimus.play-ground.orders", Kind::Table, true);
    assert_eq!(
        store.validate(&bad_name).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );

    let view_without_query = Resource::new(
        "t-optimus.playground.v",
        Kind::View,
        Store::Bigquery,
        Tenant::new("t-optimus", "ns").unwrap(),
        Metadata::default(),
        json!({ "description": "no query" }).as_object().cloned().unwrap(),
    )
    .unwrap();
    assert_eq!(
        store.validate(&view_without_query).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn urn_depends_on_kind() {
    let backend = Arc::new(Backend::default());
    let store = store(&backend);

    let dataset = resource("t-optimus.playground", Kind::Dataset, true);
    assert_eq!(store.get_urn(&dataset).unwrap(), "bigquery://t-optimus:playground");

    let table = resource("t-optimus.playground.orders", Kind::Table, true);
    assert_eq!(
        store.get_urn(&table).unwrap(),
        "bigquery://t-optimus:playground.orders"
    );
}
