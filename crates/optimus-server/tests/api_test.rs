//! End-to-end tests of the HTTP binding against an in-memory database and
//! an in-memory BigQuery client.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optimus_core::models::resource::{Resource, Status};
use optimus_core::{OptimusError, OptimusResult};
use optimus_server::ServerConfig;
use optimus_server::error::ApiErrorBody;
use optimus_server::routes::{
    ApplyStatus, BackupView, CreateBackupResponse, DeployFrame, ResourceResponse,
};
use optimus_server::state::AppState;
use optimus_store::bigquery::{
    Client, ClientProvider, CopyJob, Dataset, ResourceHandle, TableCopier, TableName,
    TableResourceHandle,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const CONFIG: &str = r#"
db:
  in_memory: true
publisher:
  enabled: false
tenants:
  - project: t-optimus
    namespaces: [ns, ns-b]
secrets:
  t-optimus/DATASTORE_BIGQUERY: sa-credential
"#;

const SCOPE: &str = "v1/projects/t-optimus/namespaces/ns/datastores/bigquery";

#[derive(Default)]
struct Calls(Mutex<Vec<String>>);

impl Calls {
    fn push(&self, call: String) {
        self.0.lock().unwrap().push(call);
    }

    fn all(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct Handle {
    calls: Arc<Calls>,
    name: String,
    table: Option<TableName>,
}

#[async_trait]
impl ResourceHandle for Handle {
    async fn create(&self, _res: &Resource) -> OptimusResult<()> {
        self.calls.push(format!("create {}", self.name));
        Ok(())
    }

    async fn update(&self, _res: &Resource) -> OptimusResult<()> {
        self.calls.push(format!("update {}", self.name));
        Ok(())
    }

    async fn exists(&self) -> bool {
        false
    }
}

struct Job;

#[async_trait]
impl TableCopier for Job {
    async fn run(&self) -> OptimusResult<Box<dyn CopyJob>> {
        Ok(Box::new(Job))
    }
}

#[async_trait]
impl CopyJob for Job {
    async fn wait(&self) -> OptimusResult<()> {
        Ok(())
    }
}

#[async_trait]
impl TableResourceHandle for Handle {
    fn table_name(&self) -> &TableName {
        self.table.as_ref().unwrap()
    }

    fn copier_from(&self, source: &dyn TableResourceHandle) -> Box<dyn TableCopier> {
        self.calls.push(format!(
            "copy {} -> {}",
            source.table_name().full_name(),
            self.name
        ));
        Box::new(Job)
    }

    async fn update_expiry(&self, _name: &str, _expire_at: DateTime<Utc>) -> OptimusResult<()> {
        Ok(())
    }
}

struct FakeClient(Arc<Calls>);

impl FakeClient {
    fn handle(&self, name: String, table: Option<TableName>) -> Handle {
        Handle {
            calls: self.0.clone(),
            name,
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

struct FakeProvider(Arc<Calls>);

#[async_trait]
impl ClientProvider for FakeProvider {
    async fn get(&self, credential: &str) -> OptimusResult<Arc<dyn Client>> {
        if credential != "sa-credential" {
            return Err(OptimusError::invalid_argument("resource_bigquery", "bad credential"));
        }
        Ok(Arc::new(FakeClient(self.0.clone())))
    }
}

struct TestServer {
    base: String,
    http: reqwest::Client,
    calls: Arc<Calls>,
    stop: CancellationToken,
}

impl TestServer {
    async fn start() -> Self {
        let config = ServerConfig::from_yaml(CONFIG).unwrap();
        let calls = Arc::new(Calls::default());
        let (state, worker) = AppState::build(&config, Arc::new(FakeProvider(calls.clone())))
            .await
            .unwrap();
        assert!(worker.is_none());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let stop = CancellationToken::new();
        let shutdown = stop.clone();
        tokio::spawn(optimus_server::serve(listener, Arc::new(state), async move {
            shutdown.cancelled().await;
        }));

        Self {
            base,
            http: reqwest::Client::new(),
            calls,
            stop,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }

    async fn deploy(&self, body: Value) -> Vec<DeployFrame> {
        let response = self
            .http
            .post(self.url("v1/resources/deploy"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers()["content-type"],
            "application/x-ndjson"
        );
        response
            .text()
            .await
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

fn deploy_body(namespace: &str) -> Value {
    json!([{
        "project_name": "t-optimus",
        "namespace_name": namespace,
        "datastore_name": "bigquery",
        "resources": [
            {
                "version": 1,
                "name": "t-optimus.playground",
                "type": "dataset",
                "spec": { "description": "sandbox" },
            },
            {
                "version": 1,
                "name": "t-optimus.playground.orders",
                "type": "table",
                "spec": { "schema": [{ "name": "id", "type": "STRING" }] },
            },
        ],
    }])
}

fn log_messages(frames: &[DeployFrame]) -> Vec<String> {
    frames
        .iter()
        .filter_map(|frame| match frame {
            DeployFrame::LogStatus(status) => Some(status.message.clone()),
            DeployFrame::Result(_) => None,
        })
        .collect()
}

fn result_of(frames: &[DeployFrame]) -> optimus_server::routes::DeployResult {
    match frames.last() {
        Some(DeployFrame::Result(result)) => result.clone(),
        other => panic!("stream must end with a result frame, got {other:?}"),
    }
}

#[tokio::test]
async fn deploy_streams_frames_and_a_result() {
    let server = TestServer::start().await;

    let frames = server.deploy(deploy_body("ns")).await;
    assert_eq!(
        log_messages(&frames),
        vec![
            "[success] t-optimus.playground",
            "[success] t-optimus.playground.orders",
        ]
    );
    assert!(result_of(&frames).success);
    assert_eq!(
        server.calls.all(),
        vec![
            "create t-optimus.playground",
            "create t-optimus.playground.orders",
        ]
    );

    let read: ResourceResponse = server
        .http
        .get(server.url(&format!("{SCOPE}/resources/t-optimus.playground.orders")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(read.status, Status::Success);
    assert_eq!(read.urn, "bigquery://t-optimus:playground.orders");

    // Unchanged on the second run.
    let again = server.deploy(deploy_body("ns")).await;
    assert_eq!(
        log_messages(&again),
        vec![
            "[skipped] t-optimus.playground",
            "[skipped] t-optimus.playground.orders",
        ]
    );
    assert!(result_of(&again).success);
}

#[tokio::test]
async fn deploy_names_the_failing_namespace() {
    let server = TestServer::start().await;

    let frames = server.deploy(deploy_body("unknown")).await;
    let messages = log_messages(&frames);
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("error deploying namespace [unknown]"));

    let result = result_of(&frames);
    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.code, "INTERNAL");
    assert!(error.message.contains("error when deploying: [unknown]"));
}

#[tokio::test]
async fn unary_errors_map_to_statuses() {
    let server = TestServer::start().await;

    let missing = server
        .http
        .get(server.url(&format!("{SCOPE}/resources/t-optimus.playground.ghost")))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    let body: ApiErrorBody = missing.json().await.unwrap();
    assert_eq!(body.code, "NOT_FOUND");

    let invalid = server
        .http
        .post(server.url("v1/resources"))
        .json(&json!({
            "project_name": "t-optimus",
            "namespace_name": "ns",
            "datastore_name": "bigquery",
            "resource": {
                "name": "t-optimus.playground.daily",
                "type": "view",
                "spec": { "description": "no query" },
            },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 400);

    let bad_store = server
        .http
        .get(server.url("v1/projects/t-optimus/namespaces/ns/datastores/redshift/resources"))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_store.status(), 400);
}

#[tokio::test]
async fn create_update_apply_and_move() {
    let server = TestServer::start().await;
    let request = |description: &str| {
        json!({
            "project_name": "t-optimus",
            "namespace_name": "ns",
            "datastore_name": "bigquery",
            "resource": {
                "name": "t-optimus.playground",
                "type": "dataset",
                "spec": { "description": description },
            },
        })
    };

    let created = server
        .http
        .post(server.url("v1/resources"))
        .json(&request("first"))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);

    let updated: ResourceResponse = server
        .http
        .put(server.url("v1/resources"))
        .json(&request("second"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(updated.status, Status::Success);
    assert_eq!(updated.resource.spec["description"], "second");

    let applied: Vec<ApplyStatus> = server
        .http
        .post(server.url(&format!("{SCOPE}/resources/apply")))
        .json(&json!({ "resource_names": ["t-optimus.playground"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        applied,
        vec![ApplyStatus {
            resource_name: "t-optimus.playground".into(),
            status: Status::Success,
        }]
    );

    let moved = server
        .http
        .post(server.url(&format!("{SCOPE}/resources/t-optimus.playground/namespace")))
        .json(&json!({ "new_namespace_name": "ns-b" }))
        .send()
        .await
        .unwrap();
    assert_eq!(moved.status(), 204);

    let listed: Vec<ResourceResponse> = server
        .http
        .get(server.url("v1/projects/t-optimus/namespaces/ns-b/datastores/bigquery/resources"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].resource.name, "t-optimus.playground");
}

#[tokio::test]
async fn backup_dry_run_create_and_read() {
    let server = TestServer::start().await;
    server.deploy(deploy_body("ns")).await;

    let request = json!({
        "resource_names": ["t-optimus.playground.orders", "t-optimus.playground"],
        "description": "before migration",
        "config": { "ttl": "48h" },
        "allowed_downstream_namespaces": ["ns-b"],
    });

    let plan: Value = server
        .http
        .post(server.url(&format!("{SCOPE}/backups/dry-run")))
        .json(&request)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(plan["resource_names"], json!(["t-optimus.playground.orders"]));
    assert_eq!(plan["ignored_resources"][0]["name"], "t-optimus.playground");

    let created = server
        .http
        .post(server.url(&format!("{SCOPE}/backups")))
        .json(&request)
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let created: CreateBackupResponse = created.json().await.unwrap();
    assert_eq!(created.resource_names.len(), 1);
    assert!(
        created.resource_names[0].starts_with("t-optimus.optimus_backup.backup_playground_orders_")
    );
    assert!(
        server
            .calls
            .all()
            .iter()
            .any(|c| c.starts_with("copy t-optimus.playground.orders -> "))
    );

    let fetched: BackupView = server
        .http
        .get(server.url(&format!("{SCOPE}/backups/{}", created.id)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched.id, Some(created.id));
    assert_eq!(fetched.description, "before migration");

    let listed: Vec<BackupView> = server
        .http
        .get(server.url(&format!("{SCOPE}/backups")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let bad_id = server
        .http
        .get(server.url(&format!("{SCOPE}/backups/not-a-uuid")))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_id.status(), 400);
}

#[tokio::test]
async fn metrics_expose_deploy_counters() {
    let server = TestServer::start().await;
    server.deploy(deploy_body("ns")).await;

    let text = server
        .http
        .get(server.url("metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains("optimus_resource_deploy_total"), "{text}");

    let health = server.http.get(server.url("health")).send().await.unwrap();
    assert_eq!(health.status(), 200);
}
