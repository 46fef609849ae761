//! HTTP routes.
//!
//! Tenant-scoped routes live under
//! `/v1/projects/:project/namespaces/:namespace/datastores/:store`.

mod backups;
mod deploy;
mod resources;

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use optimus_core::models::resource::Store;
use optimus_core::models::tenant::Tenant;
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;

pub use backups::{BackupRequest, BackupView, CreateBackupResponse};
pub use deploy::{DeployFrame, DeployResult};
pub use resources::{
    ApplyRequest, ApplyStatus, ChangeNamespaceRequest, ResourceRequest, ResourceResponse,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    const SCOPE: &str = "/v1/projects/:project/namespaces/:namespace/datastores/:store";

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/v1/resources/deploy", post(deploy::deploy))
        .route(
            "/v1/resources",
            post(resources::create).put(resources::update),
        )
        .route(&format!("{SCOPE}/resources"), get(resources::list))
        .route(&format!("{SCOPE}/resources/apply"), post(resources::apply))
        .route(&format!("{SCOPE}/resources/:name"), get(resources::read))
        .route(
            &format!("{SCOPE}/resources/:name/namespace"),
            post(resources::change_namespace),
        )
        .route(
            &format!("{SCOPE}/backups"),
            get(backups::list).post(backups::create),
        )
        .route(&format!("{SCOPE}/backups/dry-run"), post(backups::dry_run))
        .route(&format!("{SCOPE}/backups/:id"), get(backups::get))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder
        .encode(&state.registry.gather(), &mut buf)
        .map_err(|e| ApiError::internal(format!("cannot encode metrics: {e}")))?;
    Ok(([(header::CONTENT_TYPE, encoder.format_type().to_string())], buf))
}

/// The tenant and store named in a scoped path.
#[derive(Debug, Deserialize)]
struct ScopePath {
    project: String,
    namespace: String,
    store: String,
}

impl ScopePath {
    fn resolve(&self) -> ApiResult<(Tenant, Store)> {
        scope(&self.project, &self.namespace, &self.store)
    }
}

fn scope(project: &str, namespace: &str, store: &str) -> ApiResult<(Tenant, Store)> {
    let tenant = Tenant::new(project, namespace)?;
    let store = store.parse()?;
    Ok((tenant, store))
}
