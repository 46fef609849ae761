use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use optimus_core::models::backup::{Backup, BackupResult, IgnoredResource};
use optimus_core::models::resource::Store;
use optimus_core::models::tenant::Tenant;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{ScopePath, scope};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupRequest {
    pub resource_names: Vec<String>,
    pub description: String,
    pub config: BTreeMap<String, String>,
    /// Carried for compatibility; downstream resolution is not performed.
    pub allowed_downstream_namespaces: Vec<String>,
}

impl BackupRequest {
    fn into_backup(self, tenant: Tenant, store: Store) -> ApiResult<Backup> {
        if !self.allowed_downstream_namespaces.is_empty() {
            debug!(
                namespaces = ?self.allowed_downstream_namespaces,
                "downstream namespaces ignored"
            );
        }
        Ok(Backup::new(
            store,
            tenant,
            self.resource_names,
            self.description,
            Utc::now(),
            self.config,
        )?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateBackupResponse {
    pub id: Uuid,
    pub resource_names: Vec<String>,
    pub ignored_resources: Vec<IgnoredResource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupView {
    pub id: Option<Uuid>,
    pub resource_names: Vec<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub config: BTreeMap<String, String>,
}

impl From<&Backup> for BackupView {
    fn from(backup: &Backup) -> Self {
        Self {
            id: backup.id(),
            resource_names: backup.resource_names().to_vec(),
            description: backup.description().to_string(),
            created_at: backup.created_at(),
            config: backup.config().clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct BackupPath {
    project: String,
    namespace: String,
    store: String,
    id: String,
}

pub(super) async fn dry_run(
    State(state): State<Arc<AppState>>,
    Path(path): Path<ScopePath>,
    Json(req): Json<BackupRequest>,
) -> ApiResult<Json<BackupResult>> {
    let (tenant, store) = path.resolve()?;
    let backup = req.into_backup(tenant, store)?;
    Ok(Json(state.backups.dry_run(&backup).await?))
}

pub(super) async fn create(
    State(state): State<Arc<AppState>>,
    Path(path): Path<ScopePath>,
    Json(req): Json<BackupRequest>,
) -> ApiResult<(StatusCode, Json<CreateBackupResponse>)> {
    let (tenant, store) = path.resolve()?;
    let outcome = state.backups.create(req.into_backup(tenant, store)?).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateBackupResponse {
            id: outcome.id,
            resource_names: outcome.result.resource_names,
            ignored_resources: outcome.result.ignored_resources,
        }),
    ))
}

pub(super) async fn list(
    State(state): State<Arc<AppState>>,
    Path(path): Path<ScopePath>,
) -> ApiResult<Json<Vec<BackupView>>> {
    let (tenant, store) = path.resolve()?;
    let backups = state.backups.list(&tenant, store).await?;
    Ok(Json(backups.iter().map(BackupView::from).collect()))
}

pub(super) async fn get(
    State(state): State<Arc<AppState>>,
    Path(path): Path<BackupPath>,
) -> ApiResult<Json<BackupView>> {
    let (tenant, store) = scope(&path.project, &path.namespace, &path.store)?;
    let id = Uuid::parse_str(&path.id)
        .map_err(|e| ApiError::bad_request(format!("invalid backup id {}: {e}", path.id)))?;
    let backup = state.backups.get(&tenant, store, id).await?;
    Ok(Json(BackupView::from(&backup)))
}
