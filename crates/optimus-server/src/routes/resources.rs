use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use optimus_core::models::resource::{Resource, Status};
use optimus_core::models::tenant::NamespaceName;
use optimus_resource::ResourceSpec;
use serde::{Deserialize, Serialize};

use super::{ScopePath, scope};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub project_name: String,
    pub namespace_name: String,
    pub datastore_name: String,
    pub resource: ResourceSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceResponse {
    pub resource: ResourceSpec,
    #[serde(default)]
    pub urn: String,
    pub status: Status,
}

impl From<&Resource> for ResourceResponse {
    fn from(res: &Resource) -> Self {
        Self {
            resource: ResourceSpec::from_resource(res),
            urn: res.urn().unwrap_or_default().to_string(),
            status: res.status(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeNamespaceRequest {
    pub new_namespace_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyRequest {
    pub resource_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyStatus {
    pub resource_name: String,
    pub status: Status,
}

#[derive(Debug, Deserialize)]
pub(super) struct ResourcePath {
    project: String,
    namespace: String,
    store: String,
    name: String,
}

impl ResourceRequest {
    fn into_resource(self) -> ApiResult<Resource> {
        let (tenant, store) = scope(&self.project_name, &self.namespace_name, &self.datastore_name)?;
        Ok(self.resource.to_resource(&tenant, store)?)
    }
}

pub(super) async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResourceRequest>,
) -> ApiResult<(StatusCode, Json<ResourceResponse>)> {
    let created = state.resources.create(req.into_resource()?).await?;
    Ok((StatusCode::CREATED, Json(ResourceResponse::from(&created))))
}

pub(super) async fn update(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResourceRequest>,
) -> ApiResult<Json<ResourceResponse>> {
    let updated = state.resources.update(req.into_resource()?).await?;
    Ok(Json(ResourceResponse::from(&updated)))
}

pub(super) async fn read(
    State(state): State<Arc<AppState>>,
    Path(path): Path<ResourcePath>,
) -> ApiResult<Json<ResourceResponse>> {
    let (tenant, store) = scope(&path.project, &path.namespace, &path.store)?;
    let res = state.resources.get(&tenant, store, &path.name).await?;
    Ok(Json(ResourceResponse::from(&res)))
}

pub(super) async fn list(
    State(state): State<Arc<AppState>>,
    Path(path): Path<ScopePath>,
) -> ApiResult<Json<Vec<ResourceResponse>>> {
    let (tenant, store) = path.resolve()?;
    let all = state.resources.get_all(&tenant, store).await?;
    Ok(Json(all.iter().map(ResourceResponse::from).collect()))
}

pub(super) async fn change_namespace(
    State(state): State<Arc<AppState>>,
    Path(path): Path<ResourcePath>,
    Json(req): Json<ChangeNamespaceRequest>,
) -> ApiResult<StatusCode> {
    let (tenant, store) = scope(&path.project, &path.namespace, &path.store)?;
    let target = NamespaceName::new(req.new_namespace_name)?;
    state
        .resources
        .change_namespace(&tenant, store, &path.name, target)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn apply(
    State(state): State<Arc<AppState>>,
    Path(path): Path<ScopePath>,
    Json(req): Json<ApplyRequest>,
) -> ApiResult<Json<Vec<ApplyStatus>>> {
    let (tenant, store) = path.resolve()?;
    let applied = state
        .resources
        .apply(&tenant, store, &req.resource_names)
        .await?;
    Ok(Json(
        applied
            .iter()
            .map(|res| ApplyStatus {
                resource_name: res.full_name().to_string(),
                status: res.status(),
            })
            .collect(),
    ))
}
