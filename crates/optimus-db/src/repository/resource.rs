//! SurrealDB implementation of [`ResourceRepository`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use optimus_core::error::{MultiError, OptimusError, OptimusResult};
use optimus_core::models::resource::{
    ENTITY_RESOURCE, Metadata, PersistedState, Resource, Status, Store,
};
use optimus_core::models::tenant::{NamespaceName, Tenant};
use optimus_core::repository::ResourceRepository;
use serde_json::json;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;

use crate::error::{DbError, classify_statement_error};

const KEY_FILTER: &str = "project_name = $project_name \
     AND namespace_name = $namespace_name \
     AND store = $store \
     AND full_name = $full_name";

#[derive(Debug, SurrealValue)]
struct ResourceRow {
    full_name: String,
    kind: String,
    store: String,
    project_name: String,
    namespace_name: String,
    metadata: serde_json::Value,
    spec: serde_json::Value,
    urn: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ResourceRow {
    fn try_into_resource(self) -> Result<Resource, DbError> {
        let decode = |e: OptimusError| DbError::Decode(format!("{}: {e}", self.full_name));

        let tenant = Tenant::new(&self.project_name, &self.namespace_name).map_err(decode)?;
        let kind = self.kind.parse().map_err(decode)?;
        let store = self.store.parse().map_err(decode)?;
        let status: Status = self.status.parse().map_err(decode)?;
        let metadata: Metadata = serde_json::from_value(self.metadata.clone())
            .map_err(|e| DbError::Decode(format!("{}: invalid metadata: {e}", self.full_name)))?;
        let spec = match &self.spec {
            serde_json::Value::Object(map) => map.clone(),
            _ => {
                return Err(DbError::Decode(format!(
                    "{}: spec is not an object",
                    self.full_name
                )));
            }
        };

        let resource =
            Resource::new(&self.full_name, kind, store, tenant, metadata, spec).map_err(decode)?;
        Ok(resource.with_persisted_state(PersistedState {
            urn: (!self.urn.is_empty()).then_some(self.urn),
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }))
    }
}

#[derive(Debug, SurrealValue)]
struct NameRow {
    full_name: String,
}

/// JSON image of a resource as bound into write statements.
fn resource_value(res: &Resource) -> Result<serde_json::Value, DbError> {
    let metadata = serde_json::to_value(res.metadata())
        .map_err(|e| DbError::Decode(format!("{}: invalid metadata: {e}", res.full_name())))?;
    Ok(json!({
        "full_name": res.full_name(),
        "kind": res.kind().as_str(),
        "store": res.store().as_str(),
        "project_name": res.tenant().project_name().as_str(),
        "namespace_name": res.tenant().namespace_name().as_str(),
        "metadata": metadata,
        "spec": serde_json::Value::Object(res.spec().clone()),
        "urn": res.urn().unwrap_or_default(),
        "status": res.status().as_str(),
    }))
}

fn rows_into_resources(rows: Vec<ResourceRow>) -> Result<Vec<Resource>, DbError> {
    rows.into_iter()
        .map(ResourceRow::try_into_resource)
        .collect()
}

/// SurrealDB implementation of the Resource repository.
#[derive(Clone)]
pub struct SurrealResourceRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealResourceRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn find(
        &self,
        tenant: &Tenant,
        store: Store,
        full_name: &str,
    ) -> Result<Option<ResourceRow>, DbError> {
        let mut result = self
            .db
            .query(format!("SELECT * FROM resource WHERE {KEY_FILTER}"))
            .bind(("project_name", tenant.project_name().to_string()))
            .bind(("namespace_name", tenant.namespace_name().to_string()))
            .bind(("store", store.as_str().to_string()))
            .bind(("full_name", full_name.to_string()))
            .await?;

        let rows: Vec<ResourceRow> = result.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn existing_names(
        &self,
        tenant: &Tenant,
        store: Store,
    ) -> Result<BTreeSet<String>, DbError> {
        let mut result = self
            .db
            .query(
                "SELECT full_name FROM resource \
                 WHERE project_name = $project_name \
                 AND namespace_name = $namespace_name \
                 AND store = $store",
            )
            .bind(("project_name", tenant.project_name().to_string()))
            .bind(("namespace_name", tenant.namespace_name().to_string()))
            .bind(("store", store.as_str().to_string()))
            .await?;

        let rows: Vec<NameRow> = result.take(0)?;
        Ok(rows.into_iter().map(|r| r.full_name).collect())
    }
}

impl<C: Connection> ResourceRepository for SurrealResourceRepository<C> {
    async fn create(&self, res: &Resource) -> OptimusResult<()> {
        if self
            .find(res.tenant(), res.store(), res.full_name())
            .await?
            .is_some()
        {
            return Err(DbError::AlreadyExists {
                entity: ENTITY_RESOURCE.into(),
                id: res.full_name().into(),
            }
            .into());
        }

        let row = resource_value(res)?;
        let result = self
            .db
            .query(
                "CREATE resource SET \
                 full_name = $row.full_name, kind = $row.kind, \
                 store = $row.store, project_name = $row.project_name, \
                 namespace_name = $row.namespace_name, \
                 metadata = $row.metadata, spec = $row.spec, \
                 urn = $row.urn, status = $row.status",
            )
            .bind(("row", row))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| classify_statement_error(e, ENTITY_RESOURCE, res.full_name()))?;

        Ok(())
    }

    async fn update(&self, res: &Resource) -> OptimusResult<()> {
        let row = resource_value(res)?;
        let result = self
            .db
            .query(
                "UPDATE resource SET \
                 kind = $row.kind, metadata = $row.metadata, \
                 spec = $row.spec, urn = $row.urn, status = $row.status, \
                 updated_at = time::now() \
                 WHERE project_name = $row.project_name \
                 AND namespace_name = $row.namespace_name \
                 AND store = $row.store AND full_name = $row.full_name \
                 RETURN full_name",
            )
            .bind(("row", row))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<NameRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: ENTITY_RESOURCE.into(),
                id: res.full_name().into(),
            }
            .into());
        }
        Ok(())
    }

    async fn read_by_full_name(
        &self,
        tenant: &Tenant,
        store: Store,
        full_name: &str,
    ) -> OptimusResult<Resource> {
        let row = self
            .find(tenant, store, full_name)
            .await?
            .ok_or_else(|| DbError::NotFound {
                entity: ENTITY_RESOURCE.into(),
                id: full_name.into(),
            })?;

        Ok(row.try_into_resource()?)
    }

    async fn read_all(&self, tenant: &Tenant, store: Store) -> OptimusResult<Vec<Resource>> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM resource \
                 WHERE project_name = $project_name \
                 AND namespace_name = $namespace_name \
                 AND store = $store \
                 ORDER BY full_name ASC",
            )
            .bind(("project_name", tenant.project_name().to_string()))
            .bind(("namespace_name", tenant.namespace_name().to_string()))
            .bind(("store", store.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ResourceRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows_into_resources(rows)?)
    }

    async fn read_by_full_names(
        &self,
        tenant: &Tenant,
        store: Store,
        names: &[String],
    ) -> OptimusResult<Vec<Resource>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut result = self
            .db
            .query(
                "SELECT * FROM resource \
                 WHERE project_name = $project_name \
                 AND namespace_name = $namespace_name \
                 AND store = $store \
                 AND full_name IN $names \
                 ORDER BY full_name ASC",
            )
            .bind(("project_name", tenant.project_name().to_string()))
            .bind(("namespace_name", tenant.namespace_name().to_string()))
            .bind(("store", store.as_str().to_string()))
            .bind(("names", names.to_vec()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ResourceRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows_into_resources(rows)?)
    }

    async fn create_or_update_all(&self, resources: &[Resource]) -> OptimusResult<()> {
        if resources.is_empty() {
            return Ok(());
        }

        // Per-row checks run before anything is written so that a
        // rejected batch leaves every row untouched.
        let mut existing: BTreeMap<(Tenant, Store), BTreeSet<String>> = BTreeMap::new();
        for res in resources {
            let key = (res.tenant().clone(), res.store());
            if !existing.contains_key(&key) {
                let names = self.existing_names(res.tenant(), res.store()).await?;
                existing.insert(key, names);
            }
        }

        let mut me = MultiError::new("error while creating or updating resources");
        let mut creates = Vec::new();
        let mut updates = Vec::new();
        for res in resources {
            let present = existing
                .get(&(res.tenant().clone(), res.store()))
                .is_some_and(|names| names.contains(res.full_name()));

            match res.status() {
                Status::ToCreate if present => me.append(OptimusError::already_exists(
                    ENTITY_RESOURCE,
                    format!("resource {} already exists", res.full_name()),
                )),
                Status::ToCreate => creates.push(resource_value(res)?),
                Status::ToUpdate if !present => me.append(OptimusError::not_found(
                    ENTITY_RESOURCE,
                    format!("resource {} does not exist", res.full_name()),
                )),
                Status::ToUpdate => updates.push(resource_value(res)?),
                other => me.append(OptimusError::invalid_argument(
                    ENTITY_RESOURCE,
                    format!(
                        "resource {} has status {other}, expected to_create or to_update",
                        res.full_name()
                    ),
                )),
            }
        }
        me.into_result()?;

        debug!(
            creates = creates.len(),
            updates = updates.len(),
            "writing resources in one transaction"
        );

        let result = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 FOR $row IN $creates { \
                     CREATE resource SET \
                     full_name = $row.full_name, kind = $row.kind, \
                     store = $row.store, project_name = $row.project_name, \
                     namespace_name = $row.namespace_name, \
                     metadata = $row.metadata, spec = $row.spec, \
                     urn = $row.urn, status = $row.status; \
                 }; \
                 FOR $row IN $updates { \
                     UPDATE resource SET \
                     kind = $row.kind, metadata = $row.metadata, \
                     spec = $row.spec, urn = $row.urn, status = $row.status, \
                     updated_at = time::now() \
                     WHERE project_name = $row.project_name \
                     AND namespace_name = $row.namespace_name \
                     AND store = $row.store AND full_name = $row.full_name; \
                 }; \
                 COMMIT TRANSACTION;",
            )
            .bind(("creates", serde_json::Value::Array(creates)))
            .bind(("updates", serde_json::Value::Array(updates)))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| classify_statement_error(e, ENTITY_RESOURCE, "batch"))?;

        Ok(())
    }

    async fn update_status(&self, resources: &[Resource]) -> OptimusResult<()> {
        let mut me = MultiError::new("error updating resources status");

        for res in resources {
            let outcome = self
                .db
                .query(format!(
                    "UPDATE resource SET status = $status, \
                     updated_at = time::now() \
                     WHERE {KEY_FILTER} RETURN full_name"
                ))
                .bind(("status", res.status().as_str().to_string()))
                .bind(("project_name", res.tenant().project_name().to_string()))
                .bind(("namespace_name", res.tenant().namespace_name().to_string()))
                .bind(("store", res.store().as_str().to_string()))
                .bind(("full_name", res.full_name().to_string()))
                .await
                .map_err(DbError::from)
                .and_then(|r| r.check().map_err(|e| DbError::Query(e.to_string())))
                .and_then(|mut r| {
                    let rows: Vec<NameRow> = r.take(0)?;
                    Ok(rows)
                });

            match outcome {
                Ok(rows) if rows.is_empty() => me.append(OptimusError::not_found(
                    ENTITY_RESOURCE,
                    format!("resource {} does not exist", res.full_name()),
                )),
                Ok(_) => {}
                Err(err) => me.append(err.into()),
            }
        }

        me.into_result()
    }

    async fn change_namespace(
        &self,
        res: &Resource,
        new_namespace: &NamespaceName,
    ) -> OptimusResult<()> {
        let target = res.tenant().with_namespace(new_namespace.clone());
        if self
            .find(&target, res.store(), res.full_name())
            .await?
            .is_some()
        {
            return Err(OptimusError::already_exists(
                ENTITY_RESOURCE,
                format!(
                    "resource {} already exists in namespace {new_namespace}",
                    res.full_name()
                ),
            ));
        }

        let result = self
            .db
            .query(format!(
                "UPDATE resource SET namespace_name = $new_namespace, \
                 updated_at = time::now() \
                 WHERE {KEY_FILTER} RETURN full_name"
            ))
            .bind(("new_namespace", new_namespace.to_string()))
            .bind(("project_name", res.tenant().project_name().to_string()))
            .bind(("namespace_name", res.tenant().namespace_name().to_string()))
            .bind(("store", res.store().as_str().to_string()))
            .bind(("full_name", res.full_name().to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| classify_statement_error(e, ENTITY_RESOURCE, res.full_name()))?;

        let rows: Vec<NameRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: ENTITY_RESOURCE.into(),
                id: res.full_name().into(),
            }
            .into());
        }
        Ok(())
    }
}
