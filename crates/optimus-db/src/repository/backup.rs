//! SurrealDB implementation of [`BackupRepository`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use optimus_core::error::OptimusResult;
use optimus_core::models::backup::{Backup, ENTITY_BACKUP};
use optimus_core::models::resource::Store;
use optimus_core::models::tenant::Tenant;
use optimus_core::repository::BackupRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct BackupRowWithId {
    record_id: String,
    store: String,
    project_name: String,
    namespace_name: String,
    description: String,
    resource_names: Vec<String>,
    config: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl BackupRowWithId {
    fn try_into_backup(self) -> Result<Backup, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Decode(format!("invalid backup UUID: {e}")))?;
        let store: Store = self
            .store
            .parse()
            .map_err(|e| DbError::Decode(format!("backup {id}: {e}")))?;
        let tenant = Tenant::new(&self.project_name, &self.namespace_name)
            .map_err(|e| DbError::Decode(format!("backup {id}: {e}")))?;
        let config: BTreeMap<String, String> = serde_json::from_value(self.config)
            .map_err(|e| DbError::Decode(format!("backup {id}: invalid config: {e}")))?;

        let mut backup = Backup::new(
            store,
            tenant,
            self.resource_names,
            self.description,
            self.created_at,
            config,
        )
        .map_err(|e| DbError::Decode(format!("backup {id}: {e}")))?;
        backup
            .update_id(id)
            .map_err(|e| DbError::Decode(format!("backup {id}: {e}")))?;
        Ok(backup)
    }
}

/// SurrealDB implementation of the Backup repository.
#[derive(Clone)]
pub struct SurrealBackupRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealBackupRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> BackupRepository for SurrealBackupRepository<C> {
    async fn create(&self, backup: &Backup) -> OptimusResult<Uuid> {
        let id = Uuid::new_v4();
        let config = serde_json::to_value(backup.config())
            .map_err(|e| DbError::Decode(format!("invalid backup config: {e}")))?;

        let result = self
            .db
            .query(
                "CREATE type::record('backup', $id) SET \
                 store = $store, project_name = $project_name, \
                 namespace_name = $namespace_name, \
                 description = $description, \
                 resource_names = $resource_names, \
                 config = $config, created_at = $created_at",
            )
            .bind(("id", id.to_string()))
            .bind(("store", backup.store().as_str().to_string()))
            .bind(("project_name", backup.tenant().project_name().to_string()))
            .bind(("namespace_name", backup.tenant().namespace_name().to_string()))
            .bind(("description", backup.description().to_string()))
            .bind(("resource_names", backup.resource_names().to_vec()))
            .bind(("config", config))
            .bind(("created_at", backup.created_at()))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(id)
    }

    async fn get_by_id(&self, tenant: &Tenant, store: Store, id: Uuid) -> OptimusResult<Backup> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('backup', $id) \
                 WHERE project_name = $project_name \
                 AND namespace_name = $namespace_name \
                 AND store = $store",
            )
            .bind(("id", id.to_string()))
            .bind(("project_name", tenant.project_name().to_string()))
            .bind(("namespace_name", tenant.namespace_name().to_string()))
            .bind(("store", store.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<BackupRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: ENTITY_BACKUP.into(),
            id: id.to_string(),
        })?;

        Ok(row.try_into_backup()?)
    }

    async fn get_all(&self, tenant: &Tenant, store: Store) -> OptimusResult<Vec<Backup>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM backup \
                 WHERE project_name = $project_name \
                 AND namespace_name = $namespace_name \
                 AND store = $store \
                 ORDER BY created_at DESC",
            )
            .bind(("project_name", tenant.project_name().to_string()))
            .bind(("namespace_name", tenant.namespace_name().to_string()))
            .bind(("store", store.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<BackupRowWithId> = result.take(0).map_err(DbError::from)?;
        let backups = rows
            .into_iter()
            .map(BackupRowWithId::try_into_backup)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(backups)
    }
}
