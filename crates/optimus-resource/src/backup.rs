//! Backup service: resolves the requested resources, records the backup
//! and hands the work to the owning store.

use std::collections::HashSet;
use std::sync::Arc;

use optimus_core::error::OptimusResult;
use optimus_core::models::backup::{Backup, BackupResult, IgnoredResource};
use optimus_core::models::resource::{Resource, Store};
use optimus_core::models::tenant::Tenant;
use optimus_core::repository::{BackupRepository, ResourceRepository};
use tracing::info;
use uuid::Uuid;

use crate::manager::ResourceManager;

const REASON_NO_RECORD: &str = "no record found";

#[derive(Debug, Clone, PartialEq)]
pub struct BackupOutcome {
    pub id: Uuid,
    pub result: BackupResult,
}

pub struct BackupService<R: ResourceRepository, B: BackupRepository> {
    resources: Arc<R>,
    backups: B,
    manager: Arc<ResourceManager<R>>,
}

impl<R: ResourceRepository, B: BackupRepository> BackupService<R, B> {
    pub fn new(resources: Arc<R>, backups: B, manager: Arc<ResourceManager<R>>) -> Self {
        Self {
            resources,
            backups,
            manager,
        }
    }

    /// Stored resources named by `backup`, plus the names with no row.
    async fn sources(&self, backup: &Backup) -> OptimusResult<(Vec<Resource>, Vec<IgnoredResource>)> {
        let found = self
            .resources
            .read_by_full_names(backup.tenant(), backup.store(), backup.resource_names())
            .await?;

        let known: HashSet<&str> = found.iter().map(Resource::full_name).collect();
        let ignored = backup
            .resource_names()
            .iter()
            .filter(|name| !known.contains(name.as_str()))
            .map(|name| IgnoredResource {
                name: name.clone(),
                reason: REASON_NO_RECORD.into(),
            })
            .collect();
        Ok((found, ignored))
    }

    /// What a backup would copy and ignore, without side effects.
    pub async fn dry_run(&self, backup: &Backup) -> OptimusResult<BackupResult> {
        let (resources, mut ignored) = self.sources(backup).await?;
        let mut result = self.manager.backup_plan(backup, &resources)?;
        ignored.append(&mut result.ignored_resources);
        result.ignored_resources = ignored;
        Ok(result)
    }

    pub async fn create(&self, mut backup: Backup) -> OptimusResult<BackupOutcome> {
        // 1. Resolve the sources.
        let (resources, mut ignored) = self.sources(&backup).await?;

        // 2. Record the backup to obtain its id.
        let id = self.backups.create(&backup).await?;
        backup.update_id(id)?;

        // 3. Copy in the store.
        let mut result = self.manager.backup(&backup, &resources).await?;
        ignored.append(&mut result.ignored_resources);
        result.ignored_resources = ignored;

        info!(
            backup_id = %id,
            tenant = %backup.tenant(),
            copied = result.resource_names.len(),
            ignored = result.ignored_resources.len(),
            "backup created"
        );
        Ok(BackupOutcome { id, result })
    }

    pub async fn get(&self, tenant: &Tenant, store: Store, id: Uuid) -> OptimusResult<Backup> {
        self.backups.get_by_id(tenant, store, id).await
    }

    pub async fn list(&self, tenant: &Tenant, store: Store) -> OptimusResult<Vec<Backup>> {
        self.backups.get_all(tenant, store).await
    }
}
