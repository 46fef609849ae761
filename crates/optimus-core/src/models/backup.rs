//! Backup domain models.
//!
//! A backup snapshots a set of tables into TTL-bounded copies. The
//! recognised `config` keys are listed as constants below.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OptimusError, OptimusResult};
use crate::models::resource::Store;
use crate::models::tenant::Tenant;

pub const ENTITY_BACKUP: &str = "backup";

/// Destination dataset name.
pub const CONFIG_DATASET: &str = "dataset";
/// Destination table name prefix.
pub const CONFIG_PREFIX: &str = "prefix";
/// Lifetime of the destination copy.
pub const CONFIG_TTL: &str = "ttl";

pub const DEFAULT_DATASET: &str = "optimus_backup";
pub const DEFAULT_PREFIX: &str = "backup";
pub const DEFAULT_TTL: &str = "720h";

#[derive(Debug, Clone, PartialEq)]
pub struct Backup {
    id: Option<Uuid>,
    store: Store,
    tenant: Tenant,
    resource_names: Vec<String>,
    description: String,
    created_at: DateTime<Utc>,
    config: BTreeMap<String, String>,
}

impl Backup {
    pub fn new(
        store: Store,
        tenant: Tenant,
        resource_names: Vec<String>,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
        config: BTreeMap<String, String>,
    ) -> OptimusResult<Self> {
        if resource_names.is_empty() {
            return Err(OptimusError::invalid_argument(
                ENTITY_BACKUP,
                "list of resources to backup is empty",
            ));
        }
        if resource_names.iter().any(|n| n.trim().is_empty()) {
            return Err(OptimusError::invalid_argument(
                ENTITY_BACKUP,
                "one of resource names is empty",
            ));
        }

        Ok(Self {
            id: None,
            store,
            tenant,
            resource_names,
            description: description.into(),
            created_at,
            config,
        })
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    /// Sets the identifier handed out by the repository. The id never
    /// changes afterwards.
    pub fn update_id(&mut self, id: Uuid) -> OptimusResult<()> {
        if self.id.is_some() {
            return Err(OptimusError::invalid_argument(
                ENTITY_BACKUP,
                "trying to replace valid id",
            ));
        }
        self.id = Some(id);
        Ok(())
    }

    pub fn store(&self) -> Store {
        self.store
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn resource_names(&self) -> &[String] {
        &self.resource_names
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn config(&self) -> &BTreeMap<String, String> {
        &self.config
    }

    /// Config value for `key`, falling back to `default` when absent or blank.
    pub fn config_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        match self.config.get(key) {
            Some(value) if !value.trim().is_empty() => value.as_str(),
            _ => default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredResource {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupResult {
    /// Destination names of the copies produced.
    pub resource_names: Vec<String>,
    pub ignored_resources: Vec<IgnoredResource>,
}
