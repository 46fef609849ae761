//! Tenant and secret lookups backed by the server configuration.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use optimus_core::error::{OptimusError, OptimusResult};
use optimus_core::models::tenant::{ENTITY_TENANT, Tenant};
use optimus_core::repository::{SecretProvider, TenantDetailsGetter};

const ENTITY_SECRET: &str = "secret";

#[derive(Debug, Clone, Default)]
pub struct ConfigTenants {
    known: Arc<HashSet<Tenant>>,
}

impl ConfigTenants {
    pub fn new(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        Self {
            known: Arc::new(tenants.into_iter().collect()),
        }
    }
}

impl TenantDetailsGetter for ConfigTenants {
    async fn ensure_exists(&self, tenant: &Tenant) -> OptimusResult<()> {
        if self.known.contains(tenant) {
            return Ok(());
        }
        Err(OptimusError::not_found(
            ENTITY_TENANT,
            format!("tenant {tenant} is not registered"),
        ))
    }
}

/// Secrets keyed `<project>/<namespace>/<name>`. A namespace-level entry
/// shadows the project-level `<project>/<name>` one.
#[derive(Clone, Default)]
pub struct ConfigSecrets {
    values: Arc<BTreeMap<String, String>>,
}

impl std::fmt::Debug for ConfigSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigSecrets")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ConfigSecrets {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }
}

impl SecretProvider for ConfigSecrets {
    async fn get_secret(&self, tenant: &Tenant, name: &str) -> OptimusResult<String> {
        let project = tenant.project_name().as_str();
        let scoped = format!("{project}/{}/{name}", tenant.namespace_name().as_str());
        let shared = format!("{project}/{name}");

        self.values
            .get(&scoped)
            .or_else(|| self.values.get(&shared))
            .cloned()
            .ok_or_else(|| {
                OptimusError::not_found(ENTITY_SECRET, format!("secret {name} not found for {tenant}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(ns: &str) -> Tenant {
        Tenant::new("t-optimus", ns).unwrap()
    }

    #[tokio::test]
    async fn only_configured_tenants_exist() {
        let tenants = ConfigTenants::new([tenant("ns")]);
        assert!(tenants.ensure_exists(&tenant("ns")).await.is_ok());
        assert!(tenants.ensure_exists(&tenant("other")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn namespace_secret_shadows_project_secret() {
        let secrets = ConfigSecrets::new(BTreeMap::from([
            ("t-optimus/DATASTORE_BIGQUERY".to_string(), "project".to_string()),
            ("t-optimus/ns/DATASTORE_BIGQUERY".to_string(), "namespace".to_string()),
        ]));

        let scoped = secrets.get_secret(&tenant("ns"), "DATASTORE_BIGQUERY").await.unwrap();
        assert_eq!(scoped, "namespace");
        let shared = secrets.get_secret(&tenant("ns-b"), "DATASTORE_BIGQUERY").await.unwrap();
        assert_eq!(shared, "project");
        assert!(secrets.get_secret(&tenant("ns"), "OTHER").await.unwrap_err().is_not_found());
    }
}
