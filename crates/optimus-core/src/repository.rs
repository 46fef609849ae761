//! Repository and lookup trait definitions.
//!
//! All operations are async and tenant-scoped. Implementations live in
//! `optimus-db` (persistence) and `optimus-server` (config-backed
//! tenant and secret lookups).

use uuid::Uuid;

use crate::error::OptimusResult;
use crate::models::backup::Backup;
use crate::models::resource::{Resource, Store};
use crate::models::tenant::{NamespaceName, Tenant};

/// Name of the secret holding the BigQuery service-account credential.
pub const SECRET_DATASTORE_BIGQUERY: &str = "DATASTORE_BIGQUERY";

pub trait ResourceRepository: Send + Sync {
    /// Inserts a new row. Fails with `already_exists` when the
    /// (project, namespace, store, full_name) key is taken.
    fn create(&self, res: &Resource) -> impl Future<Output = OptimusResult<()>> + Send;

    /// Replaces kind, metadata, spec, urn and status of an existing row.
    fn update(&self, res: &Resource) -> impl Future<Output = OptimusResult<()>> + Send;

    fn read_by_full_name(
        &self,
        tenant: &Tenant,
        store: Store,
        full_name: &str,
    ) -> impl Future<Output = OptimusResult<Resource>> + Send;

    fn read_all(
        &self,
        tenant: &Tenant,
        store: Store,
    ) -> impl Future<Output = OptimusResult<Vec<Resource>>> + Send;

    /// Rows matching any of `names`; absent names are simply missing
    /// from the result.
    fn read_by_full_names(
        &self,
        tenant: &Tenant,
        store: Store,
        names: &[String],
    ) -> impl Future<Output = OptimusResult<Vec<Resource>>> + Send;

    /// Writes every resource in one transaction, inserting `to_create`
    /// rows and updating `to_update` rows. Per-row problems are
    /// aggregated; nothing is written unless all rows succeed.
    fn create_or_update_all(
        &self,
        resources: &[Resource],
    ) -> impl Future<Output = OptimusResult<()>> + Send;

    /// Persists only the status of each resource.
    fn update_status(
        &self,
        resources: &[Resource],
    ) -> impl Future<Output = OptimusResult<()>> + Send;

    /// Moves a row to another namespace of the same project.
    fn change_namespace(
        &self,
        res: &Resource,
        new_namespace: &NamespaceName,
    ) -> impl Future<Output = OptimusResult<()>> + Send;
}

pub trait BackupRepository: Send + Sync {
    /// Persists the backup and returns its generated id.
    fn create(&self, backup: &Backup) -> impl Future<Output = OptimusResult<Uuid>> + Send;

    fn get_by_id(
        &self,
        tenant: &Tenant,
        store: Store,
        id: Uuid,
    ) -> impl Future<Output = OptimusResult<Backup>> + Send;

    fn get_all(
        &self,
        tenant: &Tenant,
        store: Store,
    ) -> impl Future<Output = OptimusResult<Vec<Backup>>> + Send;
}

pub trait TenantDetailsGetter: Send + Sync {
    /// Fails with `not_found` when the tenant is not registered.
    fn ensure_exists(&self, tenant: &Tenant) -> impl Future<Output = OptimusResult<()>> + Send;
}

pub trait SecretProvider: Send + Sync {
    fn get_secret(
        &self,
        tenant: &Tenant,
        name: &str,
    ) -> impl Future<Output = OptimusResult<String>> + Send;
}
