use async_trait::async_trait;
use optimus_core::error::OptimusResult;
use optimus_core::models::backup::{Backup, BackupResult};
use optimus_core::models::resource::Resource;

/// A backend that owns physical resources.
///
/// Single-resource calls only talk to the backend; status bookkeeping is
/// left to the caller. `batch_update` is the reconciler path and moves
/// every pending resource in `resources` to a terminal status in place.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn create(&self, res: &Resource) -> OptimusResult<()>;

    async fn update(&self, res: &Resource) -> OptimusResult<()>;

    async fn batch_update(&self, resources: &mut [Resource]) -> OptimusResult<()>;

    /// Checks the name and decodes the spec for the resource kind.
    fn validate(&self, res: &Resource) -> OptimusResult<()>;

    fn get_urn(&self, res: &Resource) -> OptimusResult<String>;

    /// Splits `resources` into what a backup would copy and what it would
    /// ignore, without touching the backend.
    fn backup_plan(&self, backup: &Backup, resources: &[Resource]) -> BackupResult;

    async fn backup(&self, backup: &Backup, resources: &[Resource]) -> OptimusResult<BackupResult>;
}
