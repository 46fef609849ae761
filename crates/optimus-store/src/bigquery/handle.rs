//! Capability traits for BigQuery objects.
//!
//! A [`Client`] is bound to one tenant credential and hands out handles,
//! each scoped to a single dataset, table, view or external table.
//! Dropping the client releases it; it is acquired per unit of work.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optimus_core::error::OptimusResult;
use optimus_core::models::resource::Resource;

use super::naming::{Dataset, TableName};

#[async_trait]
pub trait ResourceHandle: Send + Sync {
    async fn create(&self, res: &Resource) -> OptimusResult<()>;

    async fn update(&self, res: &Resource) -> OptimusResult<()>;

    /// Lookup failures of any kind read as "does not exist".
    async fn exists(&self) -> bool;
}

#[async_trait]
pub trait TableResourceHandle: ResourceHandle {
    fn table_name(&self) -> &TableName;

    /// A copier that fills this table from `source`.
    fn copier_from(&self, source: &dyn TableResourceHandle) -> Box<dyn TableCopier>;

    async fn update_expiry(&self, name: &str, expire_at: DateTime<Utc>) -> OptimusResult<()>;
}

#[async_trait]
pub trait TableCopier: Send + Sync {
    /// Starts the copy and returns the running job.
    async fn run(&self) -> OptimusResult<Box<dyn CopyJob>>;
}

#[async_trait]
pub trait CopyJob: Send + Sync {
    /// Blocks until the job is done.
    async fn wait(&self) -> OptimusResult<()>;
}

pub trait Client: Send + Sync {
    fn dataset_handle(&self, dataset: &Dataset) -> Box<dyn ResourceHandle>;

    fn table_handle(&self, name: &TableName) -> Box<dyn TableResourceHandle>;

    fn view_handle(&self, name: &TableName) -> Box<dyn ResourceHandle>;

    fn external_table_handle(&self, name: &TableName) -> Box<dyn ResourceHandle>;
}

#[async_trait]
pub trait ClientProvider: Send + Sync {
    /// Builds a client from a `DATASTORE_BIGQUERY` credential.
    async fn get(&self, credential: &str) -> OptimusResult<Arc<dyn Client>>;
}
