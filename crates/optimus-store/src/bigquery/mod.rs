//! BigQuery backend.

pub mod backup;
mod batch;
pub mod error;
pub mod handle;
pub mod naming;
pub mod rest;
pub mod spec;

use std::sync::Arc;

use async_trait::async_trait;
use optimus_core::error::{MultiError, OptimusResult, add_error_context};
use optimus_core::models::backup::{Backup, BackupResult};
use optimus_core::models::resource::{Kind, Resource, Status};
use optimus_core::models::tenant::Tenant;
use optimus_core::repository::{SECRET_DATASTORE_BIGQUERY, SecretProvider};
use tracing::{info, warn};

pub use self::error::BigQueryError;
pub use self::handle::{
    Client, ClientProvider, CopyJob, ResourceHandle, TableCopier, TableResourceHandle,
};
pub use self::naming::{Dataset, TableName};
use crate::runner::ParallelRunner;
use crate::store::DataStore;

/// The BigQuery [`DataStore`].
pub struct BigqueryStore<S> {
    secrets: S,
    clients: Arc<dyn ClientProvider>,
    runner: ParallelRunner,
}

impl<S: SecretProvider> BigqueryStore<S> {
    /// `concurrency` bounds the number of backend calls in flight during
    /// one batch update.
    pub fn new(secrets: S, clients: Arc<dyn ClientProvider>, concurrency: usize) -> Self {
        Self {
            secrets,
            clients,
            runner: ParallelRunner::new(concurrency),
        }
    }

    /// A client for `tenant`, released when the returned handle is dropped.
    async fn client_for(&self, tenant: &Tenant) -> OptimusResult<Arc<dyn Client>> {
        let credential = self
            .secrets
            .get_secret(tenant, SECRET_DATASTORE_BIGQUERY)
            .await
            .map_err(|e| {
                add_error_context(e, naming::ENTITY_BIGQUERY, "not able to get secret")
            })?;
        self.clients.get(&credential).await.map_err(|e| {
            add_error_context(e, naming::ENTITY_BIGQUERY, "not able to create bigquery client")
        })
    }
}

async fn create_with(client: &dyn Client, res: &Resource) -> OptimusResult<()> {
    match res.kind() {
        Kind::Dataset => {
            let dataset = naming::dataset_for(res.kind(), res.full_name())?;
            client.dataset_handle(&dataset).create(res).await
        }
        Kind::Table => {
            let name = naming::table_name_for(res.kind(), res.full_name())?;
            client.table_handle(&name).create(res).await
        }
        Kind::View => {
            let name = naming::table_name_for(res.kind(), res.full_name())?;
            client.view_handle(&name).create(res).await
        }
        Kind::ExternalTable => {
            let name = naming::table_name_for(res.kind(), res.full_name())?;
            client.external_table_handle(&name).create(res).await
        }
    }
}

async fn update_with(client: &dyn Client, res: &Resource) -> OptimusResult<()> {
    match res.kind() {
        Kind::Dataset => {
            let dataset = naming::dataset_for(res.kind(), res.full_name())?;
            client.dataset_handle(&dataset).update(res).await
        }
        Kind::Table => {
            let name = naming::table_name_for(res.kind(), res.full_name())?;
            client.table_handle(&name).update(res).await
        }
        Kind::View => {
            let name = naming::table_name_for(res.kind(), res.full_name())?;
            client.view_handle(&name).update(res).await
        }
        Kind::ExternalTable => {
            let name = naming::table_name_for(res.kind(), res.full_name())?;
            client.external_table_handle(&name).update(res).await
        }
    }
}

fn is_pending(res: &Resource) -> bool {
    matches!(res.status(), Status::ToCreate | Status::ToUpdate)
}

#[async_trait]
impl<S: SecretProvider + 'static> DataStore for BigqueryStore<S> {
    async fn create(&self, res: &Resource) -> OptimusResult<()> {
        let client = self.client_for(res.tenant()).await?;
        create_with(client.as_ref(), res).await
    }

    async fn update(&self, res: &Resource) -> OptimusResult<()> {
        let client = self.client_for(res.tenant()).await?;
        update_with(client.as_ref(), res).await
    }

    async fn batch_update(&self, resources: &mut [Resource]) -> OptimusResult<()> {
        let Some(first) = resources.first() else {
            return Ok(());
        };
        let tenant = first.tenant().clone();

        let mut me = MultiError::new("error while processing batch update");
        let client = match self.client_for(&tenant).await {
            Ok(client) => client,
            Err(err) => {
                warn!(%tenant, error = %err, "cannot reach bigquery for batch");
                for res in resources.iter_mut().filter(|r| is_pending(r)) {
                    me.append_result(res.mark_failure());
                }
                me.append(err);
                return me.into_result();
            }
        };

        let (batches, rejected) = batch::batches_from(resources);
        for (idx, err) in rejected {
            me.append_result(resources[idx].mark_failure());
            me.append(err);
        }

        info!(%tenant, batches = batches.len(), "starting batch update");
        let runs = batches
            .into_iter()
            .map(|b| b.run(client.clone(), self.runner.clone()));
        for outcome in ParallelRunner::unbounded().run(runs).await {
            match outcome {
                Ok(states) => {
                    for state in states {
                        if let Some(idx) = state.entry.idx {
                            resources[idx] = state.entry.res;
                        }
                        me.append_result(state.result);
                    }
                }
                Err(err) => me.append(err),
            }
        }

        me.into_result()
    }

    fn validate(&self, res: &Resource) -> OptimusResult<()> {
        naming::validate_name(res.kind(), res.full_name())?;
        spec::validate_spec(res)
    }

    fn get_urn(&self, res: &Resource) -> OptimusResult<String> {
        naming::urn_for(res.kind(), res.full_name())
    }

    fn backup_plan(&self, _backup: &Backup, resources: &[Resource]) -> BackupResult {
        let (tables, ignored) = backup::plan(resources);
        BackupResult {
            resource_names: tables.iter().map(|r| r.full_name().to_string()).collect(),
            ignored_resources: ignored,
        }
    }

    async fn backup(&self, backup: &Backup, resources: &[Resource]) -> OptimusResult<BackupResult> {
        let client = self.client_for(backup.tenant()).await?;
        backup::backup_resources(backup, resources, client.as_ref())
            .await
            .map_err(|e| add_error_context(e, naming::ENTITY_BIGQUERY, "error while taking backup"))
    }
}

impl<S> std::fmt::Debug for BigqueryStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigqueryStore")
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}
