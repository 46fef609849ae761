//! Dispatch from resources to the data store that owns them, with status
//! write-back after every backend call.

use std::collections::HashMap;
use std::sync::Arc;

use optimus_core::error::{MultiError, OptimusError, OptimusResult};
use optimus_core::models::backup::{Backup, BackupResult};
use optimus_core::models::resource::{ENTITY_RESOURCE, Resource, Store};
use optimus_core::repository::ResourceRepository;
use optimus_store::DataStore;
use tracing::{debug, warn};

pub struct ResourceManager<R: ResourceRepository> {
    repo: Arc<R>,
    stores: HashMap<Store, Arc<dyn DataStore>>,
}

impl<R: ResourceRepository> ResourceManager<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            stores: HashMap::new(),
        }
    }

    pub fn register_store(&mut self, store: Store, data_store: Arc<dyn DataStore>) {
        self.stores.insert(store, data_store);
    }

    fn data_store(&self, store: Store) -> OptimusResult<&Arc<dyn DataStore>> {
        self.stores.get(&store).ok_or_else(|| {
            OptimusError::invalid_argument(
                ENTITY_RESOURCE,
                format!("data store service not found for {store}"),
            )
        })
    }

    pub fn validate(&self, res: &Resource) -> OptimusResult<()> {
        self.data_store(res.store())?.validate(res)
    }

    pub fn get_urn(&self, res: &Resource) -> OptimusResult<String> {
        self.data_store(res.store())?.get_urn(res)
    }

    /// Creates `res` in its store. A resource that is already there
    /// counts as created.
    pub async fn create_resource(&self, res: &mut Resource) -> OptimusResult<()> {
        let store = self.data_store(res.store())?;

        let mut me = MultiError::new("error while creating resource");
        match store.create(res).await {
            Ok(()) => {
                me.append_result(res.mark_success());
            }
            Err(err) if err.is_already_exists() => {
                debug!(resource = %res.full_name(), "resource already present in store");
                me.append_result(res.mark_success());
            }
            Err(err) => {
                warn!(resource = %res.full_name(), error = %err, "create failed");
                me.append_result(res.mark_failure());
                me.append(err);
            }
        }

        me.append_result(self.repo.update_status(std::slice::from_ref(res)).await);
        me.into_result()
    }

    pub async fn update_resource(&self, res: &mut Resource) -> OptimusResult<()> {
        let store = self.data_store(res.store())?;

        let mut me = MultiError::new("error while updating resource");
        match store.update(res).await {
            Ok(()) => {
                me.append_result(res.mark_success());
            }
            Err(err) => {
                warn!(resource = %res.full_name(), error = %err, "update failed");
                me.append_result(res.mark_failure());
                me.append(err);
            }
        }

        me.append_result(self.repo.update_status(std::slice::from_ref(res)).await);
        me.into_result()
    }

    /// Reconciles `resources` through the store batch path, then persists
    /// the status of every one of them.
    pub async fn deploy(&self, store: Store, resources: &mut [Resource]) -> OptimusResult<()> {
        let data_store = self.data_store(store)?;

        let mut me = MultiError::new("error while deploying resources");
        me.append_result(data_store.batch_update(resources).await);
        me.append_result(self.repo.update_status(resources).await);
        me.into_result()
    }

    pub fn backup_plan(&self, backup: &Backup, resources: &[Resource]) -> OptimusResult<BackupResult> {
        Ok(self.data_store(backup.store())?.backup_plan(backup, resources))
    }

    pub async fn backup(&self, backup: &Backup, resources: &[Resource]) -> OptimusResult<BackupResult> {
        self.data_store(backup.store())?
            .backup(backup, resources)
            .await
    }
}
