//! Dataset-grouped reconciliation.
//!
//! Resources are grouped by the dataset they live in. Within a group the
//! dataset is reconciled first and everything else fans out afterwards;
//! groups are independent of each other.

use std::collections::BTreeMap;
use std::sync::Arc;

use optimus_core::error::{OptimusError, OptimusResult};
use optimus_core::models::resource::{Kind, Metadata, Resource, Status, Store};
use optimus_core::models::tenant::Tenant;
use serde_json::json;
use tracing::{debug, warn};

use super::handle::{Client, ResourceHandle};
use super::naming::{self, Dataset};
use crate::runner::ParallelRunner;

const DEFAULT_DATASET_DESCRIPTION: &str = "dataset created by optimus";

/// A resource travelling through the reconciler together with its position
/// in the caller's slice. Synthesised datasets have no position.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) idx: Option<usize>,
    pub(crate) res: Resource,
}

#[derive(Debug)]
pub(crate) struct TaskState {
    pub(crate) entry: Entry,
    pub(crate) result: OptimusResult<()>,
}

#[derive(Debug)]
pub(crate) struct Batch {
    dataset: Dataset,
    dataset_entry: Entry,
    tables: Vec<Entry>,
    external_tables: Vec<Entry>,
    views: Vec<Entry>,
}

#[derive(Debug, Default)]
struct Group {
    dataset: Option<Entry>,
    tables: Vec<Entry>,
    external_tables: Vec<Entry>,
    views: Vec<Entry>,
    tenant: Option<Tenant>,
}

fn default_dataset(dataset: &Dataset, tenant: Tenant) -> OptimusResult<Resource> {
    let metadata = Metadata {
        version: 1,
        description: DEFAULT_DATASET_DESCRIPTION.into(),
        labels: BTreeMap::from([("created_by".to_string(), "optimus".to_string())]),
    };
    let spec = json!({ "description": DEFAULT_DATASET_DESCRIPTION });
    let mut res = Resource::new(
        &dataset.full_name(),
        Kind::Dataset,
        Store::Bigquery,
        tenant,
        metadata,
        spec.as_object().cloned().unwrap_or_default(),
    )?;
    res.mark_validation_success()?;
    res.mark_to_create()?;
    Ok(res)
}

/// Groups resources by dataset. Resources whose name cannot be split are
/// returned separately with the reason.
pub(crate) fn batches_from(
    resources: &[Resource],
) -> (Vec<Batch>, Vec<(usize, OptimusError)>) {
    let mut groups: BTreeMap<Dataset, Group> = BTreeMap::new();
    let mut rejected = Vec::new();

    for (idx, res) in resources.iter().enumerate() {
        let dataset = match naming::dataset_for(res.kind(), res.full_name()) {
            Ok(dataset) => dataset,
            Err(err) => {
                rejected.push((idx, err));
                continue;
            }
        };
        let group = groups.entry(dataset).or_default();
        group.tenant.get_or_insert_with(|| res.tenant().clone());

        let entry = Entry {
            idx: Some(idx),
            res: res.clone(),
        };
        match res.kind() {
            Kind::Dataset => group.dataset = Some(entry),
            Kind::Table => group.tables.push(entry),
            Kind::ExternalTable => group.external_tables.push(entry),
            Kind::View => group.views.push(entry),
        }
    }

    let mut batches = Vec::with_capacity(groups.len());
    for (dataset, group) in groups {
        let dataset_entry = match group.dataset {
            Some(entry) => entry,
            None => {
                let Some(tenant) = group.tenant else {
                    continue;
                };
                match default_dataset(&dataset, tenant) {
                    Ok(res) => Entry { idx: None, res },
                    Err(err) => {
                        for entry in group
                            .tables
                            .iter()
                            .chain(&group.external_tables)
                            .chain(&group.views)
                        {
                            if let Some(idx) = entry.idx {
                                rejected.push((idx, add_dataset_context(&err, &dataset)));
                            }
                        }
                        continue;
                    }
                }
            }
        };
        batches.push(Batch {
            dataset,
            dataset_entry,
            tables: group.tables,
            external_tables: group.external_tables,
            views: group.views,
        });
    }

    (batches, rejected)
}

fn add_dataset_context(err: &OptimusError, dataset: &Dataset) -> OptimusError {
    OptimusError::internal(
        naming::ENTITY_BIGQUERY,
        format!("cannot prepare dataset {dataset}: {err}"),
    )
}

/// Drives one pending resource through its backend operation.
pub(crate) async fn reconcile<H>(handle: &H, res: &mut Resource) -> OptimusResult<()>
where
    H: ResourceHandle + ?Sized,
{
    match res.status() {
        Status::ToCreate => {
            if handle.exists().await {
                debug!(resource = %res.full_name(), "already present in store");
                return res.mark_success();
            }
            match handle.create(res).await {
                Ok(()) => res.mark_success(),
                Err(err) if err.is_already_exists() => res.mark_success(),
                Err(err) => {
                    warn!(resource = %res.full_name(), error = %err, "create failed");
                    res.mark_failure()?;
                    Err(err)
                }
            }
        }
        Status::ToUpdate => match handle.update(res).await {
            Ok(()) => res.mark_success(),
            Err(err) => {
                warn!(resource = %res.full_name(), error = %err, "update failed");
                res.mark_failure()?;
                Err(err)
            }
        },
        _ => Ok(()),
    }
}

async fn reconcile_entry(client: Arc<dyn Client>, mut entry: Entry) -> TaskState {
    let res = &mut entry.res;
    let result = match res.kind() {
        Kind::Dataset => match naming::dataset_for(res.kind(), res.full_name()) {
            Ok(dataset) => reconcile(client.dataset_handle(&dataset).as_ref(), res).await,
            Err(err) => Err(err),
        },
        kind => match naming::table_name_for(kind, res.full_name()) {
            Ok(name) => match kind {
                Kind::Table => reconcile(client.table_handle(&name).as_ref(), res).await,
                Kind::View => reconcile(client.view_handle(&name).as_ref(), res).await,
                _ => reconcile(client.external_table_handle(&name).as_ref(), res).await,
            },
            Err(err) => Err(err),
        },
    };

    TaskState { entry, result }
}

fn failed_state(mut entry: Entry, err: OptimusError) -> TaskState {
    let result = match entry.res.mark_failure() {
        Ok(()) => Err(err),
        Err(mark_err) => Err(OptimusError::internal(
            naming::ENTITY_BIGQUERY,
            format!("{err}; {mark_err}"),
        )),
    };
    TaskState { entry, result }
}

impl Batch {
    pub(crate) fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Reconciles the dataset, then the remaining resources through
    /// `runner`. Every entry comes back exactly once.
    pub(crate) async fn run(self, client: Arc<dyn Client>, runner: ParallelRunner) -> Vec<TaskState> {
        debug!(
            dataset = %self.dataset,
            tables = self.tables.len(),
            external_tables = self.external_tables.len(),
            views = self.views.len(),
            "reconciling batch"
        );

        let mut states = Vec::with_capacity(
            1 + self.tables.len() + self.external_tables.len() + self.views.len(),
        );
        states.push(reconcile_entry(client.clone(), self.dataset_entry).await);

        let entries: Vec<Entry> = self
            .tables
            .into_iter()
            .chain(self.external_tables)
            .chain(self.views)
            .collect();
        let originals = entries.clone();
        let tasks = entries
            .into_iter()
            .map(|entry| reconcile_entry(client.clone(), entry));

        for (slot, original) in runner.run(tasks).await.into_iter().zip(originals) {
            states.push(match slot {
                Ok(state) => state,
                Err(err) => failed_state(original, err),
            });
        }
        states
    }
}
