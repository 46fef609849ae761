//! Table snapshots into a TTL-bounded backup dataset.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use optimus_core::error::{OptimusError, OptimusResult};
use optimus_core::models::backup::{
    Backup, BackupResult, CONFIG_DATASET, CONFIG_PREFIX, CONFIG_TTL, DEFAULT_DATASET,
    DEFAULT_PREFIX, DEFAULT_TTL, ENTITY_BACKUP, IgnoredResource,
};
use optimus_core::models::resource::{Kind, Metadata, Resource, Store};
use serde_json::json;
use tracing::info;

use super::handle::Client;
use super::naming::{self, Dataset, TableName};

const BACKUP_DATASET_DESCRIPTION: &str = "backup dataset created by optimus";

/// Resources a backup would copy, and the ones it skips with a reason.
pub fn plan(resources: &[Resource]) -> (Vec<&Resource>, Vec<IgnoredResource>) {
    let mut tables = Vec::new();
    let mut ignored = Vec::new();
    for res in resources {
        if res.kind() == Kind::Table {
            tables.push(res);
        } else {
            ignored.push(IgnoredResource {
                name: res.full_name().to_string(),
                reason: format!("backup not supported for {}", res.kind()),
            });
        }
    }
    (tables, ignored)
}

pub fn destination_dataset(project: &str, backup: &Backup) -> Dataset {
    Dataset::new(project, backup.config_or(CONFIG_DATASET, DEFAULT_DATASET))
}

/// `{prefix}_{dataset}_{table}_{yyyy_mm_dd_hh_mm_ss}` of the backup time.
pub fn destination_table_name(source: &TableName, backup: &Backup) -> String {
    format!(
        "{}_{}_{}_{}",
        backup.config_or(CONFIG_PREFIX, DEFAULT_PREFIX),
        source.dataset.name,
        source.name,
        backup.created_at().format("%Y_%m_%d_%H_%M_%S"),
    )
}

/// `created_at` plus the configured ttl.
pub fn expiry_time(backup: &Backup) -> OptimusResult<DateTime<Utc>> {
    let ttl = backup.config_or(CONFIG_TTL, DEFAULT_TTL);
    let parsed = humantime::parse_duration(ttl).map_err(|e| {
        OptimusError::invalid_argument(ENTITY_BACKUP, format!("invalid ttl {ttl}: {e}"))
    })?;
    let delta = chrono::Duration::from_std(parsed).map_err(|e| {
        OptimusError::invalid_argument(ENTITY_BACKUP, format!("ttl {ttl} out of range: {e}"))
    })?;
    Ok(backup.created_at() + delta)
}

async fn ensure_dataset(client: &dyn Client, dataset: &Dataset, backup: &Backup) -> OptimusResult<()> {
    let spec = json!({ "description": BACKUP_DATASET_DESCRIPTION });
    let metadata = Metadata {
        version: 1,
        description: BACKUP_DATASET_DESCRIPTION.into(),
        labels: BTreeMap::from([("created_by".to_string(), "optimus".to_string())]),
    };
    let res = Resource::new(
        &dataset.full_name(),
        Kind::Dataset,
        Store::Bigquery,
        backup.tenant().clone(),
        metadata,
        spec.as_object().cloned().unwrap_or_default(),
    )?;

    match client.dataset_handle(dataset).create(&res).await {
        Ok(()) => Ok(()),
        Err(err) if err.is_already_exists() => Ok(()),
        Err(err) => Err(OptimusError::internal_with(
            ENTITY_BACKUP,
            format!("failed to create backup dataset {dataset}"),
            err,
        )),
    }
}

async fn backup_table(
    client: &dyn Client,
    backup: &Backup,
    source: &TableName,
    destination_dataset: &Dataset,
    expire_at: DateTime<Utc>,
) -> OptimusResult<String> {
    let destination = TableName::new(
        destination_dataset.clone(),
        destination_table_name(source, backup),
    );
    let wrap = |step: &str, err: OptimusError| {
        OptimusError::internal_with(
            ENTITY_BACKUP,
            format!("failed to {step} {source} to {destination}"),
            err,
        )
    };

    let source_handle = client.table_handle(source);
    let destination_handle = client.table_handle(&destination);

    let job = destination_handle
        .copier_from(source_handle.as_ref())
        .run()
        .await
        .map_err(|e| wrap("start copy of", e))?;
    job.wait().await.map_err(|e| wrap("copy", e))?;
    destination_handle
        .update_expiry(&destination.name, expire_at)
        .await
        .map_err(|e| wrap("set expiry after copying", e))?;

    info!(source = %source, destination = %destination, "table backed up");
    Ok(destination.full_name())
}

/// Copies every table in `resources` and reports what was produced and
/// what was ignored. Stops at the first failure.
pub async fn backup_resources(
    backup: &Backup,
    resources: &[Resource],
    client: &dyn Client,
) -> OptimusResult<BackupResult> {
    let (tables, ignored) = plan(resources);
    let mut result = BackupResult {
        resource_names: Vec::with_capacity(tables.len()),
        ignored_resources: ignored,
    };
    let Some(first) = tables.first() else {
        return Ok(result);
    };

    let expire_at = expiry_time(backup)?;
    let sources = tables
        .iter()
        .map(|res| naming::table_name_for(res.kind(), res.full_name()))
        .collect::<OptimusResult<Vec<_>>>()?;

    let first_project = naming::dataset_for(first.kind(), first.full_name())?.project;
    let destination = destination_dataset(&first_project, backup);
    ensure_dataset(client, &destination, backup).await?;

    for source in &sources {
        let name = backup_table(client, backup, source, &destination, expire_at).await?;
        result.resource_names.push(name);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::TimeZone;
    use optimus_core::models::tenant::Tenant;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::bigquery::handle::{CopyJob, ResourceHandle, TableCopier, TableResourceHandle};

    #[derive(Default)]
    struct Recorder {
        datasets: Vec<String>,
        copies: Vec<(String, String)>,
        expiries: Vec<(String, DateTime<Utc>)>,
    }

    #[derive(Clone, Default)]
    struct FakeClient {
        log: Arc<Mutex<Recorder>>,
        dataset_exists: bool,
    }

    struct FakeHandle {
        client: FakeClient,
        name: TableName,
        dataset: Dataset,
    }

    struct FakeCopier {
        client: FakeClient,
        from: String,
        to: String,
    }

    struct DoneJob;

    #[async_trait]
    impl CopyJob for DoneJob {
        async fn wait(&self) -> OptimusResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl TableCopier for FakeCopier {
        async fn run(&self) -> OptimusResult<Box<dyn CopyJob>> {
            self.client
                .log
                .lock()
                .unwrap()
                .copies
                .push((self.from.clone(), self.to.clone()));
            Ok(Box::new(DoneJob))
        }
    }

    #[async_trait]
    impl ResourceHandle for FakeHandle {
        async fn create(&self, _res: &Resource) -> OptimusResult<()> {
            if self.client.dataset_exists {
                return Err(OptimusError::already_exists("test", "Already Exists"));
            }
            self.client
                .log
                .lock()
                .unwrap()
                .datasets
                .push(self.dataset.full_name());
            Ok(())
        }

        async fn update(&self, _res: &Resource) -> OptimusResult<()> {
            Ok(())
        }

        async fn exists(&self) -> bool {
            false
        }
    }

    #[async_trait]
    impl TableResourceHandle for FakeHandle {
        fn table_name(&self) -> &TableName {
            &self.name
        }

        fn copier_from(&self, source: &dyn TableResourceHandle) -> Box<dyn TableCopier> {
            Box::new(FakeCopier {
                client: self.client.clone(),
                from: source.table_name().full_name(),
                to: self.name.full_name(),
            })
        }

        async fn update_expiry(&self, name: &str, expire_at: DateTime<Utc>) -> OptimusResult<()> {
            self.client
                .log
                .lock()
                .unwrap()
                .expiries
                .push((name.to_string(), expire_at));
            Ok(())
        }
    }

    impl FakeClient {
        fn handle(&self, name: &TableName) -> FakeHandle {
            FakeHandle {
                client: self.clone(),
                name: name.clone(),
                dataset: name.dataset.clone(),
            }
        }
    }

    impl Client for FakeClient {
        fn dataset_handle(&self, dataset: &Dataset) -> Box<dyn ResourceHandle> {
            Box::new(self.handle(&TableName::new(dataset.clone(), "")))
        }

        fn table_handle(&self, name: &TableName) -> Box<dyn TableResourceHandle> {
            Box::new(self.handle(name))
        }

        fn view_handle(&self, name: &TableName) -> Box<dyn ResourceHandle> {
            Box::new(self.handle(name))
        }

        fn external_table_handle(&self, name: &TableName) -> Box<dyn ResourceHandle> {
            Box::new(self.handle(name))
        }
    }

    fn tenant() -> Tenant {
        Tenant::new("t-optimus", "ns").unwrap()
    }

    fn resource(name: &str, kind: Kind) -> Resource {
        let spec = json!({ "description": "d" });
        Resource::new(
            name,
            kind,
            Store::Bigquery,
            tenant(),
            Metadata::default(),
            spec.as_object().cloned().unwrap(),
        )
        .unwrap()
    }

    fn backup_at(created_at: DateTime<Utc>, config: BTreeMap<String, String>) -> Backup {
        Backup::new(
            Store::Bigquery,
            tenant(),
            vec!["t-optimus.playground.product".into()],
            "",
            created_at,
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn views_are_ignored() {
        let client = FakeClient::default();
        let backup = backup_at(Utc::now(), BTreeMap::new());
        let view = resource("t-optimus.playground.product-view", Kind::View);

        let result = backup_resources(&backup, &[view], &client).await.unwrap();

        assert!(result.resource_names.is_empty());
        assert_eq!(
            result.ignored_resources,
            vec![IgnoredResource {
                name: "t-optimus.playground.product-view".into(),
                reason: "backup not supported for view".into(),
            }]
        );
        assert!(client.log.lock().unwrap().datasets.is_empty());
    }

    #[tokio::test]
    async fn table_backup_uses_default_naming_and_ttl() {
        let client = FakeClient::default();
        let created_at = Utc.with_ymd_and_hms(2022, 11, 18, 1, 0, 0).unwrap();
        let backup = backup_at(created_at, BTreeMap::new());
        let table = resource("t-optimus.playground.product", Kind::Table);

        let result = backup_resources(&backup, &[table], &client).await.unwrap();

        assert_eq!(
            result.resource_names,
            vec!["t-optimus.optimus_backup.backup_playground_product_2022_11_18_01_00_00"]
        );
        let log = client.log.lock().unwrap();
        assert_eq!(log.datasets, vec!["t-optimus.optimus_backup"]);
        assert_eq!(
            log.copies,
            vec![(
                "t-optimus.playground.product".to_string(),
                "t-optimus.optimus_backup.backup_playground_product_2022_11_18_01_00_00"
                    .to_string()
            )]
        );
        assert_eq!(
            log.expiries,
            vec![(
                "backup_playground_product_2022_11_18_01_00_00".to_string(),
                Utc.with_ymd_and_hms(2022, 12, 18, 1, 0, 0).unwrap()
            )]
        );
    }

    #[tokio::test]
    async fn existing_backup_dataset_is_reused() {
        let client = FakeClient {
            dataset_exists: true,
            ..Default::default()
        };
        let backup = backup_at(Utc::now(), BTreeMap::new());
        let table = resource("t-optimus.playground.product", Kind::Table);

        let result = backup_resources(&backup, &[table], &client).await.unwrap();
        assert_eq!(result.resource_names.len(), 1);
    }

    #[tokio::test]
    async fn custom_config_is_applied() {
        let client = FakeClient::default();
        let created_at = Utc.with_ymd_and_hms(2022, 11, 18, 1, 0, 0).unwrap();
        let config = BTreeMap::from([
            (CONFIG_DATASET.to_string(), "archive".to_string()),
            (CONFIG_PREFIX.to_string(), "snap".to_string()),
            (CONFIG_TTL.to_string(), "48h".to_string()),
        ]);
        let backup = backup_at(created_at, config);

        assert_eq!(
            expiry_time(&backup).unwrap(),
            Utc.with_ymd_and_hms(2022, 11, 20, 1, 0, 0).unwrap()
        );
        let table = resource("t-optimus.playground.product", Kind::Table);
        let result = backup_resources(&backup, &[table], &client).await.unwrap();
        assert_eq!(
            result.resource_names,
            vec!["t-optimus.archive.snap_playground_product_2022_11_18_01_00_00"]
        );
    }

    #[tokio::test]
    async fn invalid_ttl_is_invalid_argument() {
        let client = FakeClient::default();
        let config = BTreeMap::from([(CONFIG_TTL.to_string(), "forever".to_string())]);
        let backup = backup_at(Utc::now(), config);
        let table = resource("t-optimus.playground.product", Kind::Table);

        let err = backup_resources(&backup, &[table], &client)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), optimus_core::ErrorKind::InvalidArgument);
        assert!(client.log.lock().unwrap().copies.is_empty());
    }
}
