use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optimus_core::error::OptimusResult;
use optimus_core::models::resource::Resource;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{Api, decode, description, exists_at, table_path, table_reference};
use crate::bigquery::error::BigQueryError;
use crate::bigquery::handle::{CopyJob, ResourceHandle, TableCopier, TableResourceHandle};
use crate::bigquery::naming::TableName;
use crate::bigquery::spec::{self, Field, Partition, Table};

const JOB_DONE: &str = "DONE";

pub(crate) fn schema_fields(schema: &[Field]) -> Vec<Value> {
    schema
        .iter()
        .map(|field| {
            let mut out = json!({
                "name": field.name,
                "type": field.field_type.to_uppercase(),
            });
            if let Some(mode) = &field.mode {
                out["mode"] = json!(mode.to_uppercase());
            }
            if let Some(description) = &field.description {
                out["description"] = json!(description);
            }
            if !field.schema.is_empty() {
                out["fields"] = json!(schema_fields(&field.schema));
            }
            out
        })
        .collect()
}

/// Partitioning part of a table body. Range partitioning cannot change
/// after creation, so it is only sent on create.
fn apply_partition(body: &mut Value, partition: &Partition, creating: bool) -> OptimusResult<()> {
    if partition.is_range() {
        if let (true, Some(range)) = (creating, &partition.range) {
            body["rangePartitioning"] = json!({
                "field": partition.field,
                "range": {
                    "start": range.start.to_string(),
                    "end": range.end.to_string(),
                    "interval": range.interval.to_string(),
                },
            });
        }
        return Ok(());
    }

    let mut time = json!({ "type": partition.kind().to_uppercase() });
    if let Some(field) = &partition.field {
        time["field"] = json!(field);
    }
    if let Some(hours) = partition.expiration {
        let millis = spec::expiration_millis("partition expiration", hours)?;
        time["expirationMs"] = json!(millis.to_string());
    }
    body["timePartitioning"] = time;
    Ok(())
}

pub(crate) struct RestTable {
    api: Arc<Api>,
    name: TableName,
}

impl RestTable {
    pub(crate) fn new(api: Arc<Api>, name: TableName) -> Self {
        Self { api, name }
    }

    fn body(&self, res: &Resource, creating: bool) -> OptimusResult<Value> {
        let table: Table = spec::decode(res.full_name(), res.spec())?;

        let mut body = json!({
            "tableReference": table_reference(&self.name),
            "description": description(&table.description, &res.metadata().description),
            "labels": res.metadata().labels,
            "schema": { "fields": schema_fields(&table.schema) },
        });
        if let Some(partition) = &table.partition {
            apply_partition(&mut body, partition, creating)?;
        }
        if let Some(cluster) = &table.cluster {
            body["clustering"] = json!({ "fields": cluster.using });
        }
        if let Some(expire_at) = table.expiration_time {
            body["expirationTime"] = json!(expire_at.timestamp_millis().to_string());
        }
        Ok(body)
    }
}

#[async_trait]
impl ResourceHandle for RestTable {
    async fn create(&self, res: &Resource) -> OptimusResult<()> {
        let body = self.body(res, true)?;
        let path = format!(
            "projects/{}/datasets/{}/tables",
            self.name.dataset.project, self.name.dataset.name
        );
        self.api.post(&path, &body).await?;
        Ok(())
    }

    async fn update(&self, res: &Resource) -> OptimusResult<()> {
        let body = self.body(res, false)?;
        self.api.patch(&table_path(&self.name), &body).await?;
        Ok(())
    }

    async fn exists(&self) -> bool {
        exists_at(&self.api, &table_path(&self.name)).await
    }
}

#[async_trait]
impl TableResourceHandle for RestTable {
    fn table_name(&self) -> &TableName {
        &self.name
    }

    fn copier_from(&self, source: &dyn TableResourceHandle) -> Box<dyn TableCopier> {
        Box::new(RestCopier {
            api: self.api.clone(),
            source: source.table_name().clone(),
            destination: self.name.clone(),
        })
    }

    async fn update_expiry(&self, name: &str, expire_at: DateTime<Utc>) -> OptimusResult<()> {
        let target = TableName::new(self.name.dataset.clone(), name);
        let body = json!({ "expirationTime": expire_at.timestamp_millis().to_string() });
        self.api.patch(&table_path(&target), &body).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    #[serde(default)]
    status: JobStatus,
}

struct RestCopier {
    api: Arc<Api>,
    source: TableName,
    destination: TableName,
}

#[async_trait]
impl TableCopier for RestCopier {
    async fn run(&self) -> OptimusResult<Box<dyn CopyJob>> {
        let body = json!({
            "configuration": {
                "copy": {
                    "sourceTable": table_reference(&self.source),
                    "destinationTable": table_reference(&self.destination),
                    "createDisposition": "CREATE_IF_NEEDED",
                    "writeDisposition": "WRITE_TRUNCATE",
                },
            },
        });
        let path = format!("projects/{}/jobs", self.destination.dataset.project);
        let job: Job = decode(self.api.post(&path, &body).await?)?;
        debug!(
            job_id = %job.job_reference.job_id,
            source = %self.source,
            destination = %self.destination,
            "copy job started"
        );

        Ok(Box::new(RestCopyJob {
            api: self.api.clone(),
            reference: job.job_reference,
        }))
    }
}

struct RestCopyJob {
    api: Arc<Api>,
    reference: JobReference,
}

impl RestCopyJob {
    fn path(&self) -> String {
        let mut path = format!(
            "projects/{}/jobs/{}",
            self.reference.project_id, self.reference.job_id
        );
        if let Some(location) = &self.reference.location {
            path.push_str("?location=");
            path.push_str(location);
        }
        path
    }
}

#[async_trait]
impl CopyJob for RestCopyJob {
    async fn wait(&self) -> OptimusResult<()> {
        let path = self.path();
        loop {
            let job: Job = decode(self.api.get(&path).await?)?;
            if job.status.state == JOB_DONE {
                return match job.status.error_result {
                    Some(err) => Err(BigQueryError::Job {
                        job_id: self.reference.job_id.clone(),
                        message: format!("{}: {}", err.reason, err.message),
                    }
                    .into()),
                    None => Ok(()),
                };
            }
            tokio::time::sleep(self.api.poll_interval()).await;
        }
    }
}
