use std::sync::Arc;

use async_trait::async_trait;
use optimus_core::error::OptimusResult;
use optimus_core::models::resource::Resource;
use serde_json::{Value, json};

use super::{Api, dataset_path, description, exists_at};
use crate::bigquery::handle::ResourceHandle;
use crate::bigquery::naming::Dataset;
use crate::bigquery::spec::{self, DatasetDetails};

pub(crate) struct RestDataset {
    api: Arc<Api>,
    dataset: Dataset,
}

impl RestDataset {
    pub(crate) fn new(api: Arc<Api>, dataset: Dataset) -> Self {
        Self { api, dataset }
    }

    fn body(&self, res: &Resource, details: &DatasetDetails) -> OptimusResult<Value> {
        let mut body = json!({
            "datasetReference": {
                "projectId": self.dataset.project,
                "datasetId": self.dataset.name,
            },
            "description": description(&details.description, &res.metadata().description),
            "labels": res.metadata().labels,
        });
        if let Some(hours) = details.table_expiration {
            let millis = spec::expiration_millis("table_expiration", hours)?;
            body["defaultTableExpirationMs"] = json!(millis.to_string());
        }
        Ok(body)
    }
}

#[async_trait]
impl ResourceHandle for RestDataset {
    async fn create(&self, res: &Resource) -> OptimusResult<()> {
        let details: DatasetDetails = spec::decode(res.full_name(), res.spec())?;
        let mut body = self.body(res, &details)?;
        if let Some(location) = &details.location {
            body["location"] = json!(location);
        }

        let path = format!("projects/{}/datasets", self.dataset.project);
        self.api.post(&path, &body).await?;
        Ok(())
    }

    async fn update(&self, res: &Resource) -> OptimusResult<()> {
        let details: DatasetDetails = spec::decode(res.full_name(), res.spec())?;
        let body = self.body(res, &details)?;
        self.api.patch(&dataset_path(&self.dataset), &body).await?;
        Ok(())
    }

    async fn exists(&self) -> bool {
        exists_at(&self.api, &dataset_path(&self.dataset)).await
    }
}
