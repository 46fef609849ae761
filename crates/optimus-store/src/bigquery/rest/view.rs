use std::sync::Arc;

use async_trait::async_trait;
use optimus_core::error::OptimusResult;
use optimus_core::models::resource::Resource;
use serde_json::{Value, json};

use super::{Api, description, exists_at, table_path, table_reference};
use crate::bigquery::handle::ResourceHandle;
use crate::bigquery::naming::TableName;
use crate::bigquery::spec::{self, View};

pub(crate) struct RestView {
    api: Arc<Api>,
    name: TableName,
}

impl RestView {
    pub(crate) fn new(api: Arc<Api>, name: TableName) -> Self {
        Self { api, name }
    }

    fn body(&self, res: &Resource) -> OptimusResult<Value> {
        let view: View = spec::decode(res.full_name(), res.spec())?;
        Ok(json!({
            "tableReference": table_reference(&self.name),
            "description": description(&view.description, &res.metadata().description),
            "labels": res.metadata().labels,
            "view": {
                "query": view.view_query,
                "useLegacySql": false,
            },
        }))
    }
}

#[async_trait]
impl ResourceHandle for RestView {
    async fn create(&self, res: &Resource) -> OptimusResult<()> {
        let body = self.body(res)?;
        let path = format!(
            "projects/{}/datasets/{}/tables",
            self.name.dataset.project, self.name.dataset.name
        );
        self.api.post(&path, &body).await?;
        Ok(())
    }

    async fn update(&self, res: &Resource) -> OptimusResult<()> {
        let body = self.body(res)?;
        self.api.patch(&table_path(&self.name), &body).await?;
        Ok(())
    }

    async fn exists(&self) -> bool {
        exists_at(&self.api, &table_path(&self.name)).await
    }
}
