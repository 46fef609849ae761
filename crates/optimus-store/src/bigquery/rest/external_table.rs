use std::sync::Arc;

use async_trait::async_trait;
use optimus_core::error::OptimusResult;
use optimus_core::models::resource::Resource;
use serde_json::{Value, json};

use super::table::schema_fields;
use super::{Api, description, exists_at, table_path, table_reference};
use crate::bigquery::handle::ResourceHandle;
use crate::bigquery::naming::TableName;
use crate::bigquery::spec::{self, ExternalSource, ExternalTable, SOURCE_GOOGLE_SHEETS};

pub(crate) struct RestExternalTable {
    api: Arc<Api>,
    name: TableName,
}

fn source_configuration(source: &ExternalSource, autodetect: bool) -> Value {
    let mut config = json!({
        "sourceUris": source.source_uris,
        "autodetect": autodetect,
    });

    let mut options = json!({});
    if let Some(rows) = source.config.skip_leading_rows {
        options["skipLeadingRows"] = json!(rows.to_string());
    }
    if source.kind() == SOURCE_GOOGLE_SHEETS {
        config["sourceFormat"] = json!("GOOGLE_SHEETS");
        if let Some(range) = &source.config.range {
            options["range"] = json!(range);
        }
        config["googleSheetsOptions"] = options;
    } else {
        config["sourceFormat"] = json!("CSV");
        config["csvOptions"] = options;
    }
    config
}

impl RestExternalTable {
    pub(crate) fn new(api: Arc<Api>, name: TableName) -> Self {
        Self { api, name }
    }

    fn body(&self, res: &Resource) -> OptimusResult<Value> {
        let table: ExternalTable = spec::decode(res.full_name(), res.spec())?;
        let autodetect = table.schema.is_empty();

        let mut body = json!({
            "tableReference": table_reference(&self.name),
            "description": description(&table.description, &res.metadata().description),
            "labels": res.metadata().labels,
        });
        if let Some(source) = &table.source {
            body["externalDataConfiguration"] = source_configuration(source, autodetect);
        }
        if !autodetect {
            body["schema"] = json!({ "fields": schema_fields(&table.schema) });
        }
        Ok(body)
    }
}

#[async_trait]
impl ResourceHandle for RestExternalTable {
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
