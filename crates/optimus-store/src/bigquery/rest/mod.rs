//! BigQuery REST v2 implementation of the handle traits.

mod auth;
mod dataset;
mod external_table;
mod table;
mod view;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use optimus_core::error::OptimusResult;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

pub use auth::{
    AssertionClaims, BIGQUERY_SCOPE, DEFAULT_TOKEN_URI, ServiceAccountKey,
    ServiceAccountTokenSource, StaticToken, TokenSource,
};

use self::dataset::RestDataset;
use self::external_table::RestExternalTable;
use self::table::RestTable;
use self::view::RestView;
use super::error::BigQueryError;
use super::handle::{Client, ClientProvider, ResourceHandle, TableResourceHandle};
use super::naming::{Dataset, TableName};

pub const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Root of the REST API, without trailing slash.
    pub endpoint: String,
    /// Overrides the token endpoint named in the credential.
    pub token_uri: Option<String>,
    /// Delay between polls of a running copy job.
    pub poll_interval: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            token_uri: None,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Authenticated access to the REST API shared by all handles of a client.
pub(crate) struct Api {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenSource>,
    poll_interval: Duration,
}

impl Api {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), path)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, BigQueryError> {
        let token = self.tokens.token().await?;
        let mut request = self
            .http
            .request(method.clone(), self.url(path))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(%method, path, status = status.as_u16(), "bigquery call");

        if !status.is_success() {
            return Err(BigQueryError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| BigQueryError::Response(e.to_string()))
    }

    pub(crate) async fn get(&self, path: &str) -> Result<Value, BigQueryError> {
        self.call(Method::GET, path, None).await
    }

    pub(crate) async fn post(&self, path: &str, body: &Value) -> Result<Value, BigQueryError> {
        self.call(Method::POST, path, Some(body)).await
    }

    pub(crate) async fn patch(&self, path: &str, body: &Value) -> Result<Value, BigQueryError> {
        self.call(Method::PATCH, path, Some(body)).await
    }

    pub(crate) fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Pulls `error.message` out of a Google API error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T, BigQueryError> {
    serde_json::from_value(value).map_err(|e| BigQueryError::Response(e.to_string()))
}

pub(crate) fn dataset_path(dataset: &Dataset) -> String {
    format!("projects/{}/datasets/{}", dataset.project, dataset.name)
}

pub(crate) fn table_path(name: &TableName) -> String {
    format!("{}/tables/{}", dataset_path(&name.dataset), name.name)
}

pub(crate) fn table_reference(name: &TableName) -> Value {
    json!({
        "projectId": name.dataset.project,
        "datasetId": name.dataset.name,
        "tableId": name.name,
    })
}

/// Prefers the spec description, falling back to the metadata one.
pub(crate) fn description<'a>(spec_description: &'a str, metadata_description: &'a str) -> &'a str {
    if spec_description.trim().is_empty() {
        metadata_description
    } else {
        spec_description
    }
}

pub(crate) async fn exists_at(api: &Api, path: &str) -> bool {
    match api.get(path).await {
        Ok(_) => true,
        Err(err) => {
            debug!(path, error = %err, "treating lookup failure as absent");
            false
        }
    }
}

/// A client bound to one credential.
pub struct RestClient {
    api: Arc<Api>,
}

impl RestClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api: Arc::new(Api {
                http,
                endpoint: endpoint.into(),
                tokens,
                poll_interval,
            }),
        }
    }
}

impl Client for RestClient {
    fn dataset_handle(&self, dataset: &Dataset) -> Box<dyn ResourceHandle> {
        Box::new(RestDataset::new(self.api.clone(), dataset.clone()))
    }

    fn table_handle(&self, name: &TableName) -> Box<dyn TableResourceHandle> {
        Box::new(RestTable::new(self.api.clone(), name.clone()))
    }

    fn view_handle(&self, name: &TableName) -> Box<dyn ResourceHandle> {
        Box::new(RestView::new(self.api.clone(), name.clone()))
    }

    fn external_table_handle(&self, name: &TableName) -> Box<dyn ResourceHandle> {
        Box::new(RestExternalTable::new(self.api.clone(), name.clone()))
    }
}

/// Builds REST clients from service-account credentials.
#[derive(Debug, Clone)]
pub struct RestClientProvider {
    http: reqwest::Client,
    config: RestConfig,
}

impl RestClientProvider {
    pub fn new(config: RestConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ClientProvider for RestClientProvider {
    async fn get(&self, credential: &str) -> OptimusResult<Arc<dyn Client>> {
        let key = ServiceAccountKey::from_json(credential)?;
        let token_uri = self
            .config
            .token_uri
            .clone()
            .or_else(|| key.token_uri.clone())
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());
        let tokens = ServiceAccountTokenSource::new(self.http.clone(), key, token_uri);

        Ok(Arc::new(RestClient::new(
            self.http.clone(),
            self.config.endpoint.clone(),
            Arc::new(tokens),
            self.config.poll_interval,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_google_error_message() {
        let body = r#"{"error": {"code": 409, "message": "Already Exists: Dataset p:d", "status": "ALREADY_EXISTS"}}"#;
        assert_eq!(error_message(body), "Already Exists: Dataset p:d");
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn paths() {
        let name = TableName::new(Dataset::new("p", "d"), "t");
        assert_eq!(table_path(&name), "projects/p/datasets/d/tables/t");
        assert_eq!(dataset_path(&name.dataset), "projects/p/datasets/d");
    }

    #[tokio::test]
    async fn provider_rejects_bad_credential() {
        let provider = RestClientProvider::new(RestConfig::default());
        let err = provider.get("{}").await.err().unwrap();
        assert_eq!(err.kind(), optimus_core::ErrorKind::Internal);
    }
}
