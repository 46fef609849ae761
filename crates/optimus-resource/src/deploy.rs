//! Deploy request shapes and the log stream reported back to the caller.

use std::collections::BTreeMap;

use optimus_core::error::OptimusResult;
use optimus_core::models::resource::{Kind, Metadata, Resource, Spec, Store};
use optimus_core::models::tenant::Tenant;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

const SPEC_DESCRIPTION: &str = "description";

/// A resource as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default)]
    pub version: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub spec: Spec,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Accepted for compatibility, never read.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, String>,
}

impl ResourceSpec {
    /// Builds the entity, lifting `spec.description` into the metadata.
    pub fn to_resource(&self, tenant: &Tenant, store: Store) -> OptimusResult<Resource> {
        let kind: Kind = self.kind.parse()?;
        let description = self
            .spec
            .get(SPEC_DESCRIPTION)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Resource::new(
            &self.name,
            kind,
            store,
            tenant.clone(),
            Metadata {
                version: self.version,
                description,
                labels: self.labels.clone(),
            },
            self.spec.clone(),
        )
    }

    pub fn from_resource(res: &Resource) -> Self {
        Self {
            version: res.metadata().version,
            name: res.full_name().to_string(),
            kind: res.kind().to_string(),
            spec: res.spec().clone(),
            labels: res.metadata().labels.clone(),
            assets: BTreeMap::new(),
        }
    }
}

/// One message of a deploy stream: a batch for a single tenant and store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub project_name: String,
    pub namespace_name: String,
    pub datastore_name: String,
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStatus {
    pub level: LogLevel,
    pub message: String,
}

/// Sender half of the deploy log. A caller that stops listening does not
/// interrupt the deploy.
#[derive(Debug, Clone)]
pub struct DeployLog {
    tx: mpsc::UnboundedSender<LogStatus>,
}

impl DeployLog {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LogStatus>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, level: LogLevel, message: String) {
        let _ = self.tx.send(LogStatus { level, message });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.send(LogLevel::Info, message.into());
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.send(LogLevel::Warning, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(LogLevel::Error, message.into());
    }
}
