//! Server configuration.
//!
//! Values come from three layers, later ones winning: a YAML file, then
//! `OPTIMUS_*` environment variables, then command-line flags. Every key
//! has a default, so an empty file (or none at all) is a valid config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use optimus_core::models::tenant::Tenant;
use optimus_db::DbConfig;
use optimus_event::WorkerConfig;
use optimus_store::bigquery::rest::{DEFAULT_ENDPOINT, RestConfig};
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "OPTIMUS_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "optimus-server", about = "Resource reconciliation and backup server")]
pub struct Cli {
    /// Path to the YAML config file.
    #[arg(long, env = "OPTIMUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format; overrides the config file.
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub log_format: LogFormat,
    pub serve: ServeConfig,
    pub db: DbSection,
    pub publisher: PublisherConfig,
    pub store: StoreConfig,
    pub reconcile: ReconcileConfig,
    /// Secret values keyed `<project>/<namespace>/<name>`, or
    /// `<project>/<name>` for a project-wide secret.
    pub secrets: BTreeMap<String, String>,
    pub tenants: Vec<TenantConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub address: String,
    #[serde(with = "humantime_serde")]
    pub deploy_timeout: Duration,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:9100".into(),
            deploy_timeout: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbSection {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Uses the in-process engine and ignores `url`.
    pub in_memory: bool,
}

impl Default for DbSection {
    fn default() -> Self {
        let db = DbConfig::default();
        Self {
            url: db.url,
            namespace: db.namespace,
            database: db.database,
            username: db.username,
            password: db.password,
            in_memory: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub batch_interval: Duration,
    pub buffer_size: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        let worker = WorkerConfig::default();
        Self {
            enabled: true,
            batch_interval: worker.batch_interval,
            buffer_size: worker.buffer_size,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub bigquery: BigqueryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BigqueryConfig {
    pub endpoint: String,
    pub token_uri: Option<String>,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for BigqueryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            token_uri: None,
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Backend calls in flight per batch.
    pub concurrency: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { concurrency: 10 }
    }
}

/// A known project and its namespaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    pub project: String,
    pub namespaces: Vec<String>,
}

impl ServerConfig {
    /// Reads the file named by the CLI (if any), then applies the
    /// environment and the CLI flags.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        if let Some(format) = cli.log_format {
            config.log_format = format;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Applies `OPTIMUS_*` overrides. Unknown keys are ignored.
    pub fn apply_env(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "LOG_FORMAT" => {
                    self.log_format = LogFormat::from_str(&value, true)
                        .map_err(|e| ConfigError::invalid(&key, e))?;
                }
                "SERVE_ADDRESS" => self.serve.address = value,
                "SERVE_DEPLOY_TIMEOUT" => self.serve.deploy_timeout = duration(&key, &value)?,
                "DB_URL" => self.db.url = value,
                "DB_NAMESPACE" => self.db.namespace = value,
                "DB_DATABASE" => self.db.database = value,
                "DB_USERNAME" => self.db.username = value,
                "DB_PASSWORD" => self.db.password = value,
                "DB_IN_MEMORY" => self.db.in_memory = flag(&key, &value)?,
                "PUBLISHER_ENABLED" => self.publisher.enabled = flag(&key, &value)?,
                "PUBLISHER_BATCH_INTERVAL" => {
                    self.publisher.batch_interval = duration(&key, &value)?;
                }
                "PUBLISHER_BUFFER_SIZE" => self.publisher.buffer_size = number(&key, &value)?,
                "STORE_BIGQUERY_ENDPOINT" => self.store.bigquery.endpoint = value,
                "STORE_BIGQUERY_TOKEN_URI" => self.store.bigquery.token_uri = Some(value),
                "STORE_BIGQUERY_POLL_INTERVAL" => {
                    self.store.bigquery.poll_interval = duration(&key, &value)?;
                }
                "RECONCILE_CONCURRENCY" => self.reconcile.concurrency = number(&key, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconcile.concurrency == 0 {
            return Err(ConfigError::invalid("reconcile.concurrency", "must be positive"));
        }
        if self.publisher.buffer_size == 0 {
            return Err(ConfigError::invalid("publisher.buffer_size", "must be positive"));
        }
        if self.serve.deploy_timeout.is_zero() {
            return Err(ConfigError::invalid("serve.deploy_timeout", "must be positive"));
        }
        self.known_tenants()?;
        Ok(())
    }

    /// Every configured (project, namespace) pair.
    pub fn known_tenants(&self) -> Result<Vec<Tenant>, ConfigError> {
        let mut tenants = Vec::new();
        for entry in &self.tenants {
            for namespace in &entry.namespaces {
                let tenant = Tenant::new(&entry.project, namespace)
                    .map_err(|e| ConfigError::invalid("tenants", e.to_string()))?;
                tenants.push(tenant);
            }
        }
        Ok(tenants)
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            url: if self.db.in_memory {
                "mem://".into()
            } else {
                self.db.url.clone()
            },
            namespace: self.db.namespace.clone(),
            database: self.db.database.clone(),
            username: self.db.username.clone(),
            password: self.db.password.clone(),
        }
    }

    pub fn rest_config(&self) -> RestConfig {
        RestConfig {
            endpoint: self.store.bigquery.endpoint.trim_end_matches('/').to_string(),
            token_uri: self.store.bigquery.token_uri.clone(),
            poll_interval: self.store.bigquery.poll_interval,
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            batch_interval: self.publisher.batch_interval,
            buffer_size: self.publisher.buffer_size,
        }
    }
}

fn duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|e| ConfigError::invalid(key, e.to_string()))
}

fn flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("expected true or false, got {value}")))
}

fn number(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("expected a number, got {value}")))
}

/// Durations in `humantime` syntax, e.g. `15m` or `1h 30m`.
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
