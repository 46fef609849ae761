//! Full-name parsing, name validation and URNs for BigQuery resources.
//!
//! Datasets are named `project.dataset`; tables, views and external
//! tables are named `project.dataset.name`.

use std::fmt;
use std::sync::OnceLock;

use optimus_core::error::{OptimusError, OptimusResult};
use optimus_core::models::resource::Kind;
use regex::Regex;

pub const ENTITY_BIGQUERY: &str = "resource_bigquery";

const URN_SCHEME: &str = "bigquery";

fn project_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9-]{4,28}[a-z0-9]$").expect("valid static regex"))
}

fn dataset_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("valid static regex"))
}

fn table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid static regex"))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dataset {
    pub project: String,
    pub name: String,
}

impl Dataset {
    pub fn new(project: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.project, self.name)
    }

    pub fn urn(&self) -> String {
        format!("{URN_SCHEME}://{}:{}", self.project, self.name)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.project, self.name)
    }
}

/// A table-like object (table, view or external table) inside a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    pub dataset: Dataset,
    pub name: String,
}

impl TableName {
    pub fn new(dataset: Dataset, name: impl Into<String>) -> Self {
        Self {
            dataset,
            name: name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.dataset.full_name(), self.name)
    }

    pub fn urn(&self) -> String {
        format!(
            "{URN_SCHEME}://{}:{}.{}",
            self.dataset.project, self.dataset.name, self.name
        )
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.name)
    }
}

fn sections_for(kind: Kind) -> usize {
    match kind {
        Kind::Dataset => 2,
        Kind::Table | Kind::View | Kind::ExternalTable => 3,
    }
}

fn split(kind: Kind, full_name: &str) -> OptimusResult<Vec<&str>> {
    let parts: Vec<&str> = full_name.split('.').collect();
    let want = sections_for(kind);
    if parts.len() != want {
        return Err(OptimusError::invalid_argument(
            ENTITY_BIGQUERY,
            format!(
                "invalid resource name {full_name}: {kind} expects {want} sections, got {}",
                parts.len()
            ),
        ));
    }
    Ok(parts)
}

/// The dataset a resource lives in, or the dataset itself for dataset kind.
pub fn dataset_for(kind: Kind, full_name: &str) -> OptimusResult<Dataset> {
    let parts = split(kind, full_name)?;
    Ok(Dataset::new(parts[0], parts[1]))
}

/// Splits a table, view or external table name. Dataset kind is rejected.
pub fn table_name_for(kind: Kind, full_name: &str) -> OptimusResult<TableName> {
    if kind == Kind::Dataset {
        return Err(OptimusError::invalid_argument(
            ENTITY_BIGQUERY,
            format!("{full_name} is a dataset, not a table-like resource"),
        ));
    }
    let parts = split(kind, full_name)?;
    Ok(TableName::new(Dataset::new(parts[0], parts[1]), parts[2]))
}

/// Checks section count and the character rules of each section.
pub fn validate_name(kind: Kind, full_name: &str) -> OptimusResult<()> {
    let parts = split(kind, full_name)?;

    if !project_re().is_match(parts[0]) {
        return Err(OptimusError::invalid_argument(
            ENTITY_BIGQUERY,
            format!("invalid project name {} in {full_name}", parts[0]),
        ));
    }
    if !dataset_re().is_match(parts[1]) {
        return Err(OptimusError::invalid_argument(
            ENTITY_BIGQUERY,
            format!("invalid dataset name {} in {full_name}", parts[1]),
        ));
    }
    if let Some(name) = parts.get(2) {
        if !table_re().is_match(name) {
            return Err(OptimusError::invalid_argument(
                ENTITY_BIGQUERY,
                format!("invalid {kind} name {name} in {full_name}"),
            ));
        }
    }
    Ok(())
}

pub fn urn_for(kind: Kind, full_name: &str) -> OptimusResult<String> {
    match kind {
        Kind::Dataset => Ok(dataset_for(kind, full_name)?.urn()),
        _ => Ok(table_name_for(kind, full_name)?.urn()),
    }
}
