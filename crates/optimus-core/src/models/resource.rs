//! Resource domain model and its reconciliation state machine.
//!
//! A resource is the server-side record of a warehouse object. Its
//! [`Status`] moves only along the edges listed in
//! [`Status::can_transition_to`]; every `mark_*` method refuses an illegal
//! edge and leaves the resource untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OptimusError, OptimusResult};
use crate::models::tenant::Tenant;

pub const ENTITY_RESOURCE: &str = "resource";

/// Free-form spec; the allowed keys depend on the kind.
pub type Spec = serde_json::Map<String, serde_json::Value>;

/// Backend that physically owns a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Store {
    Bigquery,
}

impl Store {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bigquery => "bigquery",
        }
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Store {
    type Err = OptimusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bigquery" => Ok(Self::Bigquery),
            _ => Err(OptimusError::invalid_argument(
                ENTITY_RESOURCE,
                format!("unknown store {s}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Dataset,
    Table,
    View,
    ExternalTable,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::Dataset, Kind::Table, Kind::View, Kind::ExternalTable];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dataset => "dataset",
            Self::Table => "table",
            Self::View => "view",
            Self::ExternalTable => "external_table",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = OptimusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                OptimusError::invalid_argument(ENTITY_RESOURCE, format!("unknown kind {s}"))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Unknown,
    ValidationSuccess,
    ValidationFailure,
    ToCreate,
    ToUpdate,
    Skipped,
    CreateFailure,
    UpdateFailure,
    ExistInStore,
    Success,
}

impl Status {
    pub const ALL: [Status; 10] = [
        Status::Unknown,
        Status::ValidationSuccess,
        Status::ValidationFailure,
        Status::ToCreate,
        Status::ToUpdate,
        Status::Skipped,
        Status::CreateFailure,
        Status::UpdateFailure,
        Status::ExistInStore,
        Status::Success,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::ValidationSuccess => "validation_success",
            Self::ValidationFailure => "validation_failure",
            Self::ToCreate => "to_create",
            Self::ToUpdate => "to_update",
            Self::Skipped => "skipped",
            Self::CreateFailure => "create_failure",
            Self::UpdateFailure => "update_failure",
            Self::ExistInStore => "exist_in_store",
            Self::Success => "success",
        }
    }

    /// Permitted edges of the reconciliation state machine.
    pub fn can_transition_to(&self, next: Status) -> bool {
        use Status::*;
        matches!(
            (self, next),
            (Unknown, ValidationSuccess | ValidationFailure)
                | (ValidationSuccess, ToCreate | ToUpdate | Skipped)
                | (ToCreate, ExistInStore | CreateFailure | Success)
                | (ToUpdate, UpdateFailure | Success)
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailure | Self::CreateFailure | Self::UpdateFailure
        )
    }

    /// True once reconciliation finished well for this resource.
    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Success | Self::ExistInStore)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = OptimusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| {
                OptimusError::invalid_argument(ENTITY_RESOURCE, format!("unknown status {s}"))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub version: i32,
    pub description: String,
    pub labels: BTreeMap<String, String>,
}

/// Hierarchical dotted name, e.g. `project.dataset.table`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceName(String);

impl ResourceName {
    pub fn new(name: impl Into<String>) -> OptimusResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(OptimusError::invalid_argument(
                ENTITY_RESOURCE,
                "resource name is empty",
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn sections(&self) -> Vec<&str> {
        self.0.split('.').collect()
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle fields recorded by the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedState {
    pub urn: Option<String>,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Resource {
    name: ResourceName,
    kind: Kind,
    store: Store,
    tenant: Tenant,
    metadata: Metadata,
    spec: Spec,
    urn: Option<String>,
    status: Status,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Resource {
    pub fn new(
        full_name: &str,
        kind: Kind,
        store: Store,
        tenant: Tenant,
        metadata: Metadata,
        spec: Spec,
    ) -> OptimusResult<Self> {
        let name = ResourceName::new(full_name)?;
        if spec.is_empty() {
            return Err(OptimusError::invalid_argument(
                ENTITY_RESOURCE,
                format!("empty resource spec for {full_name}"),
            ));
        }

        Ok(Self {
            name,
            kind,
            store,
            tenant,
            metadata,
            spec,
            urn: None,
            status: Status::Unknown,
            created_at: None,
            updated_at: None,
        })
    }

    /// Restores the lifecycle fields of a row read back from storage.
    pub fn with_persisted_state(mut self, state: PersistedState) -> Self {
        self.urn = state.urn;
        self.status = state.status;
        self.created_at = Some(state.created_at);
        self.updated_at = Some(state.updated_at);
        self
    }

    /// Copy with the same identity and content but a fresh lifecycle,
    /// ready to go through validation again.
    pub fn renewed(&self) -> Self {
        Self {
            urn: None,
            status: Status::Unknown,
            created_at: None,
            updated_at: None,
            ..self.clone()
        }
    }

    pub fn full_name(&self) -> &str {
        self.name.as_str()
    }

    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn store(&self) -> Store {
        self.store
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    pub fn urn(&self) -> Option<&str> {
        self.urn.as_deref()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Assigns the backend URN. A URN can be set once only.
    pub fn update_urn(&mut self, urn: impl Into<String>) -> OptimusResult<()> {
        if self.urn.is_some() {
            return Err(OptimusError::invalid_argument(
                ENTITY_RESOURCE,
                format!("urn already present for {}", self.name),
            ));
        }
        self.urn = Some(urn.into());
        Ok(())
    }

    fn transition(&mut self, next: Status) -> OptimusResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(OptimusError::invalid_state_transition(
                ENTITY_RESOURCE,
                format!(
                    "cannot change status of {} from {} to {}",
                    self.name, self.status, next
                ),
            ));
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_validation_success(&mut self) -> OptimusResult<()> {
        self.transition(Status::ValidationSuccess)
    }

    pub fn mark_validation_failure(&mut self) -> OptimusResult<()> {
        self.transition(Status::ValidationFailure)
    }

    pub fn mark_to_create(&mut self) -> OptimusResult<()> {
        self.transition(Status::ToCreate)
    }

    pub fn mark_to_update(&mut self) -> OptimusResult<()> {
        self.transition(Status::ToUpdate)
    }

    pub fn mark_skipped(&mut self) -> OptimusResult<()> {
        self.transition(Status::Skipped)
    }

    pub fn mark_exist_in_store(&mut self) -> OptimusResult<()> {
        self.transition(Status::ExistInStore)
    }

    pub fn mark_success(&mut self) -> OptimusResult<()> {
        self.transition(Status::Success)
    }

    /// Moves a pending resource into the failure state matching its
    /// pending operation.
    pub fn mark_failure(&mut self) -> OptimusResult<()> {
        match self.status {
            Status::ToCreate => self.transition(Status::CreateFailure),
            Status::ToUpdate => self.transition(Status::UpdateFailure),
            other => Err(OptimusError::invalid_state_transition(
                ENTITY_RESOURCE,
                format!("cannot mark {} as failed from status {other}", self.name),
            )),
        }
    }
}

/// Change-detection equality: identity and content only. Status, URN
/// and timestamps are ignored.
impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.tenant == other.tenant
            && self.name == other.name
            && self.kind == other.kind
            && self.store == other.store
            && self.metadata == other.metadata
            && self.spec == other.spec
    }
}
