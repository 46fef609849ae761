//! Change events and their wire encoding.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use optimus_core::models::resource::{Resource, Spec};
use optimus_core::models::tenant::Tenant;
use prost::Message;
use uuid::Uuid;

use crate::error::EventError;
use crate::proto::{self, EventMessage, EventType, event_message::Payload};

/// Snapshot of a resource at the time it changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceChange {
    pub store: String,
    pub full_name: String,
    pub kind: String,
    pub urn: Option<String>,
    pub status: String,
    pub version: i32,
    pub description: String,
    pub labels: BTreeMap<String, String>,
    pub spec: Spec,
}

impl From<&Resource> for ResourceChange {
    fn from(res: &Resource) -> Self {
        Self {
            store: res.store().to_string(),
            full_name: res.full_name().to_string(),
            kind: res.kind().to_string(),
            urn: res.urn().map(str::to_string),
            status: res.status().to_string(),
            version: res.metadata().version,
            description: res.metadata().description.clone(),
            labels: res.metadata().labels.clone(),
            spec: res.spec().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobChange {
    pub job_name: String,
    pub spec: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRun {
    pub job_name: String,
    pub job_run_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobStateChange {
    pub job_name: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    ResourceCreated(ResourceChange),
    ResourceUpdated(ResourceChange),
    JobCreated(JobChange),
    JobUpdated(JobChange),
    JobDeleted(JobChange),
    JobRunStarted(JobRun),
    JobRunSucceeded(JobRun),
    JobRunFailed(JobRun),
    JobStateChanged(JobStateChange),
}

impl EventKind {
    /// Stable name, used as the metrics label.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResourceCreated(_) => "resource_created",
            Self::ResourceUpdated(_) => "resource_updated",
            Self::JobCreated(_) => "job_created",
            Self::JobUpdated(_) => "job_updated",
            Self::JobDeleted(_) => "job_deleted",
            Self::JobRunStarted(_) => "job_run_started",
            Self::JobRunSucceeded(_) => "job_run_succeeded",
            Self::JobRunFailed(_) => "job_run_failed",
            Self::JobStateChanged(_) => "job_state_changed",
        }
    }

    fn event_type(&self) -> EventType {
        match self {
            Self::ResourceCreated(_) => EventType::ResourceCreate,
            Self::ResourceUpdated(_) => EventType::ResourceUpdate,
            Self::JobCreated(_) => EventType::JobCreate,
            Self::JobUpdated(_) => EventType::JobUpdate,
            Self::JobDeleted(_) => EventType::JobDelete,
            Self::JobRunStarted(_) => EventType::JobStart,
            Self::JobRunSucceeded(_) => EventType::JobSuccess,
            Self::JobRunFailed(_) => EventType::JobFailure,
            Self::JobStateChanged(_) => EventType::JobStateChange,
        }
    }

    fn payload(&self) -> Result<Payload, EventError> {
        Ok(match self {
            Self::ResourceCreated(change) | Self::ResourceUpdated(change) => {
                Payload::ResourceChange(proto::ResourceChangePayload {
                    datastore_name: change.store.clone(),
                    full_name: change.full_name.clone(),
                    kind: change.kind.clone(),
                    urn: change.urn.clone().unwrap_or_default(),
                    status: change.status.clone(),
                    version: change.version,
                    description: change.description.clone(),
                    labels: change.labels.clone(),
                    spec: serde_json::to_string(&change.spec)?,
                })
            }
            Self::JobCreated(job) | Self::JobUpdated(job) | Self::JobDeleted(job) => {
                Payload::JobChange(proto::JobChangePayload {
                    job_name: job.job_name.clone(),
                    spec: serde_json::to_string(&job.spec)?,
                })
            }
            Self::JobRunStarted(run) | Self::JobRunSucceeded(run) | Self::JobRunFailed(run) => {
                Payload::JobRun(proto::JobRunPayload {
                    job_name: run.job_name.clone(),
                    job_run_id: run.job_run_id.to_string(),
                    scheduled_at: Some(timestamp(run.scheduled_at)),
                })
            }
            Self::JobStateChanged(change) => Payload::JobStateChange(proto::JobStateChangePayload {
                job_name: change.job_name.clone(),
                state: change.state.clone(),
            }),
        })
    }
}

fn timestamp(at: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    id: Uuid,
    occurred_at: DateTime<Utc>,
    tenant: Tenant,
    kind: EventKind,
}

impl Event {
    pub fn new(tenant: Tenant, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            tenant,
            kind,
        }
    }

    pub fn resource_created(res: &Resource) -> Self {
        Self::new(res.tenant().clone(), EventKind::ResourceCreated(res.into()))
    }

    pub fn resource_updated(res: &Resource) -> Self {
        Self::new(res.tenant().clone(), EventKind::ResourceUpdated(res.into()))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn to_message(&self) -> Result<EventMessage, EventError> {
        Ok(EventMessage {
            event_id: self.id.to_string(),
            occurred_at: Some(timestamp(self.occurred_at)),
            project_name: self.tenant.project_name().to_string(),
            namespace_name: self.tenant.namespace_name().to_string(),
            event_type: self.kind.event_type() as i32,
            payload: Some(self.kind.payload()?),
        })
    }

    /// Protobuf encoding of [`Event::to_message`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        Ok(self.to_message()?.encode_to_vec())
    }
}

/// Decodes bytes written by [`Event::to_bytes`].
pub fn decode(bytes: &[u8]) -> Result<EventMessage, EventError> {
    Ok(EventMessage::decode(bytes)?)
}

#[cfg(test)]
mod tests {
    use optimus_core::models::resource::{Kind, Metadata, Store};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn table() -> Resource {
        let mut res = Resource::new(
            "proj.set.table1",
            Kind::Table,
            Store::Bigquery,
            Tenant::new("proj", "ns").unwrap(),
            Metadata {
                version: 1,
                description: "d".into(),
                labels: BTreeMap::from([("team".to_string(), "data".to_string())]),
            },
            json!({ "description": "d", "schema": [{ "name": "id", "type": "STRING" }] })
                .as_object()
                .cloned()
                .unwrap(),
        )
        .unwrap();
        res.update_urn("bigquery://proj:set.table1").unwrap();
        res
    }

    #[test]
    fn resource_created_encodes_tenant_and_payload() {
        let event = Event::resource_created(&table());
        let message = decode(&event.to_bytes().unwrap()).unwrap();

        assert_eq!(message.event_id, event.id().to_string());
        assert_eq!(message.project_name, "proj");
        assert_eq!(message.namespace_name, "ns");
        assert_eq!(message.event_type(), EventType::ResourceCreate);

        let Some(Payload::ResourceChange(payload)) = message.payload else {
            panic!("expected a resource change payload");
        };
        assert_eq!(payload.full_name, "proj.set.table1");
        assert_eq!(payload.kind, "table");
        assert_eq!(payload.urn, "bigquery://proj:set.table1");
        assert_eq!(payload.labels.get("team").map(String::as_str), Some("data"));
        let spec: serde_json::Value = serde_json::from_str(&payload.spec).unwrap();
        assert_eq!(spec["schema"][0]["name"], "id");
    }

    #[test]
    fn job_run_carries_schedule_time() {
        let scheduled_at = DateTime::parse_from_rfc3339("2022-11-18T01:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let run = JobRun {
            job_name: "daily-orders".into(),
            job_run_id: Uuid::new_v4(),
            scheduled_at,
        };
        let event = Event::new(
            Tenant::new("proj", "ns").unwrap(),
            EventKind::JobRunFailed(run.clone()),
        );
        assert_eq!(event.kind().name(), "job_run_failed");

        let message = event.to_message().unwrap();
        assert_eq!(message.event_type(), EventType::JobFailure);
        let Some(Payload::JobRun(payload)) = message.payload else {
            panic!("expected a job run payload");
        };
        assert_eq!(payload.job_run_id, run.job_run_id.to_string());
        assert_eq!(payload.scheduled_at.unwrap().seconds, scheduled_at.timestamp());
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(matches!(decode(&[0xff, 0xff, 0xff]), Err(EventError::Decode(_))));
    }
}
