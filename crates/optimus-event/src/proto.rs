//! Wire messages for change events.
//!
//! Field tags are part of the contract with downstream consumers and must
//! never be reused.

use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EventType {
    Unspecified = 0,
    ResourceCreate = 1,
    ResourceUpdate = 2,
    JobCreate = 3,
    JobUpdate = 4,
    JobDelete = 5,
    JobStart = 6,
    JobSuccess = 7,
    JobFailure = 8,
    JobStateChange = 9,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventMessage {
    #[prost(string, tag = "1")]
    pub event_id: String,
    #[prost(message, optional, tag = "2")]
    pub occurred_at: Option<::prost_types::Timestamp>,
    #[prost(string, tag = "3")]
    pub project_name: String,
    #[prost(string, tag = "4")]
    pub namespace_name: String,
    #[prost(enumeration = "EventType", tag = "5")]
    pub event_type: i32,
    #[prost(oneof = "event_message::Payload", tags = "6, 7, 8, 9")]
    pub payload: Option<event_message::Payload>,
}

pub mod event_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "6")]
        ResourceChange(super::ResourceChangePayload),
        #[prost(message, tag = "7")]
        JobChange(super::JobChangePayload),
        #[prost(message, tag = "8")]
        JobRun(super::JobRunPayload),
        #[prost(message, tag = "9")]
        JobStateChange(super::JobStateChangePayload),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResourceChangePayload {
    #[prost(string, tag = "1")]
    pub datastore_name: String,
    #[prost(string, tag = "2")]
    pub full_name: String,
    #[prost(string, tag = "3")]
    pub kind: String,
    #[prost(string, tag = "4")]
    pub urn: String,
    #[prost(string, tag = "5")]
    pub status: String,
    #[prost(int32, tag = "6")]
    pub version: i32,
    #[prost(string, tag = "7")]
    pub description: String,
    #[prost(btree_map = "string, string", tag = "8")]
    pub labels: BTreeMap<String, String>,
    /// Resource spec as a JSON document.
    #[prost(string, tag = "9")]
    pub spec: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JobChangePayload {
    #[prost(string, tag = "1")]
    pub job_name: String,
    /// Job spec as a JSON document.
    #[prost(string, tag = "2")]
    pub spec: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JobRunPayload {
    #[prost(string, tag = "1")]
    pub job_name: String,
    #[prost(string, tag = "2")]
    pub job_run_id: String,
    #[prost(message, optional, tag = "3")]
    pub scheduled_at: Option<::prost_types::Timestamp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JobStateChangePayload {
    #[prost(string, tag = "1")]
    pub job_name: String,
    #[prost(string, tag = "2")]
    pub state: String,
}
