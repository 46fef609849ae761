use optimus_core::error::OptimusError;

pub const ENTITY_EVENT: &str = "event";

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("cannot serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("cannot decode event: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("event writer failed: {0}")]
    Write(String),

    #[error("event worker is closed")]
    Closed,

    #[error("event worker stopped abnormally: {0}")]
    Worker(String),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl From<EventError> for OptimusError {
    fn from(err: EventError) -> Self {
        OptimusError::internal_with(ENTITY_EVENT, "event publishing failed", err)
    }
}
