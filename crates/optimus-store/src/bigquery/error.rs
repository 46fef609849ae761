//! BigQuery REST errors and their mapping onto domain error kinds.

use optimus_core::error::OptimusError;

use super::naming::ENTITY_BIGQUERY;

#[derive(Debug, thiserror::Error)]
pub enum BigQueryError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bigquery returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid credential: {0}")]
    Credential(String),

    #[error("token exchange failed: {0}")]
    Auth(String),

    #[error("unexpected response: {0}")]
    Response(String),

    #[error("job {job_id} failed: {message}")]
    Job { job_id: String, message: String },
}

impl BigQueryError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Api { status: 409, message } if message.contains("Already Exists"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

impl From<BigQueryError> for OptimusError {
    fn from(err: BigQueryError) -> Self {
        if err.is_already_exists() {
            OptimusError::already_exists(ENTITY_BIGQUERY, err.to_string())
        } else if err.is_not_found() {
            OptimusError::not_found(ENTITY_BIGQUERY, err.to_string())
        } else {
            OptimusError::internal_with(ENTITY_BIGQUERY, "bigquery request failed", err)
        }
    }
}
