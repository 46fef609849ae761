//! Streaming deploy: one JSON frame per line, log frames first and a
//! single result frame last.

use std::sync::Arc;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::{StreamExt, stream};
use optimus_core::OptimusResult;
use optimus_resource::{DeployLog, DeployRequest, LogStatus};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ApiError, ApiErrorBody};
use crate::state::AppState;

const NDJSON: &str = "application/x-ndjson";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployFrame {
    LogStatus(LogStatus),
    Result(DeployResult),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
}

impl DeployFrame {
    fn finished(outcome: Result<(), ApiError>) -> Self {
        let error = outcome.err().map(|err| ApiErrorBody {
            code: err.code().to_string(),
            message: err.message().to_string(),
        });
        Self::Result(DeployResult {
            success: error.is_none(),
            error,
        })
    }
}

pub(super) async fn deploy(
    State(state): State<Arc<AppState>>,
    Json(requests): Json<Vec<DeployRequest>>,
) -> Response {
    info!(requests = requests.len(), "deploy stream started");
    let (log, rx) = DeployLog::new();

    // Fires on the deadline, or when the client goes away.
    let cancel = CancellationToken::new();
    let timer = tokio::spawn({
        let cancel = cancel.clone();
        let timeout = state.deploy_timeout;
        async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => cancel.cancel(),
                _ = cancel.cancelled() => {}
            }
        }
    });

    let run = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let outcome: OptimusResult<()> = state
                .resources
                .deploy(stream::iter(requests), &log, &cancel)
                .await;
            timer.abort();
            outcome
        }
    });

    let guard = cancel.drop_guard();
    let frames = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|status| (DeployFrame::LogStatus(status), rx))
    });
    let result = stream::once(async move {
        let _guard = guard;
        let outcome = match run.await {
            Ok(outcome) => outcome.map_err(ApiError::from),
            Err(err) => {
                warn!(error = %err, "deploy task ended abnormally");
                Err(ApiError::internal(format!("deploy task failed: {err}")))
            }
        };
        DeployFrame::finished(outcome)
    });

    let body = frames.chain(result).map(|frame| encode(&frame));
    ([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(body)).into_response()
}

fn encode(frame: &DeployFrame) -> Result<Bytes, serde_json::Error> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}
