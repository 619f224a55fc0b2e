// HTTP route handlers for the runbox gateway

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::upstream::UpstreamError;
use crate::AppState;

/// GET / - liveness check
pub async fn index() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "message": "runbox gateway running"})),
    )
}

/// POST /execute - validate a submission and forward it to the worker
///
/// The request field is `scrpit`, not `script`. The misspelling shipped in
/// the first public version and callers depend on it; the field name is a
/// versioned wire contract and must not be "fixed" without an API version
/// bump.
///
/// Validation mirrors the worker's own checks (defense in depth) and runs
/// before any network hop.
pub async fn execute(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<Value>>,
) -> (StatusCode, Json<Value>) {
    let data = payload.map(|Json(v)| v).unwrap_or(Value::Null);

    let code = match data.get("scrpit").and_then(Value::as_str) {
        Some(code) if !code.is_empty() => code,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Missing or invalid 'scrpit' field"})),
            )
        }
    };
    if code.len() > state.config.max_code_bytes {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "scrpit too long"})),
        );
    }

    let request_id = Uuid::new_v4();
    info!(%request_id, bytes = code.len(), "forwarding submission to worker");

    match state.worker.run(code).await {
        Ok(envelope) if envelope.ok => {
            info!(%request_id, "execution succeeded");
            (
                StatusCode::OK,
                Json(json!({
                    "return": envelope.result.unwrap_or(Value::Null),
                    "stdout": envelope.stdout.trim(),
                })),
            )
        }
        Ok(envelope) => {
            info!(%request_id, error = ?envelope.error, "execution failed");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": envelope.error.unwrap_or_else(|| "Execution failed".to_string()),
                    "stdout": envelope.stdout.trim(),
                })),
            )
        }
        // A worker-side timeout keeps its meaning instead of collapsing
        // into a generic upstream fault
        Err(UpstreamError::BadStatus { status: 408, .. }) => {
            warn!(%request_id, "worker reported execution timeout");
            (
                StatusCode::REQUEST_TIMEOUT,
                Json(json!({"error": "Execution timed out"})),
            )
        }
        Err(UpstreamError::BadStatus { status, body }) => {
            warn!(%request_id, status, "worker returned non-200 status");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "Execution worker returned non-200 status",
                    "status_code": status,
                    "body": body,
                })),
            )
        }
        Err(UpstreamError::Unreachable(details)) => {
            warn!(%request_id, "worker unreachable: {}", details);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "Failed to reach execution worker",
                    "details": details,
                })),
            )
        }
        Err(UpstreamError::BadJson { raw }) => {
            warn!(%request_id, "worker returned invalid JSON");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "Execution worker returned invalid JSON",
                    "raw": raw,
                })),
            )
        }
    }
}
