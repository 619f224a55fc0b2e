// HTTP route handlers for the runbox worker

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use runbox_common::RunnerEnvelope;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::sandbox::SandboxError;
use crate::AppState;

/// GET /health - liveness check
pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "message": "runbox worker healthy"})),
    )
}

/// POST /run - execute one submitted script
///
/// Validation happens before anything touches the filesystem or spawns a
/// process. The temporary artifact's removal is tied to its handle going
/// out of scope, so every exit path below - success, malformed output,
/// timeout, sandbox failure - cleans it up.
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<Value>>,
) -> (StatusCode, Json<Value>) {
    let data = payload.map(|Json(v)| v).unwrap_or(Value::Null);

    let code = match data.get("code").and_then(Value::as_str) {
        Some(code) if !code.is_empty() => code,
        _ => return failure(StatusCode::BAD_REQUEST, "Missing or invalid 'code' field"),
    };
    if code.len() > state.config.max_code_bytes {
        return failure(StatusCode::BAD_REQUEST, "Code too long");
    }

    let request_id = Uuid::new_v4();
    info!(%request_id, bytes = code.len(), "accepted submission");

    let artifact = match tempfile::Builder::new()
        .prefix("user_code_")
        .suffix(".js")
        .tempfile()
    {
        Ok(file) => file,
        Err(e) => {
            error!(%request_id, "failed to create temp script: {}", e);
            return failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to write temp script: {}", e),
            );
        }
    };
    if let Err(e) = std::fs::write(artifact.path(), code) {
        error!(%request_id, "failed to write temp script: {}", e);
        return failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to write temp script: {}", e),
        );
    }

    let invocation = match state.sandbox.invoke(artifact.path()).await {
        Ok(invocation) => invocation,
        Err(SandboxError::Unavailable(bin)) => {
            error!(%request_id, bin = %bin, "isolation binary not found");
            return failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("SandboxUnavailable: isolation binary not found: {}", bin),
            );
        }
        Err(e) => {
            error!(%request_id, "failed to launch sandbox: {}", e);
            return failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to launch sandbox: {}", e),
            );
        }
    };

    if invocation.timed_out {
        warn!(%request_id, "outer supervisory timeout fired");
        return failure(StatusCode::REQUEST_TIMEOUT, "Execution timed out");
    }

    let stdout = invocation.stdout.trim();
    match serde_json::from_str::<RunnerEnvelope>(stdout) {
        Ok(envelope) => {
            info!(
                %request_id,
                ok = envelope.ok,
                duration_ms = invocation.duration.as_millis() as u64,
                "invocation finished"
            );
            // Forward the envelope's fields unchanged; the caller
            // interprets `ok`
            (
                StatusCode::OK,
                Json(serde_json::to_value(&envelope).unwrap_or(Value::Null)),
            )
        }
        Err(_) if invocation.duration >= state.config.inner_time_limit() => {
            // The isolation layer's inner limit killed the runner before
            // it could emit the envelope
            warn!(%request_id, "inner wall-clock limit exceeded");
            failure(StatusCode::REQUEST_TIMEOUT, "Execution timed out")
        }
        Err(_) => {
            error!(%request_id, exit_code = ?invocation.exit_code, "runner emitted no valid envelope");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "ok": false,
                    "error": "Runner did not return a valid result envelope",
                    "stdout": stdout,
                    "stderr": invocation.stderr.trim(),
                })),
            )
        }
    }
}

fn failure(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({"ok": false, "error": error.into(), "stdout": ""})),
    )
}
