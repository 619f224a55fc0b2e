use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Worker Run Request
/// Body of `POST /run` on the worker. The gateway builds this after its own
/// validation pass; the worker validates again (defense in depth).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub code: String,
}

/// Runner Result Envelope
///
/// The single machine-readable message the runner emits on its real stdout,
/// exactly once per invocation, success or failure. Every layer above
/// re-wraps this envelope but never invents one of its own.
///
/// ## Field Semantics:
/// - `ok`: whether `main()` ran to completion with a representable value
/// - `result`: the JSON value returned by `main()`; absent when `ok=false`
/// - `stdout`: console output captured from the script, possibly partial
///   when the run failed mid-way; never contains the envelope itself
/// - `error`: short `Class: message` line; absent when `ok=true`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerEnvelope {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunnerEnvelope {
    pub fn success(result: Value, stdout: String) -> Self {
        Self {
            ok: true,
            result: Some(result),
            stdout,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, stdout: String) -> Self {
        Self {
            ok: false,
            result: None,
            stdout,
            error: Some(error.into()),
        }
    }
}
