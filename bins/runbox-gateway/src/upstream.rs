/// Worker Client - the Gateway's Single Upstream Hop
///
/// Every failure mode of the gateway -> worker hop maps to a distinct
/// variant so the handler can give callers a distinct status and body
/// instead of one opaque 500.
use runbox_common::{GatewayConfig, RunRequest, RunnerEnvelope};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Network/connection failure, including client-side timeout
    #[error("failed to reach execution worker: {0}")]
    Unreachable(String),
    /// Worker answered with a non-success HTTP status
    #[error("execution worker returned status {status}")]
    BadStatus { status: u16, body: String },
    /// Worker answered 200 but the body is not an envelope
    #[error("execution worker returned invalid JSON")]
    BadJson { raw: String },
}

pub struct WorkerClient {
    http: reqwest::Client,
    url: String,
}

impl WorkerClient {
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.upstream_timeout())
            .build()?;
        Ok(Self {
            http,
            url: config.worker_url.clone(),
        })
    }

    /// Forward one validated submission and parse the worker's envelope.
    pub async fn run(&self, code: &str) -> Result<RunnerEnvelope, UpstreamError> {
        let response = self
            .http
            .post(&self.url)
            .json(&RunRequest {
                code: code.to_string(),
            })
            .send()
            .await
            .map_err(|e| UpstreamError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            return Err(UpstreamError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|_| UpstreamError::BadJson { raw: body })
    }
}
