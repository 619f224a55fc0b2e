pub mod config;
pub mod limits;
pub mod protocol;

// Re-export commonly used types for convenience
pub use config::{GatewayConfig, WorkerConfig};
pub use limits::ResourceLimits;
pub use protocol::{RunRequest, RunnerEnvelope};
