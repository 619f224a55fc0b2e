use std::env;
use std::time::Duration;

use crate::limits::ResourceLimits;

/// Default bound on submitted code, in bytes. Requests above it are rejected
/// before any resource is allocated, at both the gateway and the worker.
pub const DEFAULT_MAX_CODE_BYTES: usize = 10_000;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Gateway configuration
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    /// Full URL of the worker's run endpoint
    pub worker_url: String,
    /// Client-side bound on the gateway -> worker hop
    pub upstream_timeout_secs: u64,
    pub max_code_bytes: usize,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", 8000),
            worker_url: env::var("WORKER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8080/run".to_string()),
            upstream_timeout_secs: env_parse("UPSTREAM_TIMEOUT_SECS", 15),
            max_code_bytes: env_parse("MAX_CODE_BYTES", DEFAULT_MAX_CODE_BYTES),
        }
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

/// Worker configuration
///
/// Two wall-clock limits govern every invocation:
/// - `time_limit_secs` is the *inner* limit the isolation binary enforces on
///   the jailed process itself
/// - `outer_timeout_secs` is the worker's supervisory limit on waiting for
///   the whole invocation
///
/// The invariant `outer > inner` must hold: an outer timeout that fires
/// first kills the sandbox before it can finish its own clean termination,
/// replacing the runner's diagnostic envelope with an opaque timeout.
/// `validate()` refuses such a configuration at startup.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub port: u16,
    /// Path to the isolation binary; empty means run the runner directly
    /// with no isolation (local development only)
    pub sandbox_bin: String,
    /// Path to the in-sandbox runner binary
    pub runner_bin: String,
    pub max_code_bytes: usize,
    /// Inner wall-clock limit, enforced by the isolation binary
    pub time_limit_secs: u64,
    /// Outer supervisory timeout, enforced by the worker
    pub outer_timeout_secs: u64,
    pub limits: ResourceLimits,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", 8080),
            sandbox_bin: env::var("SANDBOX_BIN")
                .unwrap_or_else(|_| "/usr/bin/nsjail".to_string()),
            runner_bin: env::var("RUNNER_BIN")
                .unwrap_or_else(|_| "/usr/local/bin/runbox-runner".to_string()),
            max_code_bytes: env_parse("MAX_CODE_BYTES", DEFAULT_MAX_CODE_BYTES),
            time_limit_secs: env_parse("TIME_LIMIT_SECS", 5),
            outer_timeout_secs: env_parse("OUTER_TIMEOUT_SECS", 10),
            limits: ResourceLimits {
                max_cpus: env_parse("MAX_CPUS", 1),
                rlimit_as_mb: env_parse("RLIMIT_AS_MB", 512),
                rlimit_stack_mb: env_parse("RLIMIT_STACK_MB", 64),
                rlimit_nproc: env_parse("RLIMIT_NPROC", 32),
                uid: env_parse("SANDBOX_UID", 65534),
                gid: env_parse("SANDBOX_GID", 65534),
            },
        }
    }

    /// Check the inner/outer timeout invariant
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.outer_timeout_secs <= self.time_limit_secs {
            anyhow::bail!(
                "OUTER_TIMEOUT_SECS ({}) must be strictly greater than TIME_LIMIT_SECS ({})",
                self.outer_timeout_secs,
                self.time_limit_secs
            );
        }
        Ok(())
    }

    pub fn outer_timeout(&self) -> Duration {
        Duration::from_secs(self.outer_timeout_secs)
    }

    pub fn inner_time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_defaults() {
        let config = GatewayConfig::from_env();
        assert_eq!(config.max_code_bytes, DEFAULT_MAX_CODE_BYTES);
        assert_eq!(config.upstream_timeout_secs, 15);
    }

    #[test]
    fn test_worker_defaults_satisfy_timeout_invariant() {
        let config = WorkerConfig::from_env();
        assert_eq!(config.time_limit_secs, 5);
        assert_eq!(config.outer_timeout_secs, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_outer_not_greater_than_inner() {
        let mut config = WorkerConfig::from_env();
        config.outer_timeout_secs = config.time_limit_secs;
        assert!(config.validate().is_err());

        config.outer_timeout_secs = config.time_limit_secs - 1;
        assert!(config.validate().is_err());
    }
}
