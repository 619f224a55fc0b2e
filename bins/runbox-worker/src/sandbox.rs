/// Sandbox Invocation - Abstraction over the Isolation Layer
///
/// **Core Responsibility:**
/// Run the runner binary against a script artifact and capture exit code,
/// stdout and stderr.
///
/// **Critical Architectural Boundary:**
/// - The sandbox knows HOW to isolate (namespaces, rlimits, privileges)
/// - The sandbox does NOT know the result protocol
/// - The sandbox returns raw captured streams for the handler to interpret
///
/// **Why This Exists:**
/// The isolation technology is a deployment concern behind a narrow
/// contract. `JailSandbox` wraps an nsjail-compatible binary;
/// `DirectSandbox` spawns the runner with no isolation for local
/// development. A container runtime could satisfy the same trait.
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use runbox_common::{ResourceLimits, WorkerConfig};
use thiserror::Error;
use tokio::process::Command;
use tracing::warn;

/// Raw outcome of one sandboxed process run
#[derive(Debug, Clone)]
pub struct Invocation {
    /// None when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// True when the *outer* supervisory timeout forced a kill
    pub timed_out: bool,
    pub duration: Duration,
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("isolation binary not found: {0}")]
    Unavailable(String),
    #[error("failed to launch sandbox: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run the runner against `script`, blocking until the child
    /// terminates, the isolation layer's inner limit kills it, or the outer
    /// timeout forces a kill of the child tree.
    async fn invoke(&self, script: &Path) -> Result<Invocation, SandboxError>;
}

/// Select the sandbox implementation for this deployment.
/// An empty `SANDBOX_BIN` opts out of isolation entirely.
pub fn from_config(config: &WorkerConfig) -> Arc<dyn Sandbox> {
    if config.sandbox_bin.is_empty() {
        warn!("SANDBOX_BIN is empty - running submissions WITHOUT isolation");
        Arc::new(DirectSandbox {
            runner_bin: config.runner_bin.clone(),
            outer_timeout: config.outer_timeout(),
        })
    } else {
        Arc::new(JailSandbox {
            bin: config.sandbox_bin.clone(),
            runner_bin: config.runner_bin.clone(),
            limits: config.limits.clone(),
            time_limit_secs: config.time_limit_secs,
            outer_timeout: config.outer_timeout(),
        })
    }
}

/// Spawn `command`, capture both streams, and enforce the outer timeout.
///
/// On expiry the future owning the child is dropped; `kill_on_drop` then
/// tears down the whole child tree so no isolated process outlives the
/// request that spawned it.
async fn run_with_timeout(
    mut command: Command,
    bin: &str,
    outer_timeout: Duration,
) -> Result<Invocation, SandboxError> {
    let start = Instant::now();

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SandboxError::Unavailable(bin.to_string()),
            _ => SandboxError::Io(e),
        })?;

    match tokio::time::timeout(outer_timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(Invocation {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
            duration: start.elapsed(),
        }),
        Ok(Err(e)) => Err(SandboxError::Io(e)),
        Err(_) => Ok(Invocation {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
            duration: start.elapsed(),
        }),
    }
}

/// nsjail-compatible isolation: new user/pid/uts/ipc/net/mount namespaces,
/// rlimits, a reduced-privilege identity, and the inner wall-clock limit.
pub struct JailSandbox {
    bin: String,
    runner_bin: String,
    limits: ResourceLimits,
    time_limit_secs: u64,
    outer_timeout: Duration,
}

impl JailSandbox {
    fn build_args(&self, script: &Path) -> Vec<String> {
        let limits = &self.limits;
        vec![
            "-Mo".to_string(),
            "--quiet".to_string(),
            // Inner wall-clock limit, enforced by the jail itself
            "--time_limit".to_string(),
            self.time_limit_secs.to_string(),
            "--max_cpus".to_string(),
            limits.max_cpus.to_string(),
            // rlimit values are in MB
            "--rlimit_as".to_string(),
            limits.rlimit_as_mb.to_string(),
            "--rlimit_stack".to_string(),
            limits.rlimit_stack_mb.to_string(),
            "--rlimit_nproc".to_string(),
            limits.rlimit_nproc.to_string(),
            "--clone_newuser".to_string(),
            "--clone_newpid".to_string(),
            "--clone_newuts".to_string(),
            "--clone_newipc".to_string(),
            "--clone_newnet".to_string(),
            "--clone_newns".to_string(),
            "--user".to_string(),
            limits.uid.to_string(),
            "--group".to_string(),
            limits.gid.to_string(),
            "--".to_string(),
            self.runner_bin.clone(),
            script.display().to_string(),
        ]
    }
}

#[async_trait]
impl Sandbox for JailSandbox {
    async fn invoke(&self, script: &Path) -> Result<Invocation, SandboxError> {
        let mut command = Command::new(&self.bin);
        command.args(self.build_args(script));
        run_with_timeout(command, &self.bin, self.outer_timeout).await
    }
}

/// No isolation at all - the runner is spawned as a plain child process.
/// Only the outer timeout applies; the inner limit has no enforcer here.
pub struct DirectSandbox {
    runner_bin: String,
    outer_timeout: Duration,
}

impl DirectSandbox {
    pub fn new(runner_bin: impl Into<String>, outer_timeout: Duration) -> Self {
        Self {
            runner_bin: runner_bin.into(),
            outer_timeout,
        }
    }
}

#[async_trait]
impl Sandbox for DirectSandbox {
    async fn invoke(&self, script: &Path) -> Result<Invocation, SandboxError> {
        let mut command = Command::new(&self.runner_bin);
        command.arg(script);
        run_with_timeout(command, &self.runner_bin, self.outer_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn jail() -> JailSandbox {
        JailSandbox {
            bin: "/usr/bin/nsjail".to_string(),
            runner_bin: "/usr/local/bin/runbox-runner".to_string(),
            limits: ResourceLimits::default(),
            time_limit_secs: 5,
            outer_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_jail_args_carry_limits_and_time_limit() {
        let args = jail().build_args(Path::new("/tmp/user_code_x.js"));

        let pair = |flag: &str| {
            let idx = args.iter().position(|a| a == flag).unwrap();
            args[idx + 1].clone()
        };
        assert_eq!(pair("--time_limit"), "5");
        assert_eq!(pair("--max_cpus"), "1");
        assert_eq!(pair("--rlimit_as"), "512");
        assert_eq!(pair("--rlimit_stack"), "64");
        assert_eq!(pair("--rlimit_nproc"), "32");
        assert_eq!(pair("--user"), "65534");
        assert_eq!(pair("--group"), "65534");
    }

    #[test]
    fn test_jail_args_end_with_runner_and_script() {
        let args = jail().build_args(Path::new("/tmp/user_code_x.js"));
        let sep = args.iter().position(|a| a == "--").unwrap();

        assert_eq!(args[sep + 1], "/usr/local/bin/runbox-runner");
        assert_eq!(args[sep + 2], "/tmp/user_code_x.js");
        assert_eq!(args.len(), sep + 3);
    }

    #[test]
    fn test_jail_args_request_all_namespaces() {
        let args = jail().build_args(Path::new("/tmp/s.js"));
        for flag in [
            "--clone_newuser",
            "--clone_newpid",
            "--clone_newuts",
            "--clone_newipc",
            "--clone_newnet",
            "--clone_newns",
        ] {
            assert!(args.iter().any(|a| a == flag), "missing {}", flag);
        }
    }

    #[tokio::test]
    async fn test_direct_sandbox_captures_stdout_and_exit_code() {
        // /bin/echo stands in for the runner: it prints its argument
        let sandbox = DirectSandbox::new("/bin/echo", Duration::from_secs(5));
        let invocation = sandbox.invoke(Path::new("/tmp/user_code_y.js")).await.unwrap();

        assert_eq!(invocation.exit_code, Some(0));
        assert!(invocation.stdout.contains("/tmp/user_code_y.js"));
        assert!(!invocation.timed_out);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let sandbox = DirectSandbox::new("/nonexistent/runbox-runner", Duration::from_secs(5));
        let err = sandbox.invoke(Path::new("/tmp/s.js")).await.unwrap_err();

        assert!(matches!(err, SandboxError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_outer_timeout_kills_the_child() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let mut script = tempfile::NamedTempFile::new().unwrap();
        writeln!(script, "#!/bin/sh\nsleep 30").unwrap();
        // Close the write handle before exec'ing the file, or the spawn
        // fails with ETXTBSY; the TempPath keeps the file on disk.
        let script = script.into_temp_path();
        let path: PathBuf = script.to_path_buf();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let sandbox = DirectSandbox::new(path.display().to_string(), Duration::from_millis(200));
        let start = Instant::now();
        let invocation = sandbox.invoke(Path::new("/tmp/s.js")).await.unwrap();

        assert!(invocation.timed_out);
        assert!(invocation.exit_code.is_none());
        // The kill happened on expiry, not after the child's 30s sleep
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
