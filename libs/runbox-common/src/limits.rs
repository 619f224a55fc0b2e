use serde::{Deserialize, Serialize};

/// Resource limits attached to every sandbox invocation
///
/// Fixed per deployment, not per request. The sandbox binary applies these
/// inside the jail; the worker only carries them into the argument list.
/// Memory values are in megabytes, matching the isolation binary's units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_cpus: u32,
    pub rlimit_as_mb: u32,
    pub rlimit_stack_mb: u32,
    pub rlimit_nproc: u32,
    /// Reduced-privilege identity inside the jail (nobody:nogroup)
    pub uid: u32,
    pub gid: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_cpus: 1,
            rlimit_as_mb: 512,
            rlimit_stack_mb: 64,
            rlimit_nproc: 32,
            uid: 65534,
            gid: 65534,
        }
    }
}
