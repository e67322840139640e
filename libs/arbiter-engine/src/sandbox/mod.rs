/// Sandbox Runtime - Abstraction for Isolated Execution
///
/// **Core Responsibility:**
/// Run one command inside an isolation boundary under CPU, memory and
/// wall-clock limits, and report what the OS saw.
///
/// **Architectural Boundary:**
/// - A runtime knows HOW to isolate (Docker today)
/// - It does NOT know languages, test cases or verdicts
/// - It returns raw exit facts; `classify` turns them into an `Outcome`
///
/// The grading logic only ever sees `dyn SandboxRuntime`, so a different
/// isolation technology can be swapped in without touching it.

pub mod classify;
pub mod docker;

pub use classify::{classify, Outcome, Stage};

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Bounds enforced by the sandbox itself, never by the caller polling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceLimits {
    pub wall_time: Duration,
    pub memory_bytes: u64,
    pub cpus: f64,
}

/// A host path exposed inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host_path: PathBuf,
    pub sandbox_path: String,
    pub read_only: bool,
}

impl Mount {
    pub fn read_only(host_path: impl Into<PathBuf>, sandbox_path: &str) -> Self {
        Self {
            host_path: host_path.into(),
            sandbox_path: sandbox_path.to_string(),
            read_only: true,
        }
    }

    pub fn writable(host_path: impl Into<PathBuf>, sandbox_path: &str) -> Self {
        Self {
            host_path: host_path.into(),
            sandbox_path: sandbox_path.to_string(),
            read_only: false,
        }
    }
}

/// One sandboxed process launch.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub stage: Stage,
    pub image: String,
    pub command: Vec<String>,
    pub mounts: Vec<Mount>,
    /// Sandbox path fed to the process as stdin; `None` means empty stdin.
    pub stdin: Option<String>,
    pub limits: ResourceLimits,
}

/// What the runtime observed when the process ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawExit {
    pub exit_code: i64,
    /// Set when the runtime's memory enforcement killed the process.
    pub oom_killed: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Infrastructure failures. These are never code-quality outcomes.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox runtime unavailable: {0}")]
    Unavailable(String),
    #[error("sandbox image {image} unavailable: {reason}")]
    Image { image: String, reason: String },
    #[error("{stage} container failed: {reason}")]
    Container { stage: Stage, reason: String },
    #[error("job pool closed")]
    PoolClosed,
}

#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Runs the invocation to completion. Blocks until the process exits or
    /// the sandbox kills it. Exactly one attempt, no retries.
    async fn execute(&self, invocation: &Invocation) -> Result<RawExit, SandboxError>;
}
