//! Mapping from raw sandbox exit facts to semantic outcomes.
//!
//! Precedence, first match wins:
//!
//! | stage   | observation                      | outcome          |
//! |---------|----------------------------------|------------------|
//! | compile | exit != 0                        | `CompileFailure` |
//! | run     | killed by memory enforcement     | `MemoryExceeded` |
//! | run     | exit 124 / 137 / 152             | `TimeExceeded`   |
//! | run     | any other exit != 0              | `RuntimeFailure` |
//! | any     | exit 0                           | `Success`        |
//!
//! Memory is checked before time: an OOM kill also surfaces as SIGKILL (137),
//! so a process that blew both ceilings is always `MemoryExceeded`.

use super::RawExit;
use arbiter_common::types::FailureKind;
use std::fmt;

/// `timeout(1)` status when the wall-clock budget ran out.
pub const EXIT_TIMEOUT: i64 = 124;
/// 128 + SIGKILL: forced termination at the hard limit.
pub const EXIT_SIGKILL: i64 = 137;
/// 128 + SIGXCPU: CPU-time rlimit reached.
pub const EXIT_SIGXCPU: i64 = 152;

const TIME_LIMIT_EXITS: [i64; 3] = [EXIT_TIMEOUT, EXIT_SIGKILL, EXIT_SIGXCPU];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Compile,
    Run,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Compile => f.write_str("compile"),
            Stage::Run => f.write_str("run"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Clean exit; stdout exactly as produced.
    Success { stdout: String },
    CompileFailure { stderr: String },
    MemoryExceeded { stderr: String },
    TimeExceeded { stderr: String },
    RuntimeFailure { exit_code: i64, stderr: String },
}

impl Outcome {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::CompileFailure { .. } => Some(FailureKind::Compilation),
            Outcome::MemoryExceeded { .. } => Some(FailureKind::MemoryLimit),
            Outcome::TimeExceeded { .. } => Some(FailureKind::TimeLimit),
            Outcome::RuntimeFailure { .. } => Some(FailureKind::Runtime),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::CompileFailure { .. } => "compile_failure",
            Outcome::MemoryExceeded { .. } => "memory_exceeded",
            Outcome::TimeExceeded { .. } => "time_exceeded",
            Outcome::RuntimeFailure { .. } => "runtime_failure",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Classifies one stage's exit. Pure; no process is involved.
pub fn classify(stage: Stage, raw: RawExit) -> Outcome {
    let RawExit {
        exit_code,
        oom_killed,
        stdout,
        stderr,
    } = raw;

    if exit_code == 0 && !oom_killed {
        return Outcome::Success { stdout };
    }

    match stage {
        Stage::Compile => {
            // Some compilers report diagnostics on stdout
            let diagnostic = if stderr.trim().is_empty() { stdout } else { stderr };
            Outcome::CompileFailure { stderr: diagnostic }
        }
        Stage::Run if oom_killed => Outcome::MemoryExceeded { stderr },
        Stage::Run if TIME_LIMIT_EXITS.contains(&exit_code) => Outcome::TimeExceeded { stderr },
        Stage::Run => Outcome::RuntimeFailure { exit_code, stderr },
    }
}
