//! Scripted sandbox runtime for tests. No process is ever launched.

use crate::language::SANDBOX_INPUT;
use crate::sandbox::{Invocation, RawExit, SandboxError, SandboxRuntime, Stage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

type Responder = dyn Fn(&Invocation) -> Result<RawExit, SandboxError> + Send + Sync;

/// Answers each invocation from a script or a responder closure and
/// records every invocation it receives.
pub struct ScriptedRuntime {
    script: Mutex<VecDeque<Result<RawExit, SandboxError>>>,
    responder: Option<Box<Responder>>,
    delay: Duration,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRuntime {
    /// Answers with the given results in order; once exhausted every
    /// further call exits 0 with empty output.
    pub fn sequence(results: Vec<Result<RawExit, SandboxError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            responder: None,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&Invocation) -> Result<RawExit, SandboxError> + Send + Sync + 'static,
    {
        Self {
            script: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(responder)),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A program that copies its stdin to stdout. Compile stages succeed.
    pub fn echo() -> Self {
        Self::with_responder(|invocation| {
            if invocation.stage == Stage::Compile {
                return Ok(RawExit::default());
            }
            let stdout = invocation
                .mounts
                .iter()
                .find(|m| m.sandbox_path == SANDBOX_INPUT)
                .map(|m| std::fs::read_to_string(&m.host_path))
                .transpose()
                .map_err(|e| SandboxError::Unavailable(e.to_string()))?
                .unwrap_or_default();
            Ok(RawExit {
                stdout,
                ..Default::default()
            })
        })
    }

    /// Sleeps this long inside every call, to simulate slow jobs.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock poisoned").len()
    }

    /// Number of run-stage invocations, i.e. test cases actually executed.
    pub fn run_count(&self) -> usize {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .iter()
            .filter(|c| c.stage == Stage::Run)
            .count()
    }
}

#[async_trait]
impl SandboxRuntime for ScriptedRuntime {
    async fn execute(&self, invocation: &Invocation) -> Result<RawExit, SandboxError> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(invocation.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(responder) = &self.responder {
            return responder(invocation);
        }
        let next = self.script.lock().expect("script lock poisoned").pop_front();
        next.unwrap_or_else(|| Ok(RawExit::default()))
    }
}
