use crate::sandbox::SandboxError;
use crate::workspace::WorkspaceError;
use arbiter_common::store::StoreError;

/// Failures of a judge request that are not graded outcomes.
///
/// Code-quality failures (compile errors, wrong answers, limits) are
/// verdicts, not errors. Only `InvalidRequest` is the caller's fault; every
/// other variant is infrastructure and is never recorded as a submission.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

impl JudgeError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, JudgeError::InvalidRequest(_))
    }
}
