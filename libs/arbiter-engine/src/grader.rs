/// Grading Orchestrator
///
/// **Responsibility:**
/// Turn a run or submit request into a report or a verdict.
///
/// - Run mode: one job against the custom input, raw stdout back, nothing persisted
/// - Submit mode: one job per test case, in order, stopping at the first failure
/// - Accepted submissions mark the problem solved (once per user) and bump
///   the problem's accepted counter
/// - Every submit that reaches a verdict is appended to the history exactly once
/// - Infrastructure failures abort grading and are never recorded
///
/// **State Machine (submit mode):**
/// ```text
/// Pending → Running(0) → Running(1) → ... → Accepted
///                ↓            ↓
///            Rejected     Rejected          (any state) → InfraError
/// ```

use crate::error::JudgeError;
use crate::evaluator::{self, Step};
use crate::executor::Executor;
use crate::language::{LanguageConfigManager, Recipe, SandboxProfile};
use crate::sandbox::{Outcome, SandboxRuntime};
use crate::workspace::ScratchSpace;
use arbiter_common::config::EngineConfig;
use arbiter_common::store::VerdictStore;
use arbiter_common::types::{
    FailureKind, RunReport, RunRequest, SolvedRecord, SubmissionRecord, SubmitRequest, TestCase, Verdict,
};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Largest accepted source file.
pub const MAX_SOURCE_BYTES: usize = 1024 * 1024;
/// Largest accepted stdin for a single job.
pub const MAX_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Where a submission is in its grading lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradeState {
    Pending,
    Running(usize),
    Accepted,
    Rejected(String),
    InfraError,
}

impl fmt::Display for GradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradeState::Pending => write!(f, "pending"),
            GradeState::Running(index) => write!(f, "running({})", index),
            GradeState::Accepted => write!(f, "accepted"),
            GradeState::Rejected(label) => write!(f, "rejected({})", label),
            GradeState::InfraError => write!(f, "infra_error"),
        }
    }
}

impl GradeState {
    fn advance(&mut self, next: GradeState) {
        debug!(from = %self, to = %next, "Grade state transition");
        *self = next;
    }
}

pub struct Judge {
    config: EngineConfig,
    languages: LanguageConfigManager,
    scratch: ScratchSpace,
    executor: Executor,
    store: Arc<dyn VerdictStore>,
}

impl Judge {
    pub fn new(
        config: EngineConfig,
        languages: LanguageConfigManager,
        runtime: Arc<dyn SandboxRuntime>,
        store: Arc<dyn VerdictStore>,
    ) -> Result<Self, JudgeError> {
        let scratch = ScratchSpace::new(&config.scratch_root)?;
        let executor = Executor::new(runtime, config.max_concurrent_jobs);
        Ok(Self {
            config,
            languages,
            scratch,
            executor,
            store,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn languages(&self) -> &LanguageConfigManager {
        &self.languages
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn store(&self) -> &Arc<dyn VerdictStore> {
        &self.store
    }

    /// Executes `request` once against its custom input.
    #[instrument(skip_all, fields(language = %request.language))]
    pub async fn run(&self, request: RunRequest) -> Result<RunReport, JudgeError> {
        validate_source(&request.source_code)?;
        validate_input(&request.input)?;

        let recipe = match Recipe::resolve(request.language, &request.source_code) {
            Ok(recipe) => recipe,
            Err(e) => {
                return Ok(RunReport::Failed {
                    kind: FailureKind::Compilation,
                    diagnostic: e.to_string(),
                })
            }
        };
        let profile = self.languages.profile(request.language, &self.config);

        let outcome = self
            .execute_job(&recipe, &profile, &request.source_code, 0, &request.input)
            .await?;
        info!(outcome = outcome.name(), "Run finished");
        Ok(run_report(outcome))
    }

    /// Grades `request` against its test cases and records the verdict.
    #[instrument(
        skip_all,
        fields(
            problem_id = %request.problem_id,
            user_id = %request.user.id,
            language = %request.language,
            test_count = request.test_cases.len()
        )
    )]
    pub async fn submit(&self, request: SubmitRequest) -> Result<Verdict, JudgeError> {
        validate_submission(&request)?;

        let started = Instant::now();
        let verdict = match self.grade(&request).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(error = %e, "Grading aborted by infrastructure failure");
                return Err(e);
            }
        };

        self.record(&request, &verdict).await?;

        info!(
            verdict = %verdict.label(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Submission graded"
        );
        Ok(verdict)
    }

    /// Like [`Judge::run`], but on a detached task so dropping the returned
    /// future does not abandon a job mid-flight.
    pub async fn spawn_run(self: &Arc<Self>, request: RunRequest) -> Result<RunReport, JudgeError> {
        let judge = Arc::clone(self);
        tokio::spawn(async move { judge.run(request).await })
            .await
            .map_err(|e| JudgeError::Internal(format!("run task failed: {}", e)))?
    }

    /// Like [`Judge::submit`], on a detached task.
    pub async fn spawn_submit(self: &Arc<Self>, request: SubmitRequest) -> Result<Verdict, JudgeError> {
        let judge = Arc::clone(self);
        tokio::spawn(async move { judge.submit(request).await })
            .await
            .map_err(|e| JudgeError::Internal(format!("grading task failed: {}", e)))?
    }

    async fn grade(&self, request: &SubmitRequest) -> Result<Verdict, JudgeError> {
        let mut state = GradeState::Pending;

        let recipe = match Recipe::resolve(request.language, &request.source_code) {
            Ok(recipe) => recipe,
            Err(e) => {
                let verdict = Verdict::CompilationError {
                    diagnostic: e.to_string(),
                };
                state.advance(GradeState::Rejected(verdict.label()));
                return Ok(verdict);
            }
        };
        let profile = self.languages.profile(request.language, &self.config);

        for (index, test_case) in request.test_cases.iter().enumerate() {
            state.advance(GradeState::Running(index));

            let outcome = match self
                .execute_job(&recipe, &profile, &request.source_code, index, &test_case.input)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    state.advance(GradeState::InfraError);
                    return Err(e);
                }
            };

            if let Step::Finish(verdict) = evaluator::step(index, outcome, test_case) {
                state.advance(GradeState::Rejected(verdict.label()));
                return Ok(verdict);
            }
        }

        state.advance(GradeState::Accepted);
        Ok(Verdict::Accepted)
    }

    /// One isolated job: fresh scratch files, one sandboxed execution,
    /// scratch released on every path.
    async fn execute_job(
        &self,
        recipe: &Recipe,
        profile: &SandboxProfile,
        source: &str,
        test_index: usize,
        input: &str,
    ) -> Result<Outcome, JudgeError> {
        let mut job = self.scratch.open_job();

        let result = async {
            job.materialize_source(&recipe.source_file_name(&job.id()), source)?;
            let input_path = job.materialize_input(test_index, input)?;
            job.prepare_build_dir()?;
            let outcome = self.executor.execute(recipe, profile, &job, &input_path).await?;
            Ok::<_, JudgeError>(outcome)
        }
        .await;

        if let Err(e) = job.cleanup() {
            warn!(job_id = %job.id(), error = %e, "Failed to release job workspace");
        }
        result
    }

    /// Appends history, then marks solved, then bumps the counter. A problem
    /// is never solved without a history entry behind it.
    async fn record(&self, request: &SubmitRequest, verdict: &Verdict) -> Result<(), JudgeError> {
        let now = Utc::now();

        let record = SubmissionRecord::new(&request.user, request.language, &request.source_code, verdict, now);
        self.store.append_submission(&request.problem_id, &record).await?;

        if !verdict.is_accepted() {
            return Ok(());
        }

        if !self.store.has_solved(&request.user.id, &request.problem_id).await? {
            let solved = SolvedRecord {
                problem_id: request.problem_id.clone(),
                language: request.language,
                submission_date: now,
            };
            let inserted = self.store.insert_solved(&request.user.id, &solved).await?;
            debug!(inserted, "Solved record written");
        }

        let accepted = self.store.increment_accepted(&request.problem_id).await?;
        debug!(accepted, "Accepted counter bumped");
        Ok(())
    }
}

fn run_report(outcome: Outcome) -> RunReport {
    let (kind, diagnostic) = match outcome {
        Outcome::Success { stdout } => return RunReport::Output { stdout },
        Outcome::CompileFailure { stderr } => (FailureKind::Compilation, stderr),
        Outcome::MemoryExceeded { stderr } => (FailureKind::MemoryLimit, stderr),
        Outcome::TimeExceeded { stderr } => (FailureKind::TimeLimit, stderr),
        Outcome::RuntimeFailure { stderr, .. } => (FailureKind::Runtime, stderr),
    };
    RunReport::Failed { kind, diagnostic }
}

fn validate_source(source: &str) -> Result<(), JudgeError> {
    if source.trim().is_empty() {
        return Err(JudgeError::InvalidRequest("Empty code!".into()));
    }
    if source.len() > MAX_SOURCE_BYTES {
        return Err(JudgeError::InvalidRequest(format!(
            "Source code exceeds the {} byte limit",
            MAX_SOURCE_BYTES
        )));
    }
    Ok(())
}

fn validate_input(input: &str) -> Result<(), JudgeError> {
    if input.len() > MAX_INPUT_BYTES {
        return Err(JudgeError::InvalidRequest(format!(
            "Input exceeds the {} byte limit",
            MAX_INPUT_BYTES
        )));
    }
    Ok(())
}

fn validate_submission(request: &SubmitRequest) -> Result<(), JudgeError> {
    validate_source(&request.source_code)?;
    if request.problem_id.trim().is_empty() {
        return Err(JudgeError::InvalidRequest("Problem id is required".into()));
    }
    if request.test_cases.is_empty() {
        return Err(JudgeError::InvalidRequest("Problem has no test cases".into()));
    }
    request
        .test_cases
        .iter()
        .try_for_each(|TestCase { input, .. }| validate_input(input))
}
