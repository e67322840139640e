/// Sandboxed Executor
///
/// **Responsibility:**
/// Drive one job through its recipe's stages inside the sandbox and
/// classify the result.
///
/// - Compile stage (when the language has one) writes into the job's build dir
/// - Run stage reads the test input as stdin, build dir mounted read-only
/// - Each stage waits for a permit from the shared job pool
/// - Infra failures come back as `Err`, code-quality failures as `Outcome`

use crate::language::{Recipe, SandboxProfile, SANDBOX_BUILD_DIR, SANDBOX_INPUT, SANDBOX_SRC_DIR};
use crate::sandbox::{classify, Invocation, Mount, Outcome, ResourceLimits, SandboxError, SandboxRuntime, Stage};
use crate::workspace::JobWorkspace;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

pub struct Executor {
    runtime: Arc<dyn SandboxRuntime>,
    permits: Arc<Semaphore>,
}

impl Executor {
    pub fn new(runtime: Arc<dyn SandboxRuntime>, max_concurrent_jobs: usize) -> Self {
        Self {
            runtime,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs)),
        }
    }

    /// Permits currently free in the job pool.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Executes one job. The source is materialized in `job`, its build dir
    /// prepared, and the input written at `input_path`.
    #[instrument(skip_all, fields(job_id = %job.id(), language = %recipe.language))]
    pub async fn execute(
        &self,
        recipe: &Recipe,
        profile: &SandboxProfile,
        job: &JobWorkspace,
        input_path: &Path,
    ) -> Result<Outcome, SandboxError> {
        let source_file = recipe.source_file_name(&job.id());
        let build_dir = job.build_dir();

        if let Some(command) = recipe.compile_command(&source_file) {
            let invocation = Invocation {
                stage: Stage::Compile,
                image: profile.image.clone(),
                command,
                mounts: vec![
                    Mount::read_only(job.source_dir(), SANDBOX_SRC_DIR),
                    Mount::writable(build_dir, SANDBOX_BUILD_DIR),
                ],
                stdin: None,
                limits: profile.compile_limits,
            };
            let outcome = self.run_stage(&invocation).await?;
            if !outcome.is_success() {
                return Ok(outcome);
            }
        }

        let invocation = Invocation {
            stage: Stage::Run,
            image: profile.image.clone(),
            command: recipe.run_command(&source_file),
            mounts: vec![
                Mount::read_only(job.source_dir(), SANDBOX_SRC_DIR),
                Mount::read_only(build_dir, SANDBOX_BUILD_DIR),
                Mount::read_only(input_path, SANDBOX_INPUT),
            ],
            stdin: Some(SANDBOX_INPUT.to_string()),
            limits: profile.run_limits,
        };
        let outcome = self.run_stage(&invocation).await?;
        Ok(annotate(outcome, &profile.run_limits))
    }

    async fn run_stage(&self, invocation: &Invocation) -> Result<Outcome, SandboxError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SandboxError::PoolClosed)?;

        let started = Instant::now();
        let raw = self.runtime.execute(invocation).await?;
        let outcome = classify(invocation.stage, raw);

        debug!(
            stage = %invocation.stage,
            outcome = outcome.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stage finished"
        );
        Ok(outcome)
    }
}

/// Gives limit failures a readable diagnostic when the program printed nothing.
fn annotate(outcome: Outcome, limits: &ResourceLimits) -> Outcome {
    match outcome {
        Outcome::TimeExceeded { stderr } if stderr.trim().is_empty() => Outcome::TimeExceeded {
            stderr: format!("Time limit of {} ms exceeded", limits.wall_time.as_millis()),
        },
        Outcome::MemoryExceeded { stderr } if stderr.trim().is_empty() => Outcome::MemoryExceeded {
            stderr: format!("Memory limit of {} MB exceeded", limits.memory_bytes / (1024 * 1024)),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::LanguageConfigManager;
    use crate::sandbox::RawExit;
    use crate::testing::ScriptedRuntime;
    use crate::workspace::ScratchSpace;
    use arbiter_common::config::EngineConfig;
    use arbiter_common::types::Language;

    fn setup(language: Language, source: &str) -> (Recipe, SandboxProfile) {
        let recipe = Recipe::resolve(language, source).unwrap();
        let profile = LanguageConfigManager::builtin().profile(language, &EngineConfig::default());
        (recipe, profile)
    }

    #[tokio::test]
    async fn test_compiled_language_runs_two_stages() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(tmp.path()).unwrap();
        let runtime = Arc::new(ScriptedRuntime::sequence(vec![
            Ok(RawExit::default()),
            Ok(RawExit {
                stdout: "42\n".into(),
                ..Default::default()
            }),
        ]));
        let executor = Executor::new(runtime.clone(), 2);

        let (recipe, profile) = setup(Language::Java, "public class Sol {}");
        let mut job = scratch.open_job();
        job.materialize_source(&recipe.source_file_name(&job.id()), "public class Sol {}").unwrap();
        let input = job.materialize_input(0, "").unwrap();
        job.prepare_build_dir().unwrap();

        let outcome = executor.execute(&recipe, &profile, &job, &input).await.unwrap();
        assert_eq!(outcome, Outcome::Success { stdout: "42\n".into() });

        let calls = runtime.invocations();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].stage, Stage::Compile);
        assert_eq!(calls[0].stdin, None);
        assert!(calls[0].mounts.iter().any(|m| m.sandbox_path == SANDBOX_BUILD_DIR && !m.read_only));
        assert_eq!(calls[1].stage, Stage::Run);
        assert_eq!(calls[1].stdin.as_deref(), Some(SANDBOX_INPUT));
        assert!(calls[1].mounts.iter().all(|m| m.read_only));
        assert_eq!(calls[1].command.last().unwrap(), "Sol");
    }

    #[tokio::test]
    async fn test_compile_failure_skips_run_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(tmp.path()).unwrap();
        let runtime = Arc::new(ScriptedRuntime::sequence(vec![Ok(RawExit {
            exit_code: 1,
            stderr: "error: expected ';'".into(),
            ..Default::default()
        })]));
        let executor = Executor::new(runtime.clone(), 1);

        let (recipe, profile) = setup(Language::Cpp, "int main(){return 0}");
        let mut job = scratch.open_job();
        job.materialize_source(&recipe.source_file_name(&job.id()), "int main(){return 0}").unwrap();
        let input = job.materialize_input(0, "").unwrap();
        job.prepare_build_dir().unwrap();

        let outcome = executor.execute(&recipe, &profile, &job, &input).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::CompileFailure {
                stderr: "error: expected ';'".into()
            }
        );
        assert_eq!(runtime.call_count(), 1);
    }

    #[tokio::test]
    async fn test_interpreted_language_never_reports_compile_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(tmp.path()).unwrap();
        let runtime = Arc::new(ScriptedRuntime::sequence(vec![Ok(RawExit {
            exit_code: 1,
            stderr: "SyntaxError: invalid syntax".into(),
            ..Default::default()
        })]));
        let executor = Executor::new(runtime.clone(), 1);

        let (recipe, profile) = setup(Language::Python, "print(");
        let mut job = scratch.open_job();
        job.materialize_source(&recipe.source_file_name(&job.id()), "print(").unwrap();
        let input = job.materialize_input(0, "").unwrap();
        job.prepare_build_dir().unwrap();

        let outcome = executor.execute(&recipe, &profile, &job, &input).await.unwrap();
        assert!(matches!(outcome, Outcome::RuntimeFailure { exit_code: 1, .. }));
        assert_eq!(runtime.invocations()[0].stage, Stage::Run);
    }

    #[tokio::test]
    async fn test_limit_failures_get_a_diagnostic() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(tmp.path()).unwrap();
        let runtime = Arc::new(ScriptedRuntime::sequence(vec![Ok(RawExit {
            exit_code: 124,
            ..Default::default()
        })]));
        let executor = Executor::new(runtime, 1);

        let (recipe, profile) = setup(Language::Javascript, "while(true){}");
        let mut job = scratch.open_job();
        job.materialize_source(&recipe.source_file_name(&job.id()), "while(true){}").unwrap();
        let input = job.materialize_input(0, "").unwrap();
        job.prepare_build_dir().unwrap();

        let outcome = executor.execute(&recipe, &profile, &job, &input).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::TimeExceeded {
                stderr: "Time limit of 5000 ms exceeded".into()
            }
        );
    }

    #[tokio::test]
    async fn test_runtime_unavailable_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = ScratchSpace::new(tmp.path()).unwrap();
        let runtime = Arc::new(ScriptedRuntime::sequence(vec![Err(SandboxError::Unavailable(
            "daemon down".into(),
        ))]));
        let executor = Executor::new(runtime, 1);

        let (recipe, profile) = setup(Language::Python, "print(1)");
        let mut job = scratch.open_job();
        job.materialize_source(&recipe.source_file_name(&job.id()), "print(1)").unwrap();
        let input = job.materialize_input(0, "").unwrap();
        job.prepare_build_dir().unwrap();

        let err = executor.execute(&recipe, &profile, &job, &input).await.unwrap_err();
        assert!(matches!(err, SandboxError::Unavailable(_)));
        assert_eq!(executor.available_slots(), 1);
    }
}
