/// Test Evaluator - Language-Agnostic Judging Logic
///
/// **Core Responsibility:**
/// Decide, for one executed test case, whether grading continues or ends
/// with a verdict.
///
/// **Critical Properties:**
/// - Knows nothing about Docker
/// - Knows nothing about language runtimes
/// - Knows nothing about storage
/// - Pure function: (test index, outcome, expected output) → step
///
/// **Normalization Rules (Applied to All Languages):**
/// - Trim leading and trailing whitespace: YES
/// - Ignore trailing newline differences: YES (via trim)
/// - Internal whitespace: preserved, must match exactly
/// - Case sensitivity: YES (exact match required)

use crate::sandbox::Outcome;
use arbiter_common::types::{FailureKind, TestCase, Verdict};

/// Normalize output string for comparison
fn normalize_output(output: &str) -> &str {
    output.trim()
}

/// Exact equality after trimming both sides.
pub fn outputs_match(expected: &str, actual: &str) -> bool {
    normalize_output(expected) == normalize_output(actual)
}

/// Transition out of `Running(test_index)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Test passed, move on to the next one.
    Continue,
    /// Grading ends here with this verdict.
    Finish(Verdict),
}

/// Judges one executed test case.
///
/// Any classified failure ends grading at this index; a clean run ends it
/// only on an output mismatch.
pub fn step(test_index: usize, outcome: Outcome, test_case: &TestCase) -> Step {
    let (kind, stderr) = match outcome {
        Outcome::Success { stdout } => {
            if outputs_match(&test_case.expected_output, &stdout) {
                return Step::Continue;
            }
            return Step::Finish(Verdict::WrongAnswer {
                test_index,
                expected: normalize_output(&test_case.expected_output).to_string(),
                actual: normalize_output(&stdout).to_string(),
            });
        }
        Outcome::CompileFailure { stderr } => (FailureKind::Compilation, stderr),
        Outcome::MemoryExceeded { stderr } => (FailureKind::MemoryLimit, stderr),
        Outcome::TimeExceeded { stderr } => (FailureKind::TimeLimit, stderr),
        Outcome::RuntimeFailure { stderr, .. } => (FailureKind::Runtime, stderr),
    };
    Step::Finish(Verdict::from_failure(kind, test_index, stderr))
}
