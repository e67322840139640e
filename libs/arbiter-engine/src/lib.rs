//! Submission execution engine: resolves a language recipe, materializes
//! per-job files, runs them in an isolated sandbox and grades the result.

pub mod error;
pub mod evaluator;
pub mod executor;
pub mod grader;
pub mod language;
pub mod sandbox;
pub mod workspace;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;


pub use error::JudgeError;
pub use grader::Judge;
