use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound on diagnostic text kept in a persisted submission record.
/// The caller always receives the full diagnostic; storage gets a prefix.
pub const MAX_STORED_DIAGNOSTIC_BYTES: usize = 4 * 1024;

/// Languages the judge can compile and run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    Java,
    Python,
    Javascript,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Cpp,
        Language::Java,
        Language::Python,
        Language::Javascript,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "python",
            Language::Javascript => "javascript",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language: {0:?}")]
pub struct UnsupportedLanguage(pub String);

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpp" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            "python" => Ok(Language::Python),
            "javascript" => Ok(Language::Javascript),
            _ => Err(UnsupportedLanguage(s.to_string())),
        }
    }
}

/// One (input, expected output) pair. Position in the problem's list is its index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    #[serde(rename = "output")]
    pub expected_output: String,
}

/// Identity of the caller, as established by the upstream auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub name: String,
}

/// Ad hoc execution against a single custom input. Nothing is persisted.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub language: Language,
    pub source_code: String,
    pub input: String,
}

/// Graded execution against a problem's ordered test cases.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub user: UserRef,
    pub problem_id: String,
    pub language: Language,
    pub source_code: String,
    pub test_cases: Vec<TestCase>,
}

/// Code-quality failure classes shared by run mode and graded verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Compilation,
    Runtime,
    TimeLimit,
    MemoryLimit,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Compilation => "Compilation Error",
            FailureKind::Runtime => "Runtime Error",
            FailureKind::TimeLimit => "Time Limit Exceeded",
            FailureKind::MemoryLimit => "Memory Limit Exceeded",
        }
    }
}

/// Result of a run-mode request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunReport {
    /// Clean exit; stdout exactly as the program produced it.
    Output { stdout: String },
    Failed { kind: FailureKind, diagnostic: String },
}

/// Final graded outcome of a submit-mode request.
///
/// Test indices are 0-based; labels shown to people are 1-based.
/// Infrastructure failures are not verdicts and never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    WrongAnswer {
        test_index: usize,
        expected: String,
        actual: String,
    },
    CompilationError {
        diagnostic: String,
    },
    RuntimeError {
        test_index: usize,
        diagnostic: String,
    },
    TimeLimitExceeded {
        test_index: usize,
        diagnostic: String,
    },
    MemoryLimitExceeded {
        test_index: usize,
        diagnostic: String,
    },
}

impl Verdict {
    /// Builds the rejection for a classified failure on test `test_index`.
    pub fn from_failure(kind: FailureKind, test_index: usize, diagnostic: String) -> Self {
        match kind {
            FailureKind::Compilation => Verdict::CompilationError { diagnostic },
            FailureKind::Runtime => Verdict::RuntimeError { test_index, diagnostic },
            FailureKind::TimeLimit => Verdict::TimeLimitExceeded { test_index, diagnostic },
            FailureKind::MemoryLimit => Verdict::MemoryLimitExceeded { test_index, diagnostic },
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn test_index(&self) -> Option<usize> {
        match self {
            Verdict::Accepted | Verdict::CompilationError { .. } => None,
            Verdict::WrongAnswer { test_index, .. }
            | Verdict::RuntimeError { test_index, .. }
            | Verdict::TimeLimitExceeded { test_index, .. }
            | Verdict::MemoryLimitExceeded { test_index, .. } => Some(*test_index),
        }
    }

    /// Result label, e.g. `Wrong Answer on testcase 3`.
    pub fn label(&self) -> String {
        let base = match self {
            Verdict::Accepted => return "Accepted".to_string(),
            Verdict::CompilationError { .. } => return FailureKind::Compilation.label().to_string(),
            Verdict::WrongAnswer { .. } => "Wrong Answer",
            Verdict::RuntimeError { .. } => FailureKind::Runtime.label(),
            Verdict::TimeLimitExceeded { .. } => FailureKind::TimeLimit.label(),
            Verdict::MemoryLimitExceeded { .. } => FailureKind::MemoryLimit.label(),
        };
        match self.test_index() {
            Some(index) => format!("{} on testcase {}", base, index + 1),
            None => base.to_string(),
        }
    }

    /// Text returned verbatim to the caller alongside the label.
    pub fn diagnostic(&self) -> String {
        match self {
            Verdict::Accepted => "All test cases passed.".to_string(),
            Verdict::WrongAnswer { expected, actual, .. } => {
                format!("Expected Output:\n{}\nYour Output:\n{}", expected, actual)
            }
            Verdict::CompilationError { diagnostic }
            | Verdict::RuntimeError { diagnostic, .. }
            | Verdict::TimeLimitExceeded { diagnostic, .. }
            | Verdict::MemoryLimitExceeded { diagnostic, .. } => diagnostic.clone(),
        }
    }
}

/// Immutable entry in a problem's submission history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub user: String,
    pub result: String,
    pub language: Language,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    pub submission_date: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn new(
        user: &UserRef,
        language: Language,
        code: &str,
        verdict: &Verdict,
        submission_date: DateTime<Utc>,
    ) -> Self {
        let diagnostic = match verdict {
            Verdict::Accepted => None,
            other => Some(truncate_diagnostic(&other.diagnostic(), MAX_STORED_DIAGNOSTIC_BYTES)),
        };
        Self {
            user: user.name.clone(),
            result: verdict.label(),
            language,
            code: code.to_string(),
            diagnostic,
            submission_date,
        }
    }
}

/// Marker that a user reached Accepted on a problem at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolvedRecord {
    #[serde(rename = "problemID")]
    pub problem_id: String,
    pub language: Language,
    #[serde(rename = "submissionDate")]
    pub submission_date: DateTime<Utc>,
}

/// Cuts `text` to at most `max_bytes`, respecting UTF-8 boundaries.
pub fn truncate_diagnostic(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n[truncated]", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserRef {
        UserRef {
            id: "u1".to_string(),
            name: "alice".to_string(),
        }
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!("cpp".parse::<Language>(), Ok(Language::Cpp));
        assert_eq!("Java".parse::<Language>(), Ok(Language::Java));
        assert_eq!(" python ".parse::<Language>(), Ok(Language::Python));
        assert_eq!("javascript".parse::<Language>(), Ok(Language::Javascript));
        assert_eq!(
            "rust".parse::<Language>(),
            Err(UnsupportedLanguage("rust".to_string()))
        );
        assert!("".parse::<Language>().is_err());
    }

    #[test]
    fn test_language_serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&Language::Javascript).unwrap(), "\"javascript\"");
        let lang: Language = serde_json::from_str("\"cpp\"").unwrap();
        assert_eq!(lang, Language::Cpp);
    }

    #[test]
    fn test_test_case_wire_format() {
        let tc: TestCase = serde_json::from_str(r#"{"input":"1 2","output":"3"}"#).unwrap();
        assert_eq!(tc.expected_output, "3");
    }

    #[test]
    fn test_verdict_labels_are_one_based() {
        assert_eq!(Verdict::Accepted.label(), "Accepted");
        assert_eq!(
            Verdict::CompilationError { diagnostic: "x".into() }.label(),
            "Compilation Error"
        );
        let wa = Verdict::WrongAnswer {
            test_index: 0,
            expected: "5".into(),
            actual: "6".into(),
        };
        assert_eq!(wa.label(), "Wrong Answer on testcase 1");
        assert_eq!(wa.diagnostic(), "Expected Output:\n5\nYour Output:\n6");
        assert_eq!(
            Verdict::from_failure(FailureKind::TimeLimit, 2, String::new()).label(),
            "Time Limit Exceeded on testcase 3"
        );
        assert_eq!(
            Verdict::from_failure(FailureKind::MemoryLimit, 4, String::new()).label(),
            "Memory Limit Exceeded on testcase 5"
        );
        assert_eq!(
            Verdict::from_failure(FailureKind::Runtime, 1, String::new()).label(),
            "Runtime Error on testcase 2"
        );
    }

    #[test]
    fn test_compilation_failure_has_no_index() {
        let verdict = Verdict::from_failure(FailureKind::Compilation, 3, "boom".into());
        assert_eq!(verdict, Verdict::CompilationError { diagnostic: "boom".into() });
        assert_eq!(verdict.test_index(), None);
    }

    #[test]
    fn test_submission_record_bounds_diagnostic() {
        let verdict = Verdict::RuntimeError {
            test_index: 0,
            diagnostic: "e".repeat(MAX_STORED_DIAGNOSTIC_BYTES * 3),
        };
        let record = SubmissionRecord::new(&user(), Language::Python, "print(1)", &verdict, Utc::now());
        let stored = record.diagnostic.unwrap();
        assert!(stored.len() < MAX_STORED_DIAGNOSTIC_BYTES + 32);
        assert!(stored.ends_with("[truncated]"));
        assert_eq!(record.user, "alice");
        assert_eq!(record.result, "Runtime Error on testcase 1");
    }

    #[test]
    fn test_accepted_record_has_no_diagnostic() {
        let record = SubmissionRecord::new(&user(), Language::Cpp, "int main(){}", &Verdict::Accepted, Utc::now());
        assert_eq!(record.diagnostic, None);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("submissionDate").is_some());
        assert!(json.get("diagnostic").is_none());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "ééééé";
        let cut = truncate_diagnostic(text, 3);
        assert!(cut.starts_with("é"));
        assert!(!cut.starts_with("éé"));
        assert_eq!(truncate_diagnostic("short", 100), "short");
    }
}
