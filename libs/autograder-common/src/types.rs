use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Strongly-typed language enum
/// Four explicitly coded languages plus a generic fallback that carries the
/// sandbox's own name for the runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    Python,
    Java,
    Cpp,
    Rust,
    Generic(String),
}

impl Language {
    /// Returns the explicitly supported variants
    pub fn all_variants() -> &'static [Language] {
        &[Language::Python, Language::Java, Language::Cpp, Language::Rust]
    }

    /// Parse a language from string (case-insensitive, alias aware)
    pub fn parse(s: &str) -> Language {
        let name = s.trim().to_lowercase();
        match name.as_str() {
            "python" | "py" | "python3" => Language::Python,
            "java" => Language::Java,
            "cpp" | "c++" | "gcc" | "g++" => Language::Cpp,
            "rust" | "rs" => Language::Rust,
            _ => Language::Generic(name),
        }
    }

    /// Language name the sandbox expects in an execute request
    pub fn sandbox_name(&self) -> &str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::Cpp => "c++",
            Language::Rust => "rust",
            Language::Generic(name) => name,
        }
    }

    /// Name the sandbox lists installable packages under
    /// C++ ships inside the gcc package
    pub fn package_name(&self) -> &str {
        match self {
            Language::Cpp => "gcc",
            other => other.sandbox_name(),
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Language::Python => ".py",
            Language::Java => ".java",
            Language::Cpp => ".cpp",
            Language::Rust => ".rs",
            Language::Generic(name) => match name.as_str() {
                "javascript" | "js" | "node" | "nodejs" => ".js",
                "typescript" | "ts" => ".ts",
                _ => ".txt",
            },
        }
    }

    /// File name of the single submitted source file
    /// Java requires the file to match `public class Main`
    pub fn file_name(&self) -> String {
        match self {
            Language::Java => "Main.java".to_string(),
            other => format!("main{}", other.file_extension()),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::Java => write!(f, "java"),
            Language::Cpp => write!(f, "cpp"),
            Language::Rust => write!(f, "rust"),
            Language::Generic(name) => write!(f, "{}", name),
        }
    }
}

impl From<String> for Language {
    fn from(value: String) -> Self {
        Language::parse(&value)
    }
}

impl From<Language> for String {
    fn from(value: Language) -> Self {
        value.to_string()
    }
}

/// Test Case Definition (Immutable Input)
/// Authored by an instructor and owned by an assignment outside this crate.
/// `point_value` is optional on the wire so that a test that forgot its
/// points can be reported as a configuration error instead of being scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: u32,
    #[serde(default)]
    pub point_value: Option<u32>,
    /// `false` marks a hidden test case
    #[serde(default = "default_visibility")]
    pub visibility: bool,
    pub assertion_code: String,
    #[serde(default)]
    pub order: i32,
}

fn default_visibility() -> bool {
    true
}

impl TestCase {
    pub fn new(id: u32, point_value: u32, visibility: bool, assertion_code: &str) -> Self {
        Self {
            id,
            point_value: Some(point_value),
            visibility,
            assertion_code: assertion_code.to_string(),
            order: id as i32,
        }
    }

    pub fn is_hidden(&self) -> bool {
        !self.visibility
    }

    pub fn points(&self) -> u32 {
        self.point_value.unwrap_or(0)
    }
}

/// One grading request's input; never persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionAttempt {
    pub source_code: String,
    pub language: Language,
}

/// The sandbox's literal response
/// Read-only once received; synthesized failures fill `stderr` with the
/// failure class and leave `exit_code` at -1
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
    pub signal: Option<String>,
    pub compile_stdout: String,
    pub compile_stderr: String,
    pub compile_exit_code: Option<i64>,
}

impl RawExecutionResult {
    /// Result for a call that never produced sandbox output
    pub fn synthetic(stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            exit_code: Some(-1),
            ..Default::default()
        }
    }

    pub fn compile_failed(&self) -> bool {
        !self.compile_stderr.trim().is_empty()
            || matches!(self.compile_exit_code, Some(code) if code != 0)
    }
}

/// Execution State Classification
/// The failure taxonomy surfaced by the sandbox client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Run phase exited with code 0
    Completed,
    /// Run phase exited non-zero or without an exit code
    RuntimeError,
    /// The sandbox killed the run for exceeding its run timeout
    TimeLimitExceeded,
    CompileError,
    /// The HTTP request to the sandbox timed out
    Timeout,
    ConnectionError,
    HttpError,
    /// Circuit breaker open; no request was sent
    ServiceUnavailable,
    InternalError,
}

impl ExecutionStatus {
    /// The sandbox could not run the harness; the student should retry later
    pub fn is_sandbox_unavailable(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Timeout
                | ExecutionStatus::ConnectionError
                | ExecutionStatus::ServiceUnavailable
                | ExecutionStatus::HttpError
                | ExecutionStatus::InternalError
        )
    }

    /// The sandbox actually ran the harness
    pub fn ran(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::RuntimeError
                | ExecutionStatus::TimeLimitExceeded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::RuntimeError => "runtime_error",
            ExecutionStatus::TimeLimitExceeded => "time_limit_exceeded",
            ExecutionStatus::CompileError => "compile_error",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::ConnectionError => "connection_error",
            ExecutionStatus::HttpError => "http_error",
            ExecutionStatus::ServiceUnavailable => "service_unavailable",
            ExecutionStatus::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified sandbox call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    /// Version string the request was finally sent with
    pub language_version: String,
    pub raw: RawExecutionResult,
}

/// Grading Error Categories
/// Used to tell configuration and infrastructure problems apart from faults
/// in the student's own code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad harness template or test cases without points; never the student's fault
    Configuration,
    /// Circuit open, connect error or timeout; try again later
    SandboxUnavailable,
    CompileError,
    RuntimeError,
    /// Instrumentation was malformed or missing
    ParseDegraded,
}

/// Per-Test Outcome
/// `points` is the point value declared by the most recent verdict marker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestCaseOutcome {
    pub passed: bool,
    pub points: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<Value>,
}

/// Graded Result
/// Created fresh per grading call, redacted in place for students, then
/// handed to the caller.
///
/// ## Invariants
/// - total_tests == passed_tests + failed_tests
/// - earned_points <= total_points
/// - passed == all_passed == (has_tests && failed_tests == 0)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedResult {
    pub total_tests: u32,
    pub passed_tests: u32,
    pub failed_tests: u32,
    pub earned_points: u32,
    pub total_points: u32,
    pub passed: bool,
    pub all_passed: bool,
    pub has_tests: bool,
    pub test_case_results: BTreeMap<u32, TestCaseOutcome>,
    pub console_output: String,
    pub stdout: String,
    pub stderr: String,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
}

impl GradedResult {
    /// A result with no tests found
    pub fn empty(status: ExecutionStatus) -> Self {
        Self {
            total_tests: 0,
            passed_tests: 0,
            failed_tests: 0,
            earned_points: 0,
            total_points: 0,
            passed: false,
            all_passed: false,
            has_tests: false,
            test_case_results: BTreeMap::new(),
            console_output: String::new(),
            stdout: String::new(),
            stderr: String::new(),
            status,
            error: None,
            error_category: None,
        }
    }

    /// A zero-test result carrying an explanatory error
    pub fn failure(status: ExecutionStatus, category: ErrorCategory, message: impl Into<String>) -> Self {
        let mut result = Self::empty(status);
        result.error = Some(message.into());
        result.error_category = Some(category);
        result
    }

    /// Recompute the derived flags and enforce the count/point invariants
    pub fn normalize(&mut self) {
        self.total_tests = self.passed_tests.saturating_add(self.failed_tests);
        if self.earned_points > self.total_points {
            self.earned_points = self.total_points;
        }
        self.has_tests = self.total_tests > 0;
        self.all_passed = self.has_tests && self.failed_tests == 0;
        self.passed = self.all_passed;
    }
}
