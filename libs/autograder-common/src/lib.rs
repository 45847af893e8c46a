pub mod config;
pub mod markers;
pub mod types;

pub use config::{BreakerConfig, Config};
pub use markers::Marker;
pub use types::{
    ErrorCategory, ExecutionOutcome, ExecutionStatus, GradedResult, Language, RawExecutionResult,
    SubmissionAttempt, TestCase, TestCaseOutcome,
};
