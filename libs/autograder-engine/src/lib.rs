pub mod catalog;
pub mod diagnostics;
pub mod grader;
pub mod harness;
pub mod literal;
pub mod metrics;
pub mod parser;
pub mod sandbox;
pub mod sanitizer;

pub use catalog::{InstallOutcome, InstallReport, LanguageCatalog};
pub use grader::{GradeOptions, Grader, GraderError};
pub use harness::{HarnessError, HarnessGenerator};
pub use parser::ResultParser;
pub use sandbox::{CircuitBreaker, HealthStatus, SandboxClient, SandboxError};
pub use sanitizer::VisibilitySanitizer;
