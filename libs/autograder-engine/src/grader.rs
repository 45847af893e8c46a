/// Grader - Submission to Graded Result
///
/// **Pipeline:**
/// 1. Parse the language name
/// 2. Resolve the sandbox version through the catalog
/// 3. Generate the harness
/// 4. Execute it in the sandbox
/// 5. Parse the output into a grade
/// 6. Redact hidden tests (student view only)
///
/// **Guarantee:**
/// Every call yields a well-formed `GradedResult`. Template problems become a
/// `Configuration` failure with a generic message; the detail is logged.

use crate::harness::{HarnessError, HarnessGenerator};
use crate::metrics;
use crate::parser::ResultParser;
use crate::sandbox::{SandboxClient, SandboxError};
use crate::sanitizer::VisibilitySanitizer;
use autograder_common::{Config, ErrorCategory, ExecutionStatus, GradedResult, Language, TestCase};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

const CONFIGURATION_MESSAGE: &str =
    "Grading is misconfigured for this language, please contact your instructor";

#[derive(Debug, Error)]
pub enum GraderError {
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error(transparent)]
    Harness(#[from] HarnessError),
}

/// Per-call knobs
#[derive(Debug, Clone, Copy, Default)]
pub struct GradeOptions {
    /// Run timeout in milliseconds; the configured default when `None`
    pub timeout_ms: Option<u64>,
    /// Skip redaction of hidden tests
    pub instructor_view: bool,
}

pub struct Grader {
    client: Arc<SandboxClient>,
    harness: HarnessGenerator,
}

impl Grader {
    pub fn new(client: Arc<SandboxClient>, harness: HarnessGenerator) -> Self {
        Self { client, harness }
    }

    pub fn from_config(config: Config) -> Result<Self, GraderError> {
        let harness = HarnessGenerator::from_config_dir(config.template_dir.as_deref())?;
        let client = SandboxClient::new(config)?;
        Ok(Self::new(Arc::new(client), harness))
    }

    /// Student view: hidden tests are redacted
    pub async fn grade_submission(
        &self,
        language: &str,
        source_code: &str,
        test_cases: &[TestCase],
    ) -> GradedResult {
        self.grade_with_options(language, source_code, test_cases, GradeOptions::default())
            .await
    }

    /// Instructor view: everything the harness reported
    pub async fn grade_submission_unredacted(
        &self,
        language: &str,
        source_code: &str,
        test_cases: &[TestCase],
    ) -> GradedResult {
        let options = GradeOptions {
            instructor_view: true,
            ..GradeOptions::default()
        };
        self.grade_with_options(language, source_code, test_cases, options)
            .await
    }

    #[tracing::instrument(
        skip(self, source_code, test_cases, options),
        fields(
            request_id = %Uuid::new_v4(),
            language = %language,
            tests = test_cases.len(),
            instructor = options.instructor_view
        )
    )]
    pub async fn grade_with_options(
        &self,
        language: &str,
        source_code: &str,
        test_cases: &[TestCase],
        options: GradeOptions,
    ) -> GradedResult {
        let started = Instant::now();
        let language = Language::parse(language);

        let mut result = self.run_pipeline(&language, source_code, test_cases, options).await;
        if !options.instructor_view {
            VisibilitySanitizer::sanitize(test_cases, &mut result);
        }

        metrics::record_grading(&language.to_string(), result.status.as_str());
        info!(
            status = %result.status,
            passed = result.passed_tests,
            failed = result.failed_tests,
            earned = result.earned_points,
            total_points = result.total_points,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Grading finished"
        );
        result
    }

    async fn run_pipeline(
        &self,
        language: &Language,
        source_code: &str,
        test_cases: &[TestCase],
        options: GradeOptions,
    ) -> GradedResult {
        let harness = match self.harness.generate(language, source_code, test_cases) {
            Ok(harness) => harness,
            Err(e) => {
                error!(language = %language, error = %e, "Harness generation failed");
                return GradedResult::failure(
                    ExecutionStatus::InternalError,
                    ErrorCategory::Configuration,
                    CONFIGURATION_MESSAGE,
                );
            }
        };

        let version = self.client.catalog().resolve_version(language, None).await;
        let timeout_ms = options
            .timeout_ms
            .unwrap_or(self.client.config().default_run_timeout_ms);

        let outcome = self
            .client
            .execute(language, &version, &harness, timeout_ms)
            .await;
        ResultParser::grade(&outcome)
    }
}
