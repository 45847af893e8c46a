/// Result Parser - Harness Output to Structured Grade
///
/// **Core Responsibility:**
/// Recover per-test verdicts and an aggregate partial-credit score from
/// interleaved program output and instrumentation markers.
///
/// **Critical Properties:**
/// - Pure and idempotent: same input, same `GradedResult`
/// - Lines inside the console block are never interpreted as markers
/// - The last `=== Test Results ===` block is authoritative, then the
///   count/point invariants are re-established
/// - Never fails; missing or malformed instrumentation yields zero tests
///
/// **Scoring Rules:**
/// - A verdict's points are the test's point value
/// - earned = sum of points of passed tests
/// - total_points = sum of points of all tests with a verdict
/// - passed == all_passed == (has_tests && failed == 0)

use crate::diagnostics;
use crate::literal::{decode_message, decode_or_raw};
use autograder_common::markers::{Marker, SummaryField};
use autograder_common::{
    ErrorCategory, ExecutionOutcome, ExecutionStatus, GradedResult, TestCaseOutcome,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One classified output line
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScannedLine<'a> {
    pub text: &'a str,
    /// `None` for ordinary output and for anything inside the console block
    pub marker: Option<Marker>,
    pub in_console: bool,
}

/// Classify each line of one stream; an unterminated console block runs to
/// the end of that stream
pub(crate) fn scan(text: &str) -> Vec<ScannedLine<'_>> {
    let mut in_console = false;
    let mut lines = Vec::new();
    for line in text.lines() {
        let marker = Marker::parse(line);
        if in_console {
            if marker == Some(Marker::ConsoleEnd) {
                in_console = false;
                lines.push(ScannedLine { text: line, marker, in_console: false });
            } else {
                lines.push(ScannedLine { text: line, marker: None, in_console: true });
            }
            continue;
        }
        if marker == Some(Marker::ConsoleBegin) {
            in_console = true;
        }
        lines.push(ScannedLine { text: line, marker, in_console: false });
    }
    lines
}

/// Summary block values; fields absent from the block stay `None`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Summary {
    pub passed: Option<u32>,
    pub failed: Option<u32>,
    pub total: Option<u32>,
    pub earned: Option<u32>,
    pub total_points: Option<u32>,
}

impl Summary {
    fn set(&mut self, field: SummaryField, value: u32) {
        match field {
            SummaryField::Passed => self.passed = Some(value),
            SummaryField::Failed => self.failed = Some(value),
            SummaryField::Total => self.total = Some(value),
            SummaryField::Earned => self.earned = Some(value),
            SummaryField::TotalPoints => self.total_points = Some(value),
        }
    }
}

/// Verdict totals computed from a per-test map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Tally {
    pub passed: u32,
    pub failed: u32,
    pub earned: u32,
    pub total_points: u32,
}

impl Tally {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a TestCaseOutcome>) -> Self {
        let mut tally = Tally::default();
        for outcome in outcomes {
            tally.total_points = tally.total_points.saturating_add(outcome.points);
            if outcome.passed {
                tally.passed = tally.passed.saturating_add(1);
                tally.earned = tally.earned.saturating_add(outcome.points);
            } else {
                tally.failed = tally.failed.saturating_add(1);
            }
        }
        tally
    }
}

/// Everything marker-derived from a set of streams
#[derive(Debug, Default)]
struct Extraction {
    tests: BTreeMap<u32, TestCaseOutcome>,
    console: Vec<String>,
    summary: Option<Summary>,
    missing_points: Option<String>,
}

fn extract(streams: &[&str]) -> Extraction {
    let mut extraction = Extraction::default();
    let mut current: Option<Summary> = None;

    for stream in streams {
        for line in scan(stream) {
            if line.in_console {
                extraction.console.push(line.text.to_string());
                continue;
            }

            let Some(marker) = line.marker else {
                if !line.text.trim().is_empty() {
                    if let Some(done) = current.take() {
                        extraction.summary = Some(done);
                    }
                }
                continue;
            };

            match marker {
                Marker::Summary { field, value } => {
                    if let Some(summary) = current.as_mut() {
                        summary.set(field, value);
                    }
                    continue;
                }
                Marker::ResultsHeader => {
                    if let Some(done) = current.take() {
                        extraction.summary = Some(done);
                    }
                    current = Some(Summary::default());
                    continue;
                }
                _ => {
                    if let Some(done) = current.take() {
                        extraction.summary = Some(done);
                    }
                }
            }

            match marker {
                Marker::Verdict { id, points, passed } => {
                    let entry = extraction.tests.entry(id).or_default();
                    entry.passed = passed;
                    entry.points = points;
                }
                Marker::Error { id, value } => {
                    extraction.tests.entry(id).or_default().error_message = Some(decode_message(&value));
                }
                Marker::Output { id, value } => {
                    extraction.tests.entry(id).or_default().actual_output = Some(decode_or_raw(&value));
                }
                Marker::Stderr { id, value } => {
                    extraction.tests.entry(id).or_default().stderr = Some(decode_or_raw(&value));
                }
                Marker::MissingPoints { .. } => {
                    if extraction.missing_points.is_none() {
                        extraction.missing_points = Some(line.text.trim().to_string());
                    }
                }
                _ => {}
            }
        }

        // A summary block never spans streams
        if let Some(done) = current.take() {
            extraction.summary = Some(done);
        }
    }

    extraction
}

/// Apply the authoritative summary over counted values, then normalize
pub(crate) fn settle(result: &mut GradedResult, counted: Tally, summary: Option<Summary>) {
    result.passed_tests = counted.passed;
    result.failed_tests = counted.failed;
    result.earned_points = counted.earned;
    result.total_points = counted.total_points;

    if let Some(summary) = summary {
        if summary.passed.is_some_and(|v| v != counted.passed)
            || summary.failed.is_some_and(|v| v != counted.failed)
            || summary.earned.is_some_and(|v| v != counted.earned)
        {
            debug!(?summary, ?counted, "Summary block differs from counted verdicts");
        }
        result.passed_tests = summary.passed.unwrap_or(result.passed_tests);
        result.failed_tests = summary.failed.unwrap_or(result.failed_tests);
        result.earned_points = summary.earned.unwrap_or(result.earned_points);
        result.total_points = summary.total_points.unwrap_or(result.total_points);

        if let Some(total) = summary.total {
            if total != result.passed_tests.saturating_add(result.failed_tests) {
                warn!(
                    total,
                    passed = result.passed_tests,
                    failed = result.failed_tests,
                    "Summary total disagrees with passed + failed"
                );
            }
        }
    }

    if result.earned_points > result.total_points {
        warn!(
            earned = result.earned_points,
            total_points = result.total_points,
            "Earned points exceed total points, clamping"
        );
    }
    result.normalize();
}

pub struct ResultParser;

impl ResultParser {
    /// Parse harness output into a grade
    pub fn parse(stdout: &str, stderr: &str) -> GradedResult {
        let extraction = extract(&[stdout, stderr]);

        let mut result = GradedResult::empty(ExecutionStatus::Completed);
        result.stdout = stdout.to_string();
        result.stderr = stderr.to_string();
        result.console_output = extraction.console.join("\n");

        let counted = Tally::from_outcomes(extraction.tests.values());
        result.test_case_results = extraction.tests;
        settle(&mut result, counted, extraction.summary);

        if let Some(sentinel) = extraction.missing_points {
            result.error = Some(sentinel);
            result.error_category = Some(ErrorCategory::Configuration);
        }

        result
    }

    /// Turn a classified sandbox call into a grade
    pub fn grade(outcome: &ExecutionOutcome) -> GradedResult {
        let raw = &outcome.raw;
        match outcome.status {
            ExecutionStatus::CompileError => {
                let mut result = GradedResult::failure(
                    ExecutionStatus::CompileError,
                    ErrorCategory::CompileError,
                    diagnostics::compile_message(&raw.compile_stderr, &raw.compile_stdout),
                );
                result.stdout = raw.compile_stdout.clone();
                result.stderr = raw.compile_stderr.clone();
                result
            }
            status if status.is_sandbox_unavailable() => {
                let mut result = GradedResult::failure(
                    status,
                    ErrorCategory::SandboxUnavailable,
                    format!(
                        "The grading service is unavailable, please try again later ({})",
                        raw.stderr.trim()
                    ),
                );
                result.stderr = raw.stderr.clone();
                result
            }
            _ => {
                let mut result = Self::parse(&raw.stdout, &raw.stderr);
                result.status = outcome.status;
                if result.error.is_none() {
                    attach_run_diagnostics(&mut result, outcome);
                }
                result
            }
        }
    }
}

fn attach_run_diagnostics(result: &mut GradedResult, outcome: &ExecutionOutcome) {
    let raw = &outcome.raw;
    match outcome.status {
        ExecutionStatus::TimeLimitExceeded => {
            result.error = Some("Time limit exceeded".to_string());
            result.error_category = Some(ErrorCategory::RuntimeError);
        }
        ExecutionStatus::RuntimeError => {
            let message = diagnostics::first_error_line(&raw.stderr).unwrap_or_else(|| {
                format!("Program exited with code {}", raw.exit_code.unwrap_or(-1))
            });
            result.error = Some(message);
            result.error_category = Some(ErrorCategory::RuntimeError);
        }
        _ if !result.has_tests => {
            let message = diagnostics::first_error_line(&raw.stderr)
                .map(|line| format!("No test results were reported: {}", line))
                .unwrap_or_else(|| "No test results were reported".to_string());
            result.error = Some(message);
            result.error_category = Some(ErrorCategory::ParseDegraded);
        }
        _ => {}
    }
}
