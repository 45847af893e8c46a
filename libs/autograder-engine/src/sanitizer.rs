// Removes every trace of hidden test cases from a student-facing result

use crate::parser::{scan, Tally};
use autograder_common::markers::{mentions_test, Marker, SummaryField, MISSING_POINTS_PREFIX};
use autograder_common::{ErrorCategory, GradedResult, TestCase, TestCaseOutcome};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

const HIDDEN_FAILURE_MESSAGE: &str = "A hidden test case reported an error";
const HIDDEN_COMPILE_MESSAGE: &str = "A hidden test case failed to compile";

/// Shorter fragments match too much unrelated output
const MIN_FRAGMENT_CHARS: usize = 5;
const MIN_IDENTIFIER_CHARS: usize = 4;

/// Words that name language or harness machinery rather than test content
const COMMON_IDENTIFIERS: &[&str] = &[
    "assert", "assert_eq", "assert_ne", "assertEquals", "True", "False", "None", "null",
    "nullptr", "true", "false", "self", "this", "return", "static", "public", "class", "void",
    "String", "Integer", "Boolean", "Double", "Long", "System", "println", "print", "printf",
    "cout", "endl", "equals", "length", "size", "Math", "Arrays", "List", "vector", "string",
    "throw", "bool", "boolean", "char", "auto", "const", "function", "expect", "Some", "unwrap",
    "to_string", "range", "list", "dict", "sorted", "toString", "Object", "Error",
    "AssertionError", "Exception", "console", "undefined", "float", "double",
];

pub struct VisibilitySanitizer;

impl VisibilitySanitizer {
    /// Redact hidden tests in place and recompute visible-only statistics
    pub fn sanitize(test_cases: &[TestCase], result: &mut GradedResult) {
        let hidden: BTreeSet<u32> = test_cases.iter().filter(|t| t.is_hidden()).map(|t| t.id).collect();
        if hidden.is_empty() {
            return;
        }
        let visible_points: BTreeMap<u32, u32> = test_cases
            .iter()
            .filter(|t| !t.is_hidden())
            .map(|t| (t.id, t.points()))
            .collect();
        let source = HiddenSource::new(test_cases);

        if result.error_category == Some(ErrorCategory::CompileError) && source.implicated(result) {
            debug!("Compile diagnostics quote hidden test code");
            result.stdout.clear();
            result.stderr.clear();
            result.console_output.clear();
            result.error = Some(HIDDEN_COMPILE_MESSAGE.to_string());
        }

        let mentions_hidden =
            |text: &str| hidden.iter().any(|id| mentions_test(text, *id)) || source.quoted_in(text);

        result.stdout = filter_lines(&result.stdout, &mentions_hidden);
        result.stderr = filter_lines(&result.stderr, &mentions_hidden);
        result.console_output = filter_lines(&result.console_output, &mentions_hidden);

        result.test_case_results.retain(|id, _| visible_points.contains_key(id));
        for outcome in result.test_case_results.values_mut() {
            scrub_outcome(outcome, &mentions_hidden);
        }

        if let Some(error) = result.error.take() {
            result.error = Some(scrub_error(&error, &hidden, &mentions_hidden));
        }

        let verdicts = visible_verdicts(&[result.stdout.as_str(), result.stderr.as_str()], &visible_points);
        for (id, passed) in verdicts {
            result.test_case_results.entry(id).or_default().passed = passed;
        }
        for (id, outcome) in result.test_case_results.iter_mut() {
            outcome.points = visible_points.get(id).copied().unwrap_or(0);
        }
        let tally = Tally::from_outcomes(result.test_case_results.values());

        result.stdout = rewrite_summaries(&result.stdout, tally);
        result.stderr = rewrite_summaries(&result.stderr, tally);

        result.passed_tests = tally.passed;
        result.failed_tests = tally.failed;
        result.earned_points = tally.earned;
        result.total_points = tally.total_points;
        result.normalize();

        debug!(
            hidden = hidden.len(),
            visible_results = result.test_case_results.len(),
            passed = result.passed_tests,
            failed = result.failed_tests,
            "Sanitized result"
        );
    }
}

/// Assertion source that only hidden tests carry
struct HiddenSource {
    fragments: Vec<String>,
    identifiers: BTreeSet<String>,
}

impl HiddenSource {
    fn new(test_cases: &[TestCase]) -> Self {
        let visible_code: Vec<&str> = test_cases
            .iter()
            .filter(|t| !t.is_hidden())
            .map(|t| t.assertion_code.as_str())
            .collect();
        let visible_identifiers: BTreeSet<&str> =
            visible_code.iter().flat_map(|code| identifiers(code)).collect();

        let mut fragments = Vec::new();
        let mut hidden_identifiers = BTreeSet::new();
        for test in test_cases.iter().filter(|t| t.is_hidden()) {
            for fragment in code_fragments(&test.assertion_code) {
                if !visible_code.iter().any(|code| code.contains(&fragment)) && !fragments.contains(&fragment) {
                    fragments.push(fragment);
                }
            }
            for identifier in identifiers(&test.assertion_code) {
                if identifier.len() >= MIN_IDENTIFIER_CHARS
                    && !visible_identifiers.contains(identifier)
                    && !COMMON_IDENTIFIERS.contains(&identifier)
                {
                    hidden_identifiers.insert(identifier.to_string());
                }
            }
        }

        Self {
            fragments,
            identifiers: hidden_identifiers,
        }
    }

    /// Whether `text` quotes a line of hidden assertion code
    fn quoted_in(&self, text: &str) -> bool {
        self.fragments.iter().any(|fragment| text.contains(fragment.as_str()))
    }

    /// Whether the diagnostics of `result` point at hidden assertion code
    fn implicated(&self, result: &GradedResult) -> bool {
        let error = result.error.as_deref().unwrap_or_default();
        [result.stdout.as_str(), result.stderr.as_str(), error]
            .iter()
            .any(|text| {
                self.quoted_in(text)
                    || identifiers(text).any(|word| self.identifiers.contains(word))
            })
    }
}

/// Trimmed assertion lines, plus the bare expression of `assert <expr>` lines
/// (the form the compiled harnesses rewrite it into)
fn code_fragments(code: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    for line in code.lines() {
        let line = line.trim().trim_end_matches(';').trim_end();
        let mut candidates = vec![line];
        if let Some(expression) = line.strip_prefix("assert ") {
            candidates.push(expression.trim());
        }
        for candidate in candidates {
            let significant = candidate.chars().filter(|c| !c.is_whitespace()).count();
            if significant >= MIN_FRAGMENT_CHARS {
                fragments.push(candidate.to_string());
            }
        }
    }
    fragments
}

fn identifiers(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| word.starts_with(|c: char| c.is_alphabetic() || c == '_'))
}

fn rebuild(lines: Vec<String>, original: &str) -> String {
    let mut text = lines.join("\n");
    if original.ends_with('\n') && !text.is_empty() {
        text.push('\n');
    }
    text
}

fn filter_lines<F>(text: &str, mentions_hidden: &F) -> String
where
    F: Fn(&str) -> bool,
{
    let kept: Vec<String> = text
        .lines()
        .filter(|line| !mentions_hidden(line))
        .map(str::to_string)
        .collect();
    rebuild(kept, text)
}

/// Drop per-test fields that quote a hidden test
fn scrub_outcome<F>(outcome: &mut TestCaseOutcome, mentions_hidden: &F)
where
    F: Fn(&str) -> bool,
{
    if outcome.error_message.as_deref().is_some_and(mentions_hidden) {
        outcome.error_message = None;
    }
    if outcome.actual_output.as_ref().is_some_and(|v| mentions_hidden(&v.to_string())) {
        outcome.actual_output = None;
    }
    if outcome.stderr.as_ref().is_some_and(|v| mentions_hidden(&v.to_string())) {
        outcome.stderr = None;
    }
}

fn scrub_error<F>(error: &str, hidden: &BTreeSet<u32>, mentions_hidden: &F) -> String
where
    F: Fn(&str) -> bool,
{
    if let Some(detail) = error.trim().strip_prefix(MISSING_POINTS_PREFIX) {
        let kept: Vec<&str> = detail
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .filter(|name| !hidden.iter().any(|id| mentions_test(name, *id)))
            .collect();
        let listed = if kept.is_empty() {
            "(hidden test cases)".to_string()
        } else {
            kept.join(", ")
        };
        return format!("{} {}", MISSING_POINTS_PREFIX, listed);
    }

    if mentions_hidden(error) {
        HIDDEN_FAILURE_MESSAGE.to_string()
    } else {
        error.to_string()
    }
}

/// Verdict per visible id, ignoring console lines. A test passes only when
/// every verdict printed for it is PASSED.
fn visible_verdicts(streams: &[&str], visible: &BTreeMap<u32, u32>) -> BTreeMap<u32, bool> {
    let mut verdicts = BTreeMap::new();
    for stream in streams {
        for line in scan(stream) {
            if let Some(Marker::Verdict { id, passed, .. }) = line.marker {
                if visible.contains_key(&id) {
                    let seen = verdicts.entry(id).or_insert(true);
                    *seen = *seen && passed;
                }
            }
        }
    }
    verdicts
}

/// Rewrite every results block with the visible-only numbers
fn rewrite_summaries(text: &str, tally: Tally) -> String {
    let mut lines = Vec::new();
    let mut in_block = false;

    for line in scan(text) {
        match line.marker {
            Some(Marker::ResultsHeader) => {
                in_block = true;
                lines.push(line.text.to_string());
            }
            Some(Marker::Summary { field, .. }) if in_block => {
                let value = match field {
                    SummaryField::Passed => tally.passed,
                    SummaryField::Failed => tally.failed,
                    SummaryField::Total => tally.passed.saturating_add(tally.failed),
                    SummaryField::Earned => tally.earned,
                    SummaryField::TotalPoints => tally.total_points,
                };
                lines.push(Marker::Summary { field, value }.render());
            }
            _ => {
                if !line.text.trim().is_empty() {
                    in_block = false;
                }
                lines.push(line.text.to_string());
            }
        }
    }
    rebuild(lines, text)
}
