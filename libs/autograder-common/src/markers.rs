// Line-oriented marker protocol shared by the harness templates and the result parser

use serde::{Deserialize, Serialize};
use std::fmt;

pub const PROTOCOL_VERSION: u32 = 1;

pub const CONSOLE_BEGIN: &str = "=== Console Output ===";
pub const CONSOLE_END: &str = "=== End Console Output ===";
pub const RESULTS_HEADER: &str = "=== Test Results ===";
pub const MISSING_POINTS_PREFIX: &str = "ERROR: Tests without point markers:";
pub const MISSING_POINTS_HINT: &str = "All tests must use point markers";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SummaryField {
    Passed,
    Failed,
    Total,
    Earned,
    TotalPoints,
}

impl SummaryField {
    pub fn label(&self) -> &'static str {
        match self {
            SummaryField::Passed => "Passed",
            SummaryField::Failed => "Failed",
            SummaryField::Total => "Total",
            SummaryField::Earned => "Earned",
            SummaryField::TotalPoints => "TotalPoints",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "Passed" => Some(SummaryField::Passed),
            "Failed" => Some(SummaryField::Failed),
            "Total" => Some(SummaryField::Total),
            "Earned" => Some(SummaryField::Earned),
            "TotalPoints" => Some(SummaryField::TotalPoints),
            _ => None,
        }
    }
}

/// One instrumentation line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Marker {
    /// `points` is the test's point value, for both outcomes
    Verdict { id: u32, points: u32, passed: bool },
    Error { id: u32, value: String },
    Output { id: u32, value: String },
    Stderr { id: u32, value: String },
    ConsoleBegin,
    ConsoleEnd,
    ResultsHeader,
    Summary { field: SummaryField, value: u32 },
    MissingPoints { detail: String },
}

impl Marker {
    /// Parse a single output line; ordinary program output yields `None`
    pub fn parse(line: &str) -> Option<Marker> {
        let line = line.trim_end_matches(['\r', '\n']);
        let trimmed = line.trim();

        match trimmed {
            CONSOLE_BEGIN => return Some(Marker::ConsoleBegin),
            CONSOLE_END => return Some(Marker::ConsoleEnd),
            RESULTS_HEADER => return Some(Marker::ResultsHeader),
            _ => {}
        }

        if let Some(rest) = trimmed.strip_prefix("PASSED:") {
            return parse_verdict(rest, true);
        }
        if let Some(rest) = trimmed.strip_prefix("FAILED:") {
            return parse_verdict(rest, false);
        }
        if let Some(rest) = trimmed.strip_prefix(MISSING_POINTS_PREFIX) {
            return Some(Marker::MissingPoints {
                detail: rest.trim().to_string(),
            });
        }

        // Values keep their inner whitespace; only the separator space is dropped
        let body = line.trim_start();
        if let Some((id, value)) = parse_tagged(body, "ERROR_") {
            return Some(Marker::Error { id, value });
        }
        if let Some((id, value)) = parse_tagged(body, "OUTPUT_") {
            return Some(Marker::Output { id, value });
        }
        if let Some((id, value)) = parse_tagged(body, "STDERR_") {
            return Some(Marker::Stderr { id, value });
        }

        let (label, value) = trimmed.split_once(':')?;
        let field = SummaryField::from_label(label.trim())?;
        let value = value.trim().parse::<u32>().ok()?;
        Some(Marker::Summary { field, value })
    }

    /// Canonical line form
    pub fn render(&self) -> String {
        match self {
            Marker::Verdict { id, points, passed } => {
                let word = if *passed { "PASSED" } else { "FAILED" };
                format!("{}: test_case_{}:{}", word, id, points)
            }
            Marker::Error { id, value } => format!("ERROR_{}: {}", id, value),
            Marker::Output { id, value } => format!("OUTPUT_{}: {}", id, value),
            Marker::Stderr { id, value } => format!("STDERR_{}: {}", id, value),
            Marker::ConsoleBegin => CONSOLE_BEGIN.to_string(),
            Marker::ConsoleEnd => CONSOLE_END.to_string(),
            Marker::ResultsHeader => RESULTS_HEADER.to_string(),
            Marker::Summary { field, value } => format!("{}: {}", field.label(), value),
            Marker::MissingPoints { detail } => format!("{} {}", MISSING_POINTS_PREFIX, detail),
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn parse_verdict(rest: &str, passed: bool) -> Option<Marker> {
    let rest = rest.trim().strip_prefix("test_case_")?;
    let (id, points) = rest.split_once(':')?;
    let id = id.trim().parse::<u32>().ok()?;
    let points = points.trim().parse::<u32>().ok()?;
    Some(Marker::Verdict { id, points, passed })
}

fn parse_tagged(line: &str, tag: &str) -> Option<(u32, String)> {
    let rest = line.strip_prefix(tag)?;
    let (id, value) = rest.split_once(':')?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let id = id.parse::<u32>().ok()?;
    let value = value.strip_prefix(' ').unwrap_or(value);
    Some((id, value.to_string()))
}

/// Substrings that identify a test id's instrumentation
pub fn hidden_needles(id: u32) -> [String; 4] {
    [
        format!("test_case_{}:", id),
        format!("ERROR_{}:", id),
        format!("OUTPUT_{}:", id),
        format!("STDERR_{}:", id),
    ]
}

/// True if `line` carries a needle for `id` or names `test_case_{id}` at all
pub fn mentions_test(line: &str, id: u32) -> bool {
    if hidden_needles(id).iter().any(|needle| line.contains(needle.as_str())) {
        return true;
    }
    let name = format!("test_case_{}", id);
    line.match_indices(name.as_str()).any(|(at, _)| {
        let next = line[at + name.len()..].chars().next();
        !matches!(next, Some(c) if c.is_ascii_digit())
    })
}

/// The sentinel line printed when tests lack a point value
pub fn missing_points_line(ids: &[u32]) -> String {
    let names: Vec<String> = ids.iter().map(|id| format!("test_case_{}", id)).collect();
    Marker::MissingPoints {
        detail: names.join(", "),
    }
    .render()
}
