/// Harness Generator - Single-File Test Programs per Language
///
/// **Core Responsibility:**
/// Merge a student submission and instructor test cases into one source
/// file that runs every test inside its own exception boundary and reports
/// through the marker protocol.
///
/// **Critical Architectural Boundary:**
/// - The generator knows HOW each language isolates and reports a test
/// - It does NOT execute anything or judge output
/// - Every variant prints the same marker lines and summary block
///
/// **Templates:**
/// Each variant owns a Handlebars template with `{{student_code}}` and
/// `{{test_execution_code}}` placeholders. Templates are rendered in strict
/// mode with escaping disabled, so unknown placeholders are errors and code
/// is inserted verbatim. Operators may override the built-in templates from
/// a directory.

mod cpp;
mod generic;
mod java;
mod python;
mod rust;

use autograder_common::markers::{missing_points_line, PROTOCOL_VERSION};
use autograder_common::{Language, TestCase};
use handlebars::Handlebars;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Variables every template must reference
const REQUIRED_PLACEHOLDERS: [&str; 2] = ["student_code", "test_execution_code"];

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("harness template for {language} is invalid: {reason}")]
    Template { language: String, reason: String },

    #[error("failed to read harness template {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Submission text after language-specific preparation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreparedSubmission {
    pub code: String,
    /// Lines that must precede everything else in the file
    pub preamble: String,
}

impl PreparedSubmission {
    fn verbatim(code: &str) -> Self {
        Self {
            code: code.to_string(),
            preamble: String::new(),
        }
    }
}

/// One language's harness strategy
pub trait HarnessTemplate: Send + Sync {
    /// Registry key, also used in error messages
    fn key(&self) -> &'static str;

    /// File name looked up in an override directory
    fn template_file(&self) -> &'static str;

    fn builtin_template(&self) -> &'static str;

    fn prepare_submission(&self, source: &str) -> PreparedSubmission {
        PreparedSubmission::verbatim(source)
    }

    /// Code for all tests, in the order given
    fn test_execution_code(&self, tests: &[&TestCase]) -> String;

    /// Code that only reports the missing-points sentinel
    fn missing_points_code(&self, sentinel: &str) -> String;
}

static PYTHON: python::PythonHarness = python::PythonHarness;
static JAVA: java::JavaHarness = java::JavaHarness;
static CPP: cpp::CppHarness = cpp::CppHarness;
static RUST: rust::RustHarness = rust::RustHarness;
static GENERIC: generic::GenericHarness = generic::GenericHarness;

fn all_variants() -> [&'static dyn HarnessTemplate; 5] {
    [&PYTHON, &JAVA, &CPP, &RUST, &GENERIC]
}

fn variant_for(language: &Language) -> &'static dyn HarnessTemplate {
    match language {
        Language::Python => &PYTHON,
        Language::Java => &JAVA,
        Language::Cpp => &CPP,
        Language::Rust => &RUST,
        Language::Generic(_) => &GENERIC,
    }
}

pub struct HarnessGenerator {
    registry: Handlebars<'static>,
    /// Variants whose template failed validation, with the reason
    broken: HashMap<&'static str, String>,
}

impl HarnessGenerator {
    /// Generator using the built-in templates
    pub fn new() -> Self {
        let sources = all_variants()
            .into_iter()
            .map(|variant| (variant.key(), variant.builtin_template().to_string()))
            .collect();
        Self::from_sources(sources)
    }

    /// Generator preferring templates found in `dir`; missing files fall
    /// back to the built-in template
    pub fn with_template_dir(dir: &Path) -> Result<Self, HarnessError> {
        let mut sources = Vec::new();
        for variant in all_variants() {
            let path = dir.join(variant.template_file());
            match std::fs::read_to_string(&path) {
                Ok(source) => {
                    info!(template = %path.display(), "Using harness template override");
                    sources.push((variant.key(), source));
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    sources.push((variant.key(), variant.builtin_template().to_string()));
                }
                Err(source) => return Err(HarnessError::Io { path, source }),
            }
        }
        Ok(Self::from_sources(sources))
    }

    /// Generator honoring an optional override directory
    pub fn from_config_dir(dir: Option<&Path>) -> Result<Self, HarnessError> {
        match dir {
            Some(dir) => Self::with_template_dir(dir),
            None => Ok(Self::new()),
        }
    }

    fn from_sources(sources: Vec<(&'static str, String)>) -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);

        let mut broken = HashMap::new();
        for (key, source) in sources {
            if let Some(missing) = REQUIRED_PLACEHOLDERS
                .iter()
                .find(|name| !references_placeholder(&source, name))
            {
                let reason = format!("missing placeholder {{{{{}}}}}", missing);
                warn!(language = key, reason = %reason, "Harness template rejected");
                broken.insert(key, reason);
                continue;
            }
            if let Err(e) = registry.register_template_string(key, source) {
                warn!(language = key, error = %e, "Harness template failed to compile");
                broken.insert(key, e.to_string());
            }
        }

        Self { registry, broken }
    }

    /// Synthesize the complete harness source for one submission
    pub fn generate(
        &self,
        language: &Language,
        submission: &str,
        tests: &[TestCase],
    ) -> Result<String, HarnessError> {
        let variant = variant_for(language);
        let template_error = |reason: String| HarnessError::Template {
            language: variant.key().to_string(),
            reason,
        };

        if let Some(reason) = self.broken.get(variant.key()) {
            return Err(template_error(reason.clone()));
        }

        let mut ordered: Vec<&TestCase> = tests.iter().collect();
        ordered.sort_by_key(|t| (t.order, t.id));

        let missing: Vec<u32> = ordered
            .iter()
            .filter(|t| t.point_value.is_none())
            .map(|t| t.id)
            .collect();

        let test_execution_code = if missing.is_empty() {
            variant.test_execution_code(&ordered)
        } else {
            warn!(language = %language, tests = ?missing, "Test cases without point values");
            variant.missing_points_code(&missing_points_line(&missing))
        };

        let prepared = variant.prepare_submission(submission);
        let data = json!({
            "student_code": prepared.code,
            "student_preamble": prepared.preamble,
            "test_execution_code": test_execution_code,
            "protocol_version": PROTOCOL_VERSION,
        });

        let source = self
            .registry
            .render(variant.key(), &data)
            .map_err(|e| template_error(e.to_string()))?;

        debug!(
            language = %language,
            tests = ordered.len(),
            harness_size = source.len(),
            "Harness generated"
        );
        Ok(source)
    }
}

impl Default for HarnessGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// True if `source` contains `{{name}}`, allowing inner whitespace
fn references_placeholder(source: &str, name: &str) -> bool {
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        let after = rest[start + 2..].trim_start_matches('{');
        if let Some(end) = after.find("}}") {
            if after[..end].trim() == name {
                return true;
            }
        }
        rest = &rest[start + 2..];
    }
    false
}

/// Remove the common leading indentation; tabs count as four spaces
pub(crate) fn dedent(code: &str) -> Vec<String> {
    let lines: Vec<String> = code
        .lines()
        .map(|line| {
            let body = line.trim_start_matches([' ', '\t']);
            let width: usize = line[..line.len() - body.len()]
                .chars()
                .map(|c| if c == '\t' { 4 } else { 1 })
                .sum();
            format!("{}{}", " ".repeat(width), body)
        })
        .collect();

    let common = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches(' ').len())
        .min()
        .unwrap_or(0);

    lines
        .into_iter()
        .map(|line| {
            if line.trim().is_empty() {
                String::new()
            } else {
                line[common..].trim_end().to_string()
            }
        })
        .collect()
}

/// Dedent `code` and prefix every non-empty line with `indent`
pub(crate) fn indent_block(code: &str, indent: &str) -> String {
    let mut out = String::new();
    for line in dedent(code) {
        if !line.is_empty() {
            out.push_str(indent);
            out.push_str(&line);
        }
        out.push('\n');
    }
    out
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Rewrite calls to `from(` into `to(` where `from` stands alone
pub(crate) fn rewrite_call(code: &str, from: &str, to: &str) -> String {
    let needle = format!("{}(", from);
    let mut out = String::with_capacity(code.len());
    let mut rest = code;
    while let Some(at) = rest.find(&needle) {
        let before = rest[..at].chars().next_back();
        let standalone = !matches!(before, Some(c) if is_ident_char(c) || c == '.' || c == ':');
        out.push_str(&rest[..at]);
        if standalone {
            out.push_str(to);
            out.push('(');
        } else {
            out.push_str(&needle);
        }
        rest = &rest[at + needle.len()..];
    }
    out.push_str(rest);
    out
}

/// Convert Python-style `assert expr` lines with `convert(expr)`
pub(crate) fn rewrite_python_asserts<F>(code: &str, convert: F) -> String
where
    F: Fn(&str) -> String,
{
    code.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let indent = &line[..line.len() - trimmed.len()];
            match trimmed.strip_prefix("assert ") {
                Some(expr) if !expr.trim().is_empty() => {
                    let expr = expr.trim().trim_end_matches(';').trim_end();
                    format!("{}{}", indent, convert(expr))
                }
                _ => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Double-quoted literal valid in Java and JavaScript source
pub(crate) fn java_like_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for unit in text.encode_utf16() {
        match unit {
            0x22 => out.push_str("\\\""),
            0x5c => out.push_str("\\\\"),
            0x0a => out.push_str("\\n"),
            0x0d => out.push_str("\\r"),
            0x09 => out.push_str("\\t"),
            0x20..=0x7e => out.push(unit as u8 as char),
            _ => out.push_str(&format!("\\u{:04x}", unit)),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(super) fn make_test_case(id: u32, points: u32, visible: bool, code: &str) -> TestCase {
        TestCase::new(id, points, visible, code)
    }

    /// Write `source` to a scratch directory and run it through `steps`;
    /// `{file}` and `{dir}` are substituted in every argument. Returns the
    /// last step's stdout and stderr, or `None` when a tool is not installed.
    pub(super) fn run_locally(
        file_name: &str,
        source: &str,
        steps: &[&[&str]],
    ) -> Option<(String, String)> {
        let dir = std::env::temp_dir().join(format!("autograder-harness-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join(file_name);
        std::fs::write(&file, source).unwrap();

        let substitute = |arg: &str| {
            arg.replace("{file}", &file.to_string_lossy())
                .replace("{dir}", &dir.to_string_lossy())
        };
        let mut last = None;
        for (i, step) in steps.iter().enumerate() {
            let (program, args) = step.split_first().unwrap();
            let output = match std::process::Command::new(substitute(*program))
                .args(args.iter().map(|arg| substitute(*arg)))
                .current_dir(&dir)
                .output()
            {
                Ok(output) => output,
                Err(e) => {
                    eprintln!("skipping harness run, {} unavailable: {}", program, e);
                    std::fs::remove_dir_all(&dir).ok();
                    return None;
                }
            };
            if i + 1 < steps.len() {
                assert!(
                    output.status.success(),
                    "{} failed: {}",
                    program,
                    String::from_utf8_lossy(&output.stderr)
                );
            }
            last = Some((
                String::from_utf8_lossy(&output.stdout).into_owned(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        std::fs::remove_dir_all(&dir).ok();
        last
    }

    #[test]
    fn test_references_placeholder() {
        assert!(references_placeholder("a {{student_code}} b", "student_code"));
        assert!(references_placeholder("a {{ student_code }} b", "student_code"));
        assert!(references_placeholder("a {{{student_code}}} b", "student_code"));
        assert!(!references_placeholder("a {{student}} b", "student_code"));
        assert!(!references_placeholder("$student_code", "student_code"));
    }

    #[test]
    fn test_dedent_and_indent() {
        let code = "    x = 1\n\n    if x:\n        y = 2\n";
        assert_eq!(dedent(code), vec!["x = 1", "", "if x:", "    y = 2"]);
        assert_eq!(indent_block("\tfoo()", "  "), "  foo()\n");
    }

    #[test]
    fn test_rewrite_call_only_standalone() {
        let code = "assert(a == 1); static_assert(b); my_assert(c); x.assert(d);";
        assert_eq!(
            rewrite_call(code, "assert", "test_assert"),
            "test_assert(a == 1); static_assert(b); my_assert(c); x.assert(d);"
        );
    }

    #[test]
    fn test_rewrite_python_asserts() {
        let code = "  assert add(2, 3) == 5\nassert_eq!(a, b);\nassert x;";
        let out = rewrite_python_asserts(code, |expr| format!("assert!({});", expr));
        assert_eq!(out, "  assert!(add(2, 3) == 5);\nassert_eq!(a, b);\nassert!(x);");
    }

    #[test]
    fn test_java_like_literal() {
        assert_eq!(java_like_literal("a \"b\"\n"), "\"a \\\"b\\\"\\n\"");
        assert_eq!(java_like_literal("é"), "\"\\u00e9\"");
    }

    #[test]
    fn test_tests_are_emitted_in_order() {
        let generator = HarnessGenerator::new();
        let mut late = make_test_case(1, 5, true, "assert True");
        late.order = 9;
        let early = make_test_case(2, 5, true, "assert True");

        let source = generator
            .generate(&Language::Python, "x = 1", &[late, early])
            .unwrap();
        let first = source.find("_finish_test(2,").unwrap();
        let second = source.find("_finish_test(1,").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_missing_points_emits_sentinel_only() {
        let generator = HarnessGenerator::new();
        let mut unscored = make_test_case(2, 0, true, "assert add(1, 1) == 2");
        unscored.point_value = None;
        let tests = vec![make_test_case(1, 10, true, "assert add(2, 3) == 5"), unscored];

        for language in [
            Language::Python,
            Language::Java,
            Language::Cpp,
            Language::Rust,
            Language::parse("javascript"),
        ] {
            let source = generator.generate(&language, "", &tests).unwrap();
            assert!(
                source.contains("ERROR: Tests without point markers: test_case_2"),
                "{} harness lacks sentinel",
                language
            );
            assert!(source.contains("All tests must use point markers"));
            assert!(!source.contains("add(2, 3)"), "{} harness still runs tests", language);
        }
    }

    #[test]
    fn test_template_override_missing_placeholder_is_rejected() {
        let sources = vec![
            ("python", "print('no placeholders here')".to_string()),
            ("java", JAVA.builtin_template().to_string()),
        ];
        let generator = HarnessGenerator::from_sources(sources);

        let err = generator
            .generate(&Language::Python, "x = 1", &[make_test_case(1, 1, true, "assert x")])
            .unwrap_err();
        assert!(matches!(err, HarnessError::Template { ref language, .. } if language == "python"));

        assert!(generator
            .generate(&Language::Java, "class A {}", &[make_test_case(1, 1, true, "assert true;")])
            .is_ok());
    }

    #[test]
    fn test_template_with_unknown_placeholder_fails_in_strict_mode() {
        let broken = "{{student_code}}\n{{test_execution_code}}\n{{undefined_variable}}\n";
        let generator = HarnessGenerator::from_sources(vec![("python", broken.to_string())]);
        let err = generator
            .generate(&Language::Python, "x = 1", &[make_test_case(1, 1, true, "assert x")])
            .unwrap_err();
        assert!(matches!(err, HarnessError::Template { .. }));
    }

    #[test]
    fn test_student_braces_are_inserted_verbatim() {
        let generator = HarnessGenerator::new();
        let source = generator
            .generate(
                &Language::Rust,
                "fn braces() -> String { format!(\"{{}}\", 1) }",
                &[make_test_case(1, 1, true, "assert!(true);")],
            )
            .unwrap();
        assert!(source.contains("format!(\"{{}}\", 1)"));
    }

    #[test]
    fn test_template_dir_override() {
        let dir = std::env::temp_dir().join(format!("harness-override-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("python_test.py"),
            "# custom\n{{student_code}}\n{{test_execution_code}}\n",
        )
        .unwrap();

        let generator = HarnessGenerator::with_template_dir(&dir).unwrap();
        let python = generator
            .generate(&Language::Python, "x = 1", &[make_test_case(1, 1, true, "assert x")])
            .unwrap();
        assert!(python.starts_with("# custom"));

        // Languages without an override keep the built-in template
        let cpp = generator
            .generate(&Language::Cpp, "int x = 1;", &[make_test_case(1, 1, true, "assert(x);")])
            .unwrap();
        assert!(cpp.contains("=== Test Results ==="));

        std::fs::remove_dir_all(&dir).ok();
    }
}
