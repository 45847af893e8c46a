// Python harness: exec'd submission, one try/except BaseException per test

use super::{indent_block, HarnessTemplate, PreparedSubmission};
use autograder_common::TestCase;

pub struct PythonHarness;

impl HarnessTemplate for PythonHarness {
    fn key(&self) -> &'static str {
        "python"
    }

    fn template_file(&self) -> &'static str {
        "python_test.py"
    }

    fn builtin_template(&self) -> &'static str {
        include_str!("../../templates/python_test.py")
    }

    /// The submission becomes a string literal so a syntax error in it
    /// cannot break the harness itself
    fn prepare_submission(&self, source: &str) -> PreparedSubmission {
        PreparedSubmission {
            code: python_string_literal(source),
            preamble: String::new(),
        }
    }

    fn test_execution_code(&self, tests: &[&TestCase]) -> String {
        let mut code = String::new();
        for test in tests {
            let body = if test.assertion_code.trim().is_empty() {
                "        pass\n".to_string()
            } else {
                indent_block(&test.assertion_code, "        ")
            };
            let id = test.id;
            let points = test.points();
            code.push_str(&format!("# test_case_{}\n", id));
            code.push_str("if _submission_loaded:\n");
            code.push_str("    _begin_test()\n");
            code.push_str("    try:\n");
            code.push_str(&body);
            code.push_str("    except BaseException as _exc:\n");
            code.push_str(&format!("        _finish_test({}, {}, _exc)\n", id, points));
            code.push_str("    else:\n");
            code.push_str(&format!("        _finish_test({}, {}, None)\n", id, points));
            code.push_str("else:\n");
            code.push_str(&format!("    _skip_test({}, {})\n\n", id, points));
        }
        code
    }

    fn missing_points_code(&self, sentinel: &str) -> String {
        format!(
            "print({})\nprint({})\n",
            python_string_literal(sentinel),
            python_string_literal(autograder_common::markers::MISSING_POINTS_HINT)
        )
    }
}

/// Single-quoted Python literal; non-ASCII text is kept verbatim
pub(crate) fn python_string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\x{:02x}", c as u32)),
            // Line and paragraph separators end a line for some tooling
            '\u{2028}' | '\u{2029}' => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::super::HarnessGenerator;
    use super::*;
    use autograder_common::Language;

    #[test]
    fn test_string_literal_escaping() {
        assert_eq!(python_string_literal("it's\n"), "'it\\'s\\n'");
        assert_eq!(python_string_literal("a\\b"), "'a\\\\b'");
        assert_eq!(python_string_literal("\u{1}é"), "'\\x01é'");
    }

    #[test]
    fn test_generate_python_harness() {
        let generator = HarnessGenerator::new();
        let tests = vec![
            TestCase::new(1, 10, true, "assert add(2, 3) == 5"),
            TestCase::new(2, 5, true, "result = add(0, 0)\nassert result == 0"),
        ];
        let source = generator
            .generate(&Language::Python, "def add(a, b):\n    return a + b\n", &tests)
            .unwrap();

        assert!(source.contains("'def add(a, b):\\n    return a + b\\n'"));
        assert!(source.contains("        assert add(2, 3) == 5\n"));
        assert!(source.contains("        result = add(0, 0)\n        assert result == 0\n"));
        assert!(source.contains("_finish_test(1, 10, _exc)"));
        assert!(source.contains("_skip_test(2, 5)"));
        assert!(source.contains("=== Test Results ==="));
        assert!(source.contains("print(\"TotalPoints: \" + str(_total_points))"));
        assert!(!source.contains("{{"));
    }

    #[test]
    fn test_indented_assertion_code_is_normalized() {
        let tests = vec![TestCase::new(3, 1, true, "    if True:\n        assert 1 == 1")];
        let code = PythonHarness.test_execution_code(&tests.iter().collect::<Vec<_>>());
        assert!(code.contains("        if True:\n            assert 1 == 1\n"));
    }

    #[test]
    fn test_empty_assertion_becomes_pass() {
        let tests = vec![TestCase::new(4, 1, true, "   ")];
        let code = PythonHarness.test_execution_code(&tests.iter().collect::<Vec<_>>());
        assert!(code.contains("    try:\n        pass\n"));
    }

    #[test]
    fn test_raising_test_does_not_stop_later_tests() {
        let tests = vec![
            TestCase::new(1, 10, true, "assert add(2, 3) == 5"),
            TestCase::new(2, 5, true, "raise ValueError('boom')"),
            TestCase::new(3, 20, true, "print('hi')\nassert add(1, 1) == 2"),
            TestCase::new(4, 1, true, "assert add(1, 1) == 3"),
        ];
        let source = HarnessGenerator::new()
            .generate(&Language::Python, "def add(a, b):\n    return a + b\n", &tests)
            .unwrap();
        let Some((stdout, stderr)) =
            super::super::tests::run_locally("main.py", &source, &[&["python3", "{file}"]])
        else {
            return;
        };

        let result = crate::parser::ResultParser::parse(&stdout, &stderr);
        assert_eq!(result.total_tests, 4, "stdout: {}\nstderr: {}", stdout, stderr);
        assert!(result.test_case_results[&1].passed);
        assert!(!result.test_case_results[&2].passed);
        assert!(result.test_case_results[&2]
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("boom"));
        assert!(result.test_case_results[&3].passed);
        assert!(!result.test_case_results[&4].passed);
        assert_eq!(result.earned_points, 30);
        assert_eq!(result.total_points, 36);
        assert!(!stdout.lines().any(|line| line == "hi"));
    }
}
