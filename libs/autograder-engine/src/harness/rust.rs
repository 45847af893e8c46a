// Rust harness: each test inside catch_unwind with a silent panic hook and
// its stdout/stderr redirected to temp files

use super::{indent_block, rewrite_python_asserts, HarnessTemplate, PreparedSubmission};
use autograder_common::markers::MISSING_POINTS_HINT;
use autograder_common::TestCase;

pub struct RustHarness;

impl HarnessTemplate for RustHarness {
    fn key(&self) -> &'static str {
        "rust"
    }

    fn template_file(&self) -> &'static str {
        "rust_test.rs"
    }

    fn builtin_template(&self) -> &'static str {
        include_str!("../../templates/rust_test.rs")
    }

    /// Inner attributes must lead the crate and `main` belongs to the harness
    fn prepare_submission(&self, source: &str) -> PreparedSubmission {
        let mut preamble = Vec::new();
        let mut code = Vec::new();
        for line in source.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("#![") {
                preamble.push(trimmed.to_string());
                continue;
            }
            let renamed = match trimmed.strip_prefix("fn main(") {
                Some(rest) => {
                    let indent = &line[..line.len() - trimmed.len()];
                    format!("{}fn autograder_student_main({}", indent, rest)
                }
                None => line.to_string(),
            };
            code.push(renamed);
        }
        PreparedSubmission {
            code: code.join("\n"),
            preamble: preamble.join("\n"),
        }
    }

    fn test_execution_code(&self, tests: &[&TestCase]) -> String {
        let mut code = String::new();
        for test in tests {
            let body = rewrite_python_asserts(&test.assertion_code, |expr| format!("assert!({});", expr));
            code.push_str(&format!("    // test_case_{}\n", test.id));
            code.push_str("    {\n");
            code.push_str(&format!("        let autograder_capture = AutograderCapture::begin({});\n", test.id));
            code.push_str("        let autograder_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {\n");
            code.push_str(&indent_block(&body, "            "));
            code.push_str("        }));\n");
            code.push_str("        let autograder_output = autograder_capture.map(AutograderCapture::finish).unwrap_or_default();\n");
            code.push_str("        let autograder_failure = match autograder_result {\n");
            code.push_str("            Ok(_) => None,\n");
            code.push_str("            Err(payload) => Some(autograder_panic_message(payload.as_ref())),\n");
            code.push_str("        };\n");
            code.push_str(&format!(
                "        autograder_report(&mut autograder_tally, {}, {}, autograder_failure, autograder_output);\n",
                test.id,
                test.points()
            ));
            code.push_str("    }\n");
        }
        code
    }

    fn missing_points_code(&self, sentinel: &str) -> String {
        format!(
            "    println!(\"{{}}\", {:?});\n    println!(\"{{}}\", {:?});\n",
            sentinel, MISSING_POINTS_HINT
        )
    }
}

#[cfg(test)]
mod tests {
    use super::super::HarnessGenerator;
    use super::*;
    use autograder_common::Language;

    #[test]
    fn test_generate_rust_harness() {
        let generator = HarnessGenerator::new();
        let tests = vec![
            TestCase::new(1, 10, true, "assert_eq!(add(2, 3), 5);"),
            TestCase::new(2, 5, true, "assert add(0, 0) == 0"),
        ];
        let source = generator
            .generate(&Language::Rust, "fn add(a: i32, b: i32) -> i32 { a + b }", &tests)
            .unwrap();

        assert!(source.contains("fn add(a: i32, b: i32)"));
        assert!(source.contains("assert_eq!(add(2, 3), 5);"));
        assert!(source.contains("assert!(add(0, 0) == 0);"));
        assert!(source.contains("std::panic::catch_unwind"));
        assert!(source.contains("autograder_report(&mut autograder_tally, 2, 5, autograder_failure, autograder_output);"));
    }

    #[test]
    fn test_prepare_hoists_inner_attributes_and_renames_main() {
        let prepared = RustHarness.prepare_submission("#![allow(unused)]\nfn add() {}\nfn main() {\n}\n");
        assert_eq!(prepared.preamble, "#![allow(unused)]");
        assert!(prepared.code.contains("fn autograder_student_main() {"));
        assert!(!prepared.code.contains("#![allow(unused)]"));
    }

    #[test]
    fn test_missing_points_code_prints_sentinel() {
        let code = RustHarness.missing_points_code("ERROR: Tests without point markers: test_case_1");
        assert!(code.contains("println!(\"{}\", \"ERROR: Tests without point markers: test_case_1\");"));
    }

    #[test]
    fn test_generated_code_captures_output_per_test() {
        let tests = vec![TestCase::new(3, 5, true, "println!(\"hi\");")];
        let code = RustHarness.test_execution_code(&tests.iter().collect::<Vec<_>>());
        assert!(code.contains("let autograder_capture = AutograderCapture::begin(3);"));
        assert!(code.contains("autograder_capture.map(AutograderCapture::finish)"));
    }

    #[test]
    fn test_hidden_test_output_never_reaches_student() {
        let tests = vec![
            TestCase::new(1, 10, true, "assert_eq!(add(2, 3), 5);"),
            TestCase::new(2, 5, true, "panic!(\"boom\");"),
            TestCase::new(3, 20, false, "println!(\"hi {}\", add(40, 2));\nassert_eq!(add(1, 1), 2);"),
        ];
        let source = HarnessGenerator::new()
            .generate(&Language::Rust, "fn add(a: i32, b: i32) -> i32 { a + b }", &tests)
            .unwrap();
        let Some((stdout, stderr)) = super::super::tests::run_locally(
            "main.rs",
            &source,
            &[&["rustc", "-o", "{dir}/harness", "{file}"], &["{dir}/harness"]],
        ) else {
            return;
        };

        let mut result = crate::parser::ResultParser::parse(&stdout, &stderr);
        assert_eq!(result.total_tests, 3, "stdout: {}\nstderr: {}", stdout, stderr);
        assert!(result.test_case_results[&1].passed);
        assert!(!result.test_case_results[&2].passed);
        assert!(result.test_case_results[&3].passed);
        assert!(stdout.contains("OUTPUT_3: 'hi 42\\n'"));
        assert!(!stdout.lines().any(|line| line == "hi 42"));

        crate::sanitizer::VisibilitySanitizer::sanitize(&tests, &mut result);
        assert!(!result.stdout.contains("hi 42"));
        assert_eq!(result.total_tests, 2);
        assert_eq!(result.earned_points, 10);
    }
}
