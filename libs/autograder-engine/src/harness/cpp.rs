// C++ harness: assert( becomes a throwing test_assert(, cout/cerr redirected per test

use super::{indent_block, rewrite_call, HarnessTemplate, PreparedSubmission};
use autograder_common::markers::MISSING_POINTS_HINT;
use autograder_common::TestCase;

pub struct CppHarness;

impl HarnessTemplate for CppHarness {
    fn key(&self) -> &'static str {
        "cpp"
    }

    fn template_file(&self) -> &'static str {
        "cpp_test.cpp"
    }

    fn builtin_template(&self) -> &'static str {
        include_str!("../../templates/cpp_test.cpp")
    }

    /// A student `main` would clash with the harness entry point
    fn prepare_submission(&self, source: &str) -> PreparedSubmission {
        let code = source
            .lines()
            .map(|line| {
                let trimmed = line.trim_start();
                match trimmed.strip_prefix("int main(") {
                    Some(rest) => {
                        let indent = &line[..line.len() - trimmed.len()];
                        format!("{}int autograder_student_main({}", indent, rest)
                    }
                    None => line.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        PreparedSubmission {
            code,
            preamble: String::new(),
        }
    }

    fn test_execution_code(&self, tests: &[&TestCase]) -> String {
        let mut code = String::new();
        for test in tests {
            let body = rewrite_call(&test.assertion_code, "assert", "test_assert");
            code.push_str(&format!("    // test_case_{}\n", test.id));
            code.push_str("    {\n");
            code.push_str("        std::ostringstream autograder_out;\n");
            code.push_str("        std::ostringstream autograder_err;\n");
            code.push_str("        std::cout.rdbuf(autograder_out.rdbuf());\n");
            code.push_str("        std::cerr.rdbuf(autograder_err.rdbuf());\n");
            code.push_str("        bool autograder_ok = true;\n");
            code.push_str("        std::string autograder_error;\n");
            code.push_str("        try {\n");
            code.push_str(&indent_block(&body, "            "));
            code.push_str("        } catch (const std::exception& e) {\n");
            code.push_str("            autograder_ok = false;\n");
            code.push_str("            autograder_error = e.what();\n");
            code.push_str("        } catch (...) {\n");
            code.push_str("            autograder_ok = false;\n");
            code.push_str("            autograder_error = \"Unknown exception\";\n");
            code.push_str("        }\n");
            code.push_str("        std::cout.rdbuf(autograder_real_out);\n");
            code.push_str("        std::cerr.rdbuf(autograder_real_err);\n");
            code.push_str(&format!(
                "        autograder_report({}, {}, autograder_ok, autograder_error, autograder_out.str(), autograder_err.str());\n",
                test.id,
                test.points()
            ));
            code.push_str("    }\n");
        }
        code
    }

    fn missing_points_code(&self, sentinel: &str) -> String {
        // Both strings are plain ASCII without quotes or backslashes
        format!(
            "    std::cout << \"{}\" << std::endl;\n    std::cout << \"{}\" << std::endl;\n",
            sentinel, MISSING_POINTS_HINT
        )
    }
}
