// JavaScript-family fallback harness: try/catch per test, console.log markers

use super::{indent_block, java_like_literal, rewrite_call, rewrite_python_asserts, HarnessTemplate};
use autograder_common::markers::MISSING_POINTS_HINT;
use autograder_common::TestCase;

pub struct GenericHarness;

impl HarnessTemplate for GenericHarness {
    fn key(&self) -> &'static str {
        "generic"
    }

    fn template_file(&self) -> &'static str {
        "generic_test.js"
    }

    fn builtin_template(&self) -> &'static str {
        include_str!("../../templates/generic_test.js")
    }

    fn test_execution_code(&self, tests: &[&TestCase]) -> String {
        let mut code = String::new();
        for test in tests {
            let body = rewrite_python_asserts(&test.assertion_code, |expr| format!("__assert({});", expr));
            let body = rewrite_call(&body, "assert", "__assert");
            code.push_str(&format!("// test_case_{}\n", test.id));
            code.push_str(&format!("__autograderRun({}, {}, () => {{\n", test.id, test.points()));
            code.push_str(&indent_block(&body, "    "));
            code.push_str("});\n\n");
        }
        code
    }

    fn missing_points_code(&self, sentinel: &str) -> String {
        format!(
            "__autograderLog({});\n__autograderLog({});\n",
            java_like_literal(sentinel),
            java_like_literal(MISSING_POINTS_HINT)
        )
    }
}
