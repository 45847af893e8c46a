// Java harness: asserts become throws, each test runs in try/catch (Throwable)

use super::{indent_block, java_like_literal, HarnessTemplate, PreparedSubmission};
use autograder_common::markers::MISSING_POINTS_HINT;
use autograder_common::TestCase;

pub struct JavaHarness;

impl HarnessTemplate for JavaHarness {
    fn key(&self) -> &'static str {
        "java"
    }

    fn template_file(&self) -> &'static str {
        "java_test.java"
    }

    fn builtin_template(&self) -> &'static str {
        include_str!("../../templates/java_test.java")
    }

    /// Moves imports above the harness and drops `public` from top-level
    /// types; only `Main` may be public in the single file
    fn prepare_submission(&self, source: &str) -> PreparedSubmission {
        let mut imports = Vec::new();
        let mut code = Vec::new();
        let mut state = ScanState::default();

        for line in source.lines() {
            let trimmed = line.trim();
            let mut kept = line.to_string();

            if state.depth == 0 && !state.in_block_comment {
                if trimmed.starts_with("import ") && trimmed.ends_with(';') {
                    imports.push(trimmed.to_string());
                    continue;
                }
                if trimmed.starts_with("package ") && trimmed.ends_with(';') {
                    continue;
                }
                if let Some(rest) = trimmed.strip_prefix("public ") {
                    if declares_type(rest) {
                        let indent = &line[..line.len() - line.trim_start().len()];
                        kept = format!("{}{}", indent, rest.trim_start());
                    }
                }
            }

            scan_line(&kept, &mut state);
            code.push(kept);
        }

        PreparedSubmission {
            code: code.join("\n"),
            preamble: imports.join("\n"),
        }
    }

    fn test_execution_code(&self, tests: &[&TestCase]) -> String {
        let mut code = String::new();
        for test in tests {
            let body = rewrite_java_asserts(&test.assertion_code);
            code.push_str(&format!("        // test_case_{}\n", test.id));
            code.push_str("        {\n");
            code.push_str("            java.io.ByteArrayOutputStream __autograderOut = new java.io.ByteArrayOutputStream();\n");
            code.push_str("            java.io.ByteArrayOutputStream __autograderErr = new java.io.ByteArrayOutputStream();\n");
            code.push_str("            System.setOut(new java.io.PrintStream(__autograderOut, true));\n");
            code.push_str("            System.setErr(new java.io.PrintStream(__autograderErr, true));\n");
            code.push_str("            Throwable __autograderFailure = null;\n");
            code.push_str("            try {\n");
            code.push_str(&indent_block(&body, "                "));
            code.push_str("            } catch (Throwable __autograderThrown) {\n");
            code.push_str("                __autograderFailure = __autograderThrown;\n");
            code.push_str("            } finally {\n");
            code.push_str("                System.setOut(REAL_OUT);\n");
            code.push_str("                System.setErr(REAL_ERR);\n");
            code.push_str("            }\n");
            code.push_str(&format!(
                "            reportTest({}, {}, __autograderFailure, __autograderOut.toString(), __autograderErr.toString());\n",
                test.id,
                test.points()
            ));
            code.push_str("        }\n");
        }
        code
    }

    fn missing_points_code(&self, sentinel: &str) -> String {
        format!(
            "        REAL_OUT.println({});\n        REAL_OUT.println({});\n",
            java_like_literal(sentinel),
            java_like_literal(MISSING_POINTS_HINT)
        )
    }
}

#[derive(Debug, Default)]
struct ScanState {
    depth: i32,
    in_block_comment: bool,
}

/// Track brace depth across one line, ignoring literals and comments
fn scan_line(line: &str, state: &mut ScanState) {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let next = chars.get(i + 1).copied();
        if state.in_block_comment {
            if chars[i] == '*' && next == Some('/') {
                state.in_block_comment = false;
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }
        match chars[i] {
            '/' if next == Some('/') => break,
            '/' if next == Some('*') => {
                state.in_block_comment = true;
                i += 2;
                continue;
            }
            '"' | '\'' => {
                i = skip_quoted(&chars, i);
                continue;
            }
            '{' => state.depth += 1,
            '}' => state.depth -= 1,
            _ => {}
        }
        i += 1;
    }
}

/// Index just past the literal starting at `start`
fn skip_quoted(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == '\\' {
            i += 2;
            continue;
        }
        if chars[i] == quote {
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn declares_type(rest: &str) -> bool {
    const MODIFIERS: [&str; 6] = ["abstract", "final", "sealed", "non-sealed", "static", "strictfp"];
    const KINDS: [&str; 5] = ["class", "interface", "enum", "record", "@interface"];

    rest.split_whitespace()
        .find(|word| !MODIFIERS.contains(word))
        .is_some_and(|word| KINDS.contains(&word))
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Rewrite `assert cond;` and `assert cond : msg;` into explicit throws
pub(crate) fn rewrite_java_asserts(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    let mut out = String::with_capacity(code.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c == '"' || c == '\'' {
            let end = skip_quoted(&chars, i);
            out.extend(&chars[i..end]);
            i = end;
            continue;
        }
        if c == '/' && next == Some('/') {
            let end = chars[i..]
                .iter()
                .position(|&ch| ch == '\n')
                .map_or(chars.len(), |p| i + p);
            out.extend(&chars[i..end]);
            i = end;
            continue;
        }

        if is_assert_keyword(&chars, i) {
            let body_start = i + "assert".len();
            if let Some(semi) = find_statement_end(&chars, body_start) {
                let body: String = chars[body_start..semi].iter().collect();
                let (condition, message) = split_assert_message(&body);
                let message = match message {
                    Some(message) => message.trim().to_string(),
                    None => java_like_literal(&format!("Assertion failed: {}", condition.trim())),
                };
                out.push_str(&format!(
                    "if (!({})) {{ throw new AssertionError({}); }}",
                    condition.trim(),
                    message
                ));
                i = semi + 1;
                continue;
            }
        }

        out.push(c);
        i += 1;
    }
    out
}

fn is_assert_keyword(chars: &[char], at: usize) -> bool {
    let keyword = ['a', 's', 's', 'e', 'r', 't'];
    if chars.len() < at + keyword.len() || chars[at..at + keyword.len()] != keyword {
        return false;
    }
    let before_ok = at == 0 || !is_ident_char(chars[at - 1]);
    let after_ok = matches!(chars.get(at + keyword.len()), Some(c) if c.is_whitespace() || *c == '(');
    before_ok && after_ok
}

/// Index of the `;` ending the statement that begins at `start`
fn find_statement_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '"' | '\'' => {
                i = skip_quoted(chars, i);
                continue;
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ';' if depth == 0 => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Split at the top-level `:` that is not part of `?:` or `::`
fn split_assert_message(body: &str) -> (String, Option<String>) {
    let chars: Vec<char> = body.chars().collect();
    let mut depth = 0i32;
    let mut pending_ternaries = 0u32;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '"' | '\'' => {
                i = skip_quoted(&chars, i);
                continue;
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            '?' if depth == 0 => pending_ternaries += 1,
            ':' if depth == 0 => {
                let doubled = chars.get(i + 1) == Some(&':') || (i > 0 && chars[i - 1] == ':');
                if doubled {
                    if chars.get(i + 1) == Some(&':') {
                        i += 2;
                        continue;
                    }
                } else if pending_ternaries > 0 {
                    pending_ternaries -= 1;
                } else {
                    let condition: String = chars[..i].iter().collect();
                    let message: String = chars[i + 1..].iter().collect();
                    return (condition, Some(message));
                }
            }
            _ => {}
        }
        i += 1;
    }
    (body.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::super::HarnessGenerator;
    use super::*;
    use autograder_common::Language;

    #[test]
    fn test_rewrite_simple_assert() {
        assert_eq!(
            rewrite_java_asserts("assert add(2, 3) == 5;"),
            "if (!(add(2, 3) == 5)) { throw new AssertionError(\"Assertion failed: add(2, 3) == 5\"); }"
        );
    }

    #[test]
    fn test_rewrite_assert_with_message() {
        assert_eq!(
            rewrite_java_asserts("assert x > 0 : \"x must be positive: \" + x;"),
            "if (!(x > 0)) { throw new AssertionError(\"x must be positive: \" + x); }"
        );
    }

    #[test]
    fn test_rewrite_ternary_and_method_refs() {
        let out = rewrite_java_asserts("assert (a ? b : c) == d ? true : false : \"msg\";");
        assert!(out.starts_with("if (!((a ? b : c) == d ? true : false))"));
        assert!(out.contains("AssertionError(\"msg\")"));

        let out = rewrite_java_asserts("assert list.stream().map(String::valueOf).count() == 2;");
        assert!(out.contains("if (!(list.stream().map(String::valueOf).count() == 2))"));
    }

    #[test]
    fn test_rewrite_leaves_strings_and_identifiers() {
        let code = "String s = \"assert x;\";\nboolean assertive = true;\n// assert nothing;";
        assert_eq!(rewrite_java_asserts(code), code);
    }

    #[test]
    fn test_prepare_hoists_imports_and_strips_public() {
        let source = "package demo;\nimport java.util.List;\n\npublic class Solution {\n    public static int add(int a, int b) { return a + b; }\n}\npublic final class Other {}\n";
        let prepared = JavaHarness.prepare_submission(source);

        assert_eq!(prepared.preamble, "import java.util.List;");
        assert!(prepared.code.contains("class Solution {"));
        assert!(!prepared.code.contains("public class"));
        assert!(prepared.code.contains("    public static int add"));
        assert!(prepared.code.contains("final class Other {}"));
        assert!(!prepared.code.contains("package demo;"));
    }

    #[test]
    fn test_nested_public_members_are_kept() {
        let source = "class Outer {\n    public class Inner {}\n}\n";
        let prepared = JavaHarness.prepare_submission(source);
        assert!(prepared.code.contains("    public class Inner {}"));
    }

    #[test]
    fn test_generate_java_harness() {
        let generator = HarnessGenerator::new();
        let tests = vec![TestCase::new(1, 10, true, "assert Solution.add(2, 3) == 5;")];
        let source = generator
            .generate(
                &Language::Java,
                "import java.util.*;\npublic class Solution { static int add(int a, int b) { return a + b; } }",
                &tests,
            )
            .unwrap();

        assert!(source.starts_with("import java.util.*;"));
        assert!(source.contains("public class Main {"));
        assert!(source.contains("class Solution"));
        assert!(!source.contains("public class Solution"));
        assert!(source.contains("if (!(Solution.add(2, 3) == 5))"));
        assert!(source.contains("reportTest(1, 10, __autograderFailure"));
        let main_at = source.find("public class Main").unwrap();
        let student_at = source.find("class Solution").unwrap();
        assert!(main_at < student_at);
    }
}
