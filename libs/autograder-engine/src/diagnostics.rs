// Crude error-line extraction from compiler and runtime output

const EXCERPT_MAX_LINES: usize = 20;
const EXCERPT_MAX_CHARS: usize = 2000;

/// First line that looks like an error report
pub fn first_error_line(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    // Python tracebacks end with the exception line, so look for named errors from the bottom
    if let Some(line) = lines.iter().rev().find(|line| is_named_error(line)) {
        return Some(line.to_string());
    }

    lines
        .iter()
        .find(|line| {
            let lower = line.to_ascii_lowercase();
            lower.starts_with("error")
                || lower.contains(": error:")
                || lower.contains(" error:")
                || line.contains("panicked at")
                || line.starts_with("Exception in thread")
                || line.starts_with("terminate called")
        })
        .map(|line| line.to_string())
}

/// `NameError: ...`, `java.lang.ArithmeticException: ...`
fn is_named_error(line: &str) -> bool {
    let Some((name, _)) = line.split_once(':') else {
        return false;
    };
    let simple = name.rsplit('.').next().unwrap_or(name);
    let starts_upper = simple.chars().next().is_some_and(|c| c.is_ascii_uppercase());
    starts_upper
        && simple.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && (simple.ends_with("Error") || simple.ends_with("Exception"))
}

/// Leading portion of `text`, bounded in lines and characters
pub fn excerpt(text: &str) -> String {
    let mut out = String::new();
    for (i, line) in text.trim().lines().enumerate() {
        if i >= EXCERPT_MAX_LINES {
            out.push_str("\n...");
            break;
        }
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line);
    }
    if out.chars().count() > EXCERPT_MAX_CHARS {
        let truncated: String = out.chars().take(EXCERPT_MAX_CHARS).collect();
        return format!("{}...", truncated);
    }
    out
}

/// Student-facing compiler message: the first error line, then an excerpt
pub fn compile_message(compile_stderr: &str, compile_stdout: &str) -> String {
    let text = if compile_stderr.trim().is_empty() {
        compile_stdout
    } else {
        compile_stderr
    };
    let body = excerpt(text);
    match first_error_line(text) {
        Some(first) if !body.starts_with(&first) => format!("Compilation error: {}\n{}", first, body),
        Some(_) => format!("Compilation error:\n{}", body),
        None if body.is_empty() => "Compilation error".to_string(),
        None => format!("Compilation error:\n{}", body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_traceback_uses_last_exception_line() {
        let stderr = "Traceback (most recent call last):\n  File \"main.py\", line 3, in <module>\n    foo()\nNameError: name 'foo' is not defined\n";
        assert_eq!(
            first_error_line(stderr),
            Some("NameError: name 'foo' is not defined".to_string())
        );
    }

    #[test]
    fn test_compiler_error_lines() {
        let java = "Main.java:12: error: ';' expected\n        int x = 1\n                 ^\n1 error\n";
        assert_eq!(first_error_line(java), Some("Main.java:12: error: ';' expected".to_string()));

        let rust = "error[E0425]: cannot find value `x` in this scope\n --> main.rs:2:5\n";
        assert_eq!(
            first_error_line(rust),
            Some("error[E0425]: cannot find value `x` in this scope".to_string())
        );

        let cpp = "main.cpp:3:5: error: 'foo' was not declared in this scope\n";
        assert!(first_error_line(cpp).unwrap().contains("'foo' was not declared"));
    }

    #[test]
    fn test_java_exception_names() {
        let stderr = "Exception in thread \"main\" java.lang.ArithmeticException: / by zero\n\tat Main.main(Main.java:5)";
        assert_eq!(
            first_error_line(stderr),
            Some("Exception in thread \"main\" java.lang.ArithmeticException: / by zero".to_string())
        );
        assert!(is_named_error("java.lang.NullPointerException: boom"));
        assert!(!is_named_error("Note: this is fine"));
    }

    #[test]
    fn test_no_error_line() {
        assert_eq!(first_error_line("all good\n"), None);
        assert_eq!(compile_message("", ""), "Compilation error");
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let long: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        let out = excerpt(&long);
        assert_eq!(out.lines().count(), 21);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_compile_message_names_first_error() {
        let message = compile_message("warning: unused\nmain.cpp:1:1: error: expected ';'\n", "");
        assert!(message.starts_with("Compilation error: main.cpp:1:1: error: expected ';'"));
        assert!(message.contains("warning: unused"));
    }
}
