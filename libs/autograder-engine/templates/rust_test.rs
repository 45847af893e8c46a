// Autograder harness (marker protocol v{{protocol_version}})
#![allow(dead_code)]
#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(unused_mut)]
{{student_preamble}}

{{student_code}}

struct AutograderTally {
    passed: u32,
    failed: u32,
    earned: u32,
    total_points: u32,
}

fn autograder_py_repr(text: &str) -> String {
    let mut out = String::from("'");
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn autograder_panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("panic")
    }
}

extern "C" {
    fn dup(fd: i32) -> i32;
    fn dup2(src: i32, dst: i32) -> i32;
    fn close(fd: i32) -> i32;
}

/// fd 1 and 2 redirected to temp files for the duration of one test
struct AutograderCapture {
    saved_out: i32,
    saved_err: i32,
    out_path: std::path::PathBuf,
    err_path: std::path::PathBuf,
}

impl AutograderCapture {
    fn begin(id: u32) -> Option<AutograderCapture> {
        use std::io::Write;
        use std::os::unix::io::AsRawFd;
        let dir = std::env::temp_dir();
        let out_path = dir.join(format!("autograder_{}_{}.out", std::process::id(), id));
        let err_path = dir.join(format!("autograder_{}_{}.err", std::process::id(), id));
        let out_file = std::fs::File::create(&out_path).ok()?;
        let err_file = std::fs::File::create(&err_path).ok()?;
        std::io::stdout().flush().ok();
        std::io::stderr().flush().ok();
        unsafe {
            let saved_out = dup(1);
            let saved_err = dup(2);
            if saved_out < 0 || saved_err < 0 {
                if saved_out >= 0 {
                    close(saved_out);
                }
                if saved_err >= 0 {
                    close(saved_err);
                }
                std::fs::remove_file(&out_path).ok();
                std::fs::remove_file(&err_path).ok();
                return None;
            }
            dup2(out_file.as_raw_fd(), 1);
            dup2(err_file.as_raw_fd(), 2);
            Some(AutograderCapture {
                saved_out,
                saved_err,
                out_path,
                err_path,
            })
        }
    }

    fn finish(self) -> (String, String) {
        use std::io::Write;
        std::io::stdout().flush().ok();
        std::io::stderr().flush().ok();
        unsafe {
            dup2(self.saved_out, 1);
            dup2(self.saved_err, 2);
            close(self.saved_out);
            close(self.saved_err);
        }
        let out = std::fs::read_to_string(&self.out_path).unwrap_or_default();
        let err = std::fs::read_to_string(&self.err_path).unwrap_or_default();
        std::fs::remove_file(&self.out_path).ok();
        std::fs::remove_file(&self.err_path).ok();
        (out, err)
    }
}

fn autograder_report(
    tally: &mut AutograderTally,
    id: u32,
    points: u32,
    failure: Option<String>,
    captured: (String, String),
) {
    use std::io::Write;
    tally.total_points = tally.total_points.saturating_add(points);
    match failure {
        None => {
            tally.passed += 1;
            tally.earned = tally.earned.saturating_add(points);
            println!("PASSED: test_case_{}:{}", id, points);
        }
        Some(message) => {
            tally.failed += 1;
            println!("FAILED: test_case_{}:{}", id, points);
            println!("ERROR_{}: {}", id, autograder_py_repr(&message));
        }
    }
    let (out, err) = captured;
    if !out.is_empty() {
        println!("OUTPUT_{}: {}", id, autograder_py_repr(&out));
    }
    if !err.is_empty() {
        println!("STDERR_{}: {}", id, autograder_py_repr(&err));
    }
    std::io::stdout().flush().ok();
}

fn main() {
    std::panic::set_hook(Box::new(|_| {}));
    let mut autograder_tally = AutograderTally {
        passed: 0,
        failed: 0,
        earned: 0,
        total_points: 0,
    };

{{test_execution_code}}
    println!();
    println!("=== Test Results ===");
    println!("Passed: {}", autograder_tally.passed);
    println!("Failed: {}", autograder_tally.failed);
    println!("Total: {}", autograder_tally.passed + autograder_tally.failed);
    println!("Earned: {}", autograder_tally.earned);
    println!("TotalPoints: {}", autograder_tally.total_points);
}
