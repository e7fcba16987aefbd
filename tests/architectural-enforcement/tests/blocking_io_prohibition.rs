//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async functions in the client crates never block the runtime.
//! **Required**: HTTP through the async `reqwest` client; file and network
//! access only from synchronous functions such as config loading, which
//! runs before any stream is opened.

use std::fs;

use architectural_enforcement::{enclosing_fn, production_lines, rust_files, SOURCE_ROOTS};

#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = find_blocking_io_violations();

    if !violations.is_empty() {
        eprintln!("\nBlocking I/O found in async code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nForbidden inside async fn:");
        eprintln!("  - std::fs::*, std::net::*, std::process::Command");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("  - std::io::stdin()");

        panic!("\nFound {} blocking I/O violation(s)", violations.len());
    }
}

#[test]
fn test_no_blocking_http_client_anywhere() {
    let mut violations = Vec::new();

    for root in SOURCE_ROOTS {
        for path in rust_files(root) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            for (line_number, code) in production_lines(&path, &content) {
                if code.contains("reqwest::blocking") {
                    violations.push(format!("{}:{}", path.display(), line_number));
                }
            }
        }
    }

    assert!(violations.is_empty(), "reqwest::blocking used at {violations:?}");
}

fn find_blocking_io_violations() -> Vec<String> {
    let mut violations = Vec::new();

    for root in SOURCE_ROOTS {
        for path in rust_files(root) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            let lines = production_lines(&path, &content);
            for (idx, (line_number, code)) in lines.iter().enumerate() {
                let Some(kind) = blocking_kind(code) else {
                    continue;
                };
                if !is_in_async_fn(&lines, idx) {
                    continue;
                }
                violations.push(format!(
                    "{}:{} - {}: {}",
                    path.display(),
                    line_number,
                    kind,
                    code.trim()
                ));
            }
        }
    }

    violations
}

fn blocking_kind(code: &str) -> Option<&'static str> {
    if code.contains("std::fs::") {
        Some("Blocking file I/O")
    } else if code.contains("std::net::") {
        Some("Blocking network I/O")
    } else if code.contains("std::process::Command") {
        Some("Blocking process I/O")
    } else if code.contains("std::io::stdin()") {
        Some("Blocking stdin")
    } else {
        None
    }
}

fn is_in_async_fn(lines: &[(usize, String)], idx: usize) -> bool {
    enclosing_fn(lines, idx).is_some_and(|signature| signature.contains("async fn "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_blocking_io_in_async_fn_detected() {
        let lines = production_lines(
            Path::new("x.rs"),
            "pub async fn load() {\n    let s = std::fs::read_to_string(\"a\");\n}\n",
        );
        assert_eq!(blocking_kind(&lines[1].1), Some("Blocking file I/O"));
        assert!(is_in_async_fn(&lines, 1));
    }

    #[test]
    fn test_sync_config_loading_allowed() {
        let lines = production_lines(
            Path::new("x.rs"),
            "pub fn load_config() {\n    let s = std::fs::read_to_string(\"a\");\n}\n",
        );
        assert!(!is_in_async_fn(&lines, 1));
    }
}
