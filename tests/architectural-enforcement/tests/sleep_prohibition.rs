//! Integration Test: Sleep Prohibition
//!
//! **Policy**: production code in the client crates never sleeps. Timeouts
//! use `tokio::time::timeout`, periodic work uses `tokio::time::interval`,
//! and waiting for another task uses a `CancellationToken`.
//! **Exceptions**: test modules and test-only helpers.

use std::fs;

use architectural_enforcement::{production_lines, rust_files, SOURCE_ROOTS};

#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse instead:");
        eprintln!("  - tokio::time::timeout for bounded waits");
        eprintln!("  - tokio::time::interval for periodic tasks");
        eprintln!("  - CancellationToken::cancelled() to wait on another task");

        panic!("\nFound {} sleep violation(s) in production code", violations.len());
    }
}

fn find_sleep_violations() -> Vec<String> {
    let mut violations = Vec::new();

    for root in SOURCE_ROOTS {
        for path in rust_files(root) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            for (line_number, code) in production_lines(&path, &content) {
                if is_sleep_call(&code) {
                    violations.push(format!(
                        "{}:{} - {}",
                        path.display(),
                        line_number,
                        code.trim()
                    ));
                }
            }
        }
    }

    violations
}

fn is_sleep_call(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(") || code.contains("sleep_until(")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_detection() {
        assert!(is_sleep_call("    tokio::time::sleep(Duration::from_millis(10)).await;"));
        assert!(is_sleep_call("    std::thread::sleep(d);"));
        assert!(!is_sleep_call("    let mut ticker = tokio::time::interval(every);"));
        assert!(!is_sleep_call("    tokio::time::timeout(wait, fut).await"));
    }
}
