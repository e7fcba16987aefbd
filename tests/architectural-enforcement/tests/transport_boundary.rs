//! Integration Test: Transport Boundary
//!
//! **Policy**: only `client/core/src/transport/` names `reqwest`. Everything
//! else depends on the `Transport` trait, so sessions, the guard and the
//! download manager run against scripted transports in tests.

use std::fs;

use architectural_enforcement::{production_lines, rust_files, workspace_path, SOURCE_ROOTS};

#[test]
fn test_reqwest_confined_to_transport() {
    let transport_dir = workspace_path("client/core/src/transport");
    let mut violations = Vec::new();

    for root in SOURCE_ROOTS {
        for path in rust_files(root) {
            if path.starts_with(&transport_dir) {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            for (line_number, code) in production_lines(&path, &content) {
                if code.contains("reqwest") {
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

    if !violations.is_empty() {
        for violation in &violations {
            eprintln!("  {violation}");
        }
        panic!(
            "\nFound {} use(s) of reqwest outside the transport module",
            violations.len()
        );
    }
}

#[test]
fn test_transport_module_exists() {
    let files = rust_files("client/core/src/transport");
    assert!(
        files.iter().any(|p| p.ends_with("http.rs")),
        "HTTP transport not found; scan roots are stale"
    );
}
