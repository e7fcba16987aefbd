//! Architectural Enforcement Integration Tests
//!
//! Source scans over the docchat client crates that keep three rules from
//! eroding:
//! - No sleeping in production code; waits are on I/O, timers or tokens
//! - No blocking I/O inside async functions
//! - Only the transport module talks HTTP
//!
//! The scans live in `tests/`; this library only anchors the package.

use std::path::{Path, PathBuf};

/// Production source roots, relative to the workspace root
pub const SOURCE_ROOTS: &[&str] = &["client/core/src", "client/cli/src"];

/// Absolute path of a directory under the workspace root
#[must_use]
pub fn workspace_path(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join(relative)
}

/// Production lines of a source file: everything before its `mod tests`,
/// with line comments stripped. Test-only files yield nothing.
#[must_use]
pub fn production_lines(path: &Path, content: &str) -> Vec<(usize, String)> {
    if path.file_name().and_then(|n| n.to_str()) == Some("test_utils.rs") {
        return Vec::new();
    }

    content
        .lines()
        .take_while(|line| !line.trim_start().starts_with("mod tests"))
        .enumerate()
        .map(|(idx, line)| {
            let code = line.split("//").next().unwrap_or(line);
            (idx + 1, code.to_string())
        })
        .collect()
}

/// All `.rs` files under the given workspace-relative root
#[must_use]
pub fn rust_files(relative_root: &str) -> Vec<PathBuf> {
    let root = workspace_path(relative_root);
    if !root.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Signature of the function enclosing `current_idx`, if any
#[must_use]
pub fn enclosing_fn<'a>(lines: &'a [(usize, String)], current_idx: usize) -> Option<&'a str> {
    lines[..=current_idx]
        .iter()
        .rev()
        .map(|(_, line)| line.trim())
        .find(|line| is_fn_signature(line))
}

fn is_fn_signature(line: &str) -> bool {
    let rest = line
        .trim_start_matches("pub(crate) ")
        .trim_start_matches("pub ")
        .trim_start_matches("async ");
    rest.starts_with("fn ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let src = "fn a() {}\n#[cfg(test)]\nmod tests {\n    fn b() {}\n}\n";
        let lines = production_lines(Path::new("x.rs"), src);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_test_utils_declaration_does_not_stop_scan() {
        let src = "#[cfg(test)]\npub(crate) mod test_utils;\npub use x::Y;\n";
        let lines = production_lines(Path::new("lib.rs"), src);
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_comments_are_stripped() {
        let lines = production_lines(Path::new("x.rs"), "let a = 1; // std::fs::read\n");
        assert!(!lines[0].1.contains("std::fs"));
    }

    #[test]
    fn test_enclosing_fn_detection() {
        let lines = production_lines(
            Path::new("x.rs"),
            "pub async fn load() {\n    let x = 1;\n}\nfn sync() {\n    let y = 2;\n}\n",
        );
        assert_eq!(enclosing_fn(&lines, 1), Some("pub async fn load() {"));
        assert_eq!(enclosing_fn(&lines, 4), Some("fn sync() {"));
    }
}
