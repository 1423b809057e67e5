//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No blocking sleep() calls in async production code
//! - No unwrap()/expect() outside tests; errors are propagated
//! - No println!/eprintln! outside tests; output goes through tracing
//!
//! These tests are designed to catch violations early in the development cycle.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// A production source file with its test module stripped
pub struct SourceFile {
    /// Path relative to the workspace root
    pub path: PathBuf,
    /// Code lines before the first `#[cfg(test)]`, comments removed
    pub lines: Vec<(usize, String)>,
}

/// A forbidden pattern found in production code
#[derive(Debug)]
pub struct Violation {
    /// File the pattern was found in
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The offending line
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.path.display(), self.line, self.text.trim())
    }
}

/// Workspace root, two levels above this crate
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Code lines of a file up to its test module, skipping comments
#[must_use]
pub fn production_lines(text: &str) -> Vec<(usize, String)> {
    text.lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .filter(|(_, line)| !line.trim_start().starts_with("//"))
        .map(|(i, line)| (i + 1, line.to_string()))
        .collect()
}

/// All `.rs` files under `src/` directories of the courier crates
#[must_use]
pub fn production_sources(root: &Path) -> Vec<SourceFile> {
    WalkDir::new(root.join("courier"))
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "rs"))
        .filter(|entry| entry.path().components().any(|c| c.as_os_str() == "src"))
        .filter_map(|entry| {
            let text = std::fs::read_to_string(entry.path()).ok()?;
            Some(SourceFile {
                path: entry
                    .path()
                    .strip_prefix(root)
                    .unwrap_or(entry.path())
                    .to_path_buf(),
                lines: production_lines(&text),
            })
        })
        .collect()
}

/// Lines in `sources` containing any of `patterns`
#[must_use]
pub fn find_violations(sources: &[SourceFile], patterns: &[&str]) -> Vec<Violation> {
    sources
        .iter()
        .flat_map(|source| {
            source
                .lines
                .iter()
                .filter(|(_, line)| patterns.iter().any(|p| line.contains(p)))
                .map(|(n, line)| Violation {
                    path: source.path.clone(),
                    line: *n,
                    text: line.clone(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let text = "fn a() {}\n// note .unwrap()\n#[cfg(test)]\nmod tests { x.unwrap(); }\n";
        let lines = production_lines(text);
        assert_eq!(lines, vec![(1, "fn a() {}".to_string())]);
    }

    #[test]
    fn test_find_violations_reports_line() {
        let sources = vec![SourceFile {
            path: PathBuf::from("lib.rs"),
            lines: production_lines("let a = 1;\nlet b = c.unwrap();\n"),
        }];
        let found = find_violations(&sources, &[".unwrap()"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 2);
    }
}
