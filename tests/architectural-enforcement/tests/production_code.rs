//! Production code rules for the courier crates

use architectural_enforcement::{find_violations, production_sources, workspace_root};

fn assert_clean(patterns: &[&str], rule: &str) {
    let sources = production_sources(&workspace_root());
    assert!(!sources.is_empty(), "no courier sources found");

    let violations = find_violations(&sources, patterns);
    assert!(
        violations.is_empty(),
        "{rule}:\n{}",
        violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    );
}

#[test]
fn test_no_blocking_sleep() {
    assert_clean(
        &["thread::sleep"],
        "blocking sleep in async code; use tokio::time::sleep",
    );
}

#[test]
fn test_no_unwrap_or_expect() {
    assert_clean(
        &[".unwrap()", ".expect("],
        "unwrap/expect in production code; propagate the error",
    );
}

#[test]
fn test_no_print_macros() {
    assert_clean(
        &["println!", "eprintln!"],
        "print macro in production code; log through tracing",
    );
}
