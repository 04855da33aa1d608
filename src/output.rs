//! CLI output formatting for build and check runs.
//!
//! Logs (`tracing`, stderr) narrate a run as it happens. The summary printed
//! here (stdout) is what is left when the run is over: which keys were
//! published, which were already up to date, and which failed.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! Uploaded (2)
//!     css/site.css
//!     notes/first-post.html
//!
//! Failed (1)
//!     about.html
//!         Error: Failed to put object about.html: access denied
//!
//! Built 4 artifacts: 2 uploaded, 1 unchanged, 1 failed
//! ```
//!
//! Unchanged keys are only counted; listing them would bury the changes on
//! a large site. With uploading disabled the first section reads
//! `Would upload` and the summary counts `would upload`.
//!
//! ## Check
//!
//! ```text
//! 3 documents, 1 stylesheet
//! Undated
//!     about.md
//! ```
//!
//! # Architecture
//!
//! Each run kind has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure and do no I/O.

use crate::build::{BuildReport, CheckReport};

// ============================================================================
// Helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 stylesheet`, `3 stylesheets`.
fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Section header followed by one indented line per key.
fn key_section(lines: &mut Vec<String>, title: &str, keys: &[String]) {
    if keys.is_empty() {
        return;
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!("{} ({})", title, keys.len()));
    for key in keys {
        lines.push(format!("{}{}", indent(1), key));
    }
}

// ============================================================================
// Build output
// ============================================================================

/// Format the summary of a build run.
pub fn format_build_report(report: &BuildReport) -> Vec<String> {
    let mut lines = Vec::new();

    if report.snapshot_degraded {
        lines.push("Remote store unreadable: every artifact was treated as changed".to_string());
    }

    let (title, verb) = if report.dry_run {
        ("Would upload", "would upload")
    } else {
        ("Uploaded", "uploaded")
    };
    key_section(&mut lines, title, &report.uploaded);

    if !report.failed.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(format!("Failed ({})", report.failed.len()));
        for failure in &report.failed {
            lines.push(format!("{}{}", indent(1), failure.key));
            lines.push(format!("{}Error: {}", indent(2), failure.error));
        }
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "Built {}: {} {}, {} unchanged, {} failed",
        plural(report.local_hashes.len(), "artifact"),
        report.uploaded.len(),
        verb,
        report.unchanged.len(),
        report.failed.len()
    ));

    lines
}

/// Print build output to stdout.
pub fn print_build_report(report: &BuildReport) {
    for line in format_build_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Check output
// ============================================================================

/// Format the result of a source check.
pub fn format_check_report(report: &CheckReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{}, {}",
        plural(report.documents, "document"),
        plural(report.stylesheets, "stylesheet")
    )];

    for (title, paths) in [
        ("Undated", &report.undated),
        ("Unterminated front matter", &report.unterminated),
    ] {
        if paths.is_empty() {
            continue;
        }
        lines.push(title.to_string());
        for path in paths {
            lines.push(format!("{}{}", indent(1), path));
        }
    }

    lines
}

/// Print check output to stdout.
pub fn print_check_report(report: &CheckReport) {
    for line in format_check_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
