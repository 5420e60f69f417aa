//! CLI output formatting for batch runs.
//!
//! Output is **record-centric**: each record leads with its positional index
//! and identifier, with the files involved shown as indented context lines.
//! Paths are displayed relative to a base directory (normally the working
//! directory) when possible.
//!
//! # Output Format
//!
//! ## Generate
//!
//! ```text
//! 001 bulbasaur → out/bulbasaur.json
//!     Source: configs/001.yml
//!     Picture: pictures/bulbasaur.jpg
//!     Sidecar: pictures/bulbasaur.jpg.crop.json (created)
//! 002 ivysaur → out/ivysaur.json
//!     Source: configs/002.yml
//!     Picture: defaults.png (default)
//!     Sidecar: defaults.png.crop.json (unchanged)
//!
//! Aggregate → dist/cards.json
//! Generated 2 records
//! ```
//!
//! ## Check
//!
//! ```text
//! Placeholders
//!     dexStats
//!     name
//!
//! 001 bulbasaur
//!     Source: configs/001.yml
//!     Picture: pictures/bulbasaur.jpg
//!
//! Checked 1 record, nothing written
//! ```
//!
//! Each mode has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout.

use crate::batch::{BatchReport, RecordReport};
use crate::sidecar::{self, ReconcileOutcome};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Path relative to `base` if it lives under it, otherwise as given.
fn display_path(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

/// Context lines shared by both modes: config source and picture.
fn record_context(record: &RecordReport, base: &Path) -> Vec<String> {
    let picture = display_path(&record.picture.path, base);
    vec![
        format!("{}Source: {}", indent(1), display_path(&record.config, base)),
        if record.picture.is_default {
            format!("{}Picture: {} (default)", indent(1), picture)
        } else {
            format!("{}Picture: {}", indent(1), picture)
        },
    ]
}

fn sidecar_line(record: &RecordReport, outcome: ReconcileOutcome, base: &Path) -> String {
    match outcome {
        ReconcileOutcome::NoImages | ReconcileOutcome::NothingToStore => {
            format!("{}Sidecar: {}", indent(1), outcome)
        }
        _ => format!(
            "{}Sidecar: {} ({})",
            indent(1),
            display_path(&sidecar::sidecar_path(&record.picture.path), base),
            outcome
        ),
    }
}

// ============================================================================
// Generate
// ============================================================================

/// Format the result of a generate run.
pub fn format_generate_output(report: &BatchReport, base: &Path) -> Vec<String> {
    let mut lines = Vec::new();

    for (i, record) in report.records.iter().enumerate() {
        match &record.output {
            Some(path) => lines.push(format!(
                "{} {} \u{2192} {}",
                format_index(i + 1),
                record.id,
                display_path(path, base)
            )),
            None => lines.push(format!("{} {}", format_index(i + 1), record.id)),
        }
        lines.extend(record_context(record, base));
        if let Some(outcome) = record.sidecar {
            lines.push(sidecar_line(record, outcome, base));
        }
    }

    lines.push(String::new());
    if let Some(path) = &report.aggregate {
        lines.push(format!("Aggregate \u{2192} {}", display_path(path, base)));
    }
    lines.push(format!("Generated {}", plural(report.records.len(), "record")));
    lines
}

/// Print generate output to stdout.
pub fn print_generate_output(report: &BatchReport, base: &Path) {
    for line in format_generate_output(report, base) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

/// Format the result of a check run: template placeholders, then records.
pub fn format_check_output(report: &BatchReport, base: &Path) -> Vec<String> {
    let mut lines = vec!["Placeholders".to_string()];
    if report.placeholders.is_empty() {
        lines.push(format!("{}(none)", indent(1)));
    }
    for key in &report.placeholders {
        lines.push(format!("{}{}", indent(1), key));
    }
    lines.push(String::new());

    for (i, record) in report.records.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), record.id));
        lines.extend(record_context(record, base));
    }

    lines.push(String::new());
    lines.push(format!(
        "Checked {}, nothing written",
        plural(report.records.len(), "record")
    ));
    lines
}

/// Print check output to stdout.
pub fn print_check_output(report: &BatchReport, base: &Path) {
    for line in format_check_output(report, base) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
