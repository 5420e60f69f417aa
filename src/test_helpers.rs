//! Shared test utilities for the card-gen test suite.
//!
//! [`Project`] builds a throwaway project layout in a temp directory:
//!
//! ```text
//! <tmp>/
//!   template.json
//!   defaults.yml        (optional)
//!   configs/
//!   pictures/
//!   out/                (created by the batch)
//! ```
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let project = Project::with_card_template();
//! project.config("001.yml", "id: 1\nname: Bulbasaur\n");
//! project.picture("1.jpg");
//!
//! let report = run(&project.options()).unwrap();
//! assert_eq!(record_ids(&report), vec!["1"]);
//! assert_eq!(project.read_output("1")["name"], "Bulbasaur");
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::batch::{BatchOptions, BatchReport, RunMode};
use crate::config::GeneratorConfig;
use serde_json::Value;

/// Template used by most batch tests. Every bare placeholder is covered by
/// the baseline defaults written by [`Project::with_card_template`].
pub const CARD_TEMPLATE: &str = r#"{
  "id": "{{id}}",
  "name": "{{name}}",
  "dexStats": "{{dexStats}}",
  "stats": {{stats}},
  "images": [{"src": "", "alt": "{{name}}"}]
}"#;

const BASELINE_DEFAULTS: &str = "dexStats: ''\nstats:\n  hp: 1\n  attack: 1\n";

// =========================================================================
// Fixture setup
// =========================================================================

/// A temp project directory. Dropped with the test.
pub struct Project {
    tmp: TempDir,
}

impl Project {
    /// Empty project with the given template text.
    pub fn new(template: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("configs")).unwrap();
        fs::create_dir_all(tmp.path().join("pictures")).unwrap();
        fs::write(tmp.path().join("template.json"), template).unwrap();
        Self { tmp }
    }

    /// Project with [`CARD_TEMPLATE`] and baseline defaults.
    pub fn with_card_template() -> Self {
        let project = Self::new(CARD_TEMPLATE);
        project.defaults(BASELINE_DEFAULTS);
        project
    }

    /// Absolute path of a project-relative file.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.tmp.path().join(rel)
    }

    /// Write a project-relative file, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) {
        write_file(&self.path(rel), contents.as_bytes());
    }

    /// Write (or replace) `defaults.yml`.
    pub fn defaults(&self, contents: &str) {
        self.write("defaults.yml", contents);
    }

    /// Write a record config into `configs/`.
    pub fn config(&self, name: &str, contents: &str) {
        self.write(&format!("configs/{name}"), contents);
    }

    /// Write a small picture into `pictures/`.
    pub fn picture(&self, name: &str) {
        write_file(&self.path(&format!("pictures/{name}")), &picture_bytes(name));
    }

    /// Write the default picture next to `defaults.yml`.
    pub fn default_picture(&self, name: &str) {
        write_file(&self.path(name), &picture_bytes(name));
    }

    /// Options for a generate run writing into `out/`.
    pub fn options(&self) -> BatchOptions {
        let defaults = self.path("defaults.yml");
        BatchOptions {
            template: self.path("template.json"),
            defaults: defaults.is_file().then_some(defaults),
            configs_dir: self.path("configs"),
            out_dir: Some(self.path("out")),
            out_file: None,
            settings: GeneratorConfig {
                pictures_dir: Some(self.path("pictures")),
                ..GeneratorConfig::default()
            },
            mode: RunMode::Generate,
        }
    }

    pub fn read_text(&self, rel: &str) -> String {
        let path = self.path(rel);
        fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()))
    }

    /// Raw text of `out/<id>.json`.
    pub fn read_output_text(&self, id: &str) -> String {
        self.read_text(&format!("out/{id}.json"))
    }

    /// Parsed `out/<id>.json`.
    pub fn read_output(&self, id: &str) -> Value {
        read_json(&self.path(&format!("out/{id}.json")))
    }
}

fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
}

/// Magic bytes matching the file extension, padded with a marker so that
/// different pictures produce different data URIs.
fn picture_bytes(name: &str) -> Vec<u8> {
    let ext = name.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    let mut bytes: Vec<u8> = match ext.as_str() {
        "png" => b"\x89PNG\r\n\x1a\n".to_vec(),
        "webp" => b"RIFF\x00\x00\x00\x00WEBPVP8 ".to_vec(),
        _ => b"\xff\xd8\xff\xe0".to_vec(),
    };
    bytes.extend_from_slice(name.as_bytes());
    bytes
}

// =========================================================================
// Lookups (panic with a clear message on miss)
// =========================================================================

/// Parse a JSON file. Panics if unreadable or malformed.
pub fn read_json(path: &Path) -> Value {
    let text =
        fs::read_to_string(path).unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("bad JSON in {}: {e}", path.display()))
}

/// Record identifiers in batch order.
pub fn record_ids(report: &BatchReport) -> Vec<&str> {
    report.records.iter().map(|r| r.id.as_str()).collect()
}

/// Find a record report by identifier. Panics if not found.
pub fn find_record<'a>(report: &'a BatchReport, id: &str) -> &'a crate::batch::RecordReport {
    report
        .records
        .iter()
        .find(|r| r.id == id)
        .unwrap_or_else(|| {
            let ids = record_ids(report);
            panic!("record '{id}' not found. Available: {ids:?}")
        })
}
