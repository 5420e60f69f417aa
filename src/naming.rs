//! Record identifiers.
//!
//! Every record is named by a value taken from its merged variables (the
//! `id_key`, `id` by default). The identifier doubles as the output filename
//! (`<id>.json`) and as the stem used to look up the record's picture, so it
//! must be safe to use as a path component:
//!
//! - `42` → `"42"`
//! - `"ABC-123"` → `"ABC-123"`
//! - `"  Mr. Mime / Galar "` → `"Mr.-Mime-Galar"`
//!
//! Runs of characters outside `[A-Za-z0-9._-]` collapse into a single dash.
//! Unlike slugs, leading and trailing dashes produced by the replacement are
//! kept: the identifier must stay stable and predictable for the user looking
//! for `pictures/<id>.jpg`.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum NamingError {
    #[error("missing identifier field '{0}'")]
    Missing(String),
    #[error("identifier field '{0}' is empty")]
    Empty(String),
}

static UNSAFE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9._-]+").expect("static regex must compile"));

/// Turn the raw identifier value into a filesystem-safe token.
///
/// `key` is only used for error messages. `None` and JSON `null` both count
/// as missing.
pub fn normalize_id(key: &str, value: Option<&Value>) -> Result<String, NamingError> {
    let raw = match value {
        None | Some(Value::Null) => return Err(NamingError::Missing(key.to_string())),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NamingError::Empty(key.to_string()));
    }
    Ok(UNSAFE_RUN.replace_all(trimmed, "-").into_owned())
}
