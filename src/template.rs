//! Placeholder substitution for JSON templates.
//!
//! A template is JSON text whose values may contain `{{ key }}` placeholders.
//! Keys are dotted paths into the record variables (`{{ stats.hp }}`).
//! Substitution happens on the text, so a placeholder may stand in for a whole
//! JSON value as well as for part of a string:
//!
//! ```text
//! {
//!   "title": "{{name}} #{{id}}",     ← inside a string: value text is escaped
//!   "stats": {{stats}},              ← bare: value is inlined as JSON
//!   "hp": {{stats.hp}}
//! }
//! ```
//!
//! | Value | Inserted as |
//! |-------|-------------|
//! | string | its text (JSON-escaped inside string literals) |
//! | number, bool | its JSON text |
//! | object, array | compact JSON (escaped inside string literals) |
//! | `null` / missing | placeholder left as-is, or an error in strict mode |
//!
//! The rendered text is then parsed; a record that does not parse is a fatal
//! template error carrying a preview of the offending output.

use crate::tree::lookup_dotted;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use thiserror::Error;

/// Characters of rendered output shown when a record fails to parse.
pub const PREVIEW_CHARS: usize = 500;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("missing placeholder value: {0}")]
    MissingPlaceholder(String),
    #[error("JSON parse failed: {source}\nRendered content (first 500 chars):\n{preview}")]
    InvalidJson {
        source: serde_json::Error,
        preview: String,
    },
    #[error("rendered record is not a JSON object")]
    NotAnObject,
}

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z0-9_.-]+)\s*\}\}").expect("static regex must compile")
});

/// Tracks whether a position in JSON text falls inside a string literal.
///
/// Placeholder text never contains quotes or backslashes, so feeding only the
/// literal template text between placeholders keeps the state accurate.
#[derive(Debug, Default)]
struct StringContext {
    in_string: bool,
    escaped: bool,
}

impl StringContext {
    fn feed(&mut self, text: &str) {
        for c in text.chars() {
            if self.escaped {
                self.escaped = false;
            } else if self.in_string && c == '\\' {
                self.escaped = true;
            } else if c == '"' {
                self.in_string = !self.in_string;
            }
        }
    }
}

fn format_value(value: &Value, in_string: bool) -> String {
    let text = match value {
        Value::String(s) if !in_string => return s.clone(),
        Value::String(_) => value.to_string(),
        other if in_string => Value::String(other.to_string()).to_string(),
        other => return other.to_string(),
    };
    // Strip the quotes of the escaped JSON string literal.
    text[1..text.len() - 1].to_string()
}

/// Substitute placeholders in the template text.
///
/// In lenient mode an unresolved placeholder is kept verbatim; in strict mode
/// it is an error.
pub fn render(template: &str, variables: &Value, strict: bool) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut context = StringContext::default();
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        let literal = &template[last..whole.start()];
        context.feed(literal);
        out.push_str(literal);

        let key = &caps[1];
        match lookup_dotted(variables, key).filter(|v| !v.is_null()) {
            Some(value) => out.push_str(&format_value(value, context.in_string)),
            None if strict => return Err(TemplateError::MissingPlaceholder(key.to_string())),
            None => out.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Render a template for one record and parse the result as a JSON object.
pub fn render_record(
    template: &str,
    variables: &Value,
    strict: bool,
) -> Result<Map<String, Value>, TemplateError> {
    let rendered = render(template, variables, strict)?;
    match serde_json::from_str::<Value>(&rendered) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TemplateError::NotAnObject),
        Err(source) => Err(TemplateError::InvalidJson {
            source,
            preview: rendered.chars().take(PREVIEW_CHARS).collect(),
        }),
    }
}

/// All distinct placeholder keys in the template, sorted.
pub fn find_placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
