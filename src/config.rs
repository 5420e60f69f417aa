//! Input loading and generator settings.
//!
//! Two kinds of configuration flow through the generator:
//!
//! - **Record data**: a shared defaults file plus one config file per record.
//!   Each record's variables are `deep_merge(defaults, config)`, so a config
//!   only needs the values that differ from the defaults.
//! - **Generator settings**: how the batch runs (identifier field, required
//!   keys, strict placeholders, picture lookup). Stock defaults are overridden
//!   by an optional `card-gen.toml`, which is overridden by CLI flags.
//!
//! ## Record data formats
//!
//! Defaults and configs may be JSON (`.json`), YAML (`.yml`, `.yaml`) or TOML
//! (`.toml`). The root must be an object; an empty document counts as an empty
//! object.
//!
//! ```text
//! project/
//! ├── template.json
//! ├── defaults.yml          # shared values (optional)
//! ├── defaults.jpg          # shared default picture (optional)
//! ├── configs/
//! │   ├── 001.yml           # one record per file, processed in name order
//! │   └── 002.json
//! └── pictures/
//!     ├── 001.jpg           # picture for record id "001"
//!     └── 001.jpg.crop.json # crop/caption sidecar, written by card-gen
//! ```
//!
//! ## Generator settings file
//!
//! ```toml
//! # All options are optional - defaults shown below
//! id_key = "id"
//! require_keys = []
//! strict = false
//! # pictures_dir = "pictures"   # default: sibling of the configs directory
//! picture_extensions = ["jpg", "jpeg", "png", "webp"]
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::tree::{deep_merge, lookup_dotted};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{what} not found: {}", path.display())]
    NotFound { what: &'static str, path: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON parse error in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("YAML parse error in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("TOML parse error in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("unsupported format: {} (use .json, .yml, .yaml or .toml)", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("{what} must be an object at the root: {}", path.display())]
    NotAnObject { what: &'static str, path: PathBuf },
    #[error("no config files found in {}", .0.display())]
    NoConfigs(PathBuf),
    #[error("missing required keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),
    #[error("config validation error: {0}")]
    Validation(String),
}

/// File extensions accepted for defaults and record configs.
pub const DATA_EXTENSIONS: &[&str] = &["json", "yml", "yaml", "toml"];

/// Name of the generator settings file looked up in the working directory.
pub const SETTINGS_FILENAME: &str = "card-gen.toml";

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// Load a JSON, YAML or TOML document as a JSON value, chosen by extension.
///
/// A document that is empty (or only whitespace) loads as an empty object.
pub fn load_data(path: &Path) -> Result<Value, ConfigError> {
    let ext = extension_of(path);
    if !ext
        .as_deref()
        .is_some_and(|e| DATA_EXTENSIONS.contains(&e))
    {
        return Err(ConfigError::UnsupportedFormat(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match ext.as_deref() {
        Some("json") => serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        }),
        Some("toml") => toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        }),
        _ => serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Require an object root. `null` (e.g. a YAML file containing only `~`)
/// counts as an empty object.
fn into_object(
    value: Value,
    what: &'static str,
    path: &Path,
) -> Result<Map<String, Value>, ConfigError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(ConfigError::NotAnObject {
            what,
            path: path.to_path_buf(),
        }),
    }
}

/// Load the shared defaults layer.
///
/// No defaults file means every record starts from an empty object.
pub fn load_defaults(path: Option<&Path>) -> Result<Value, ConfigError> {
    let Some(path) = path else {
        return Ok(Value::Object(Map::new()));
    };
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            what: "defaults",
            path: path.to_path_buf(),
        });
    }
    let value = load_data(path)?;
    into_object(value, "defaults", path).map(Value::Object)
}

/// List record config files in a directory, sorted by file name.
///
/// Non-recursive. Only files with a [`DATA_EXTENSIONS`] extension are picked
/// up; dotfiles (editor backups, `.DS_Store`) are skipped.
pub fn list_config_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    if !dir.is_dir() {
        return Err(ConfigError::NotFound {
            what: "configs dir",
            path: dir.to_path_buf(),
        });
    }
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Read {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && !p
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with('.'))
                && extension_of(p).is_some_and(|e| DATA_EXTENSIONS.contains(&e.as_str()))
        })
        .collect();

    if files.is_empty() {
        return Err(ConfigError::NoConfigs(dir.to_path_buf()));
    }
    files.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));
    Ok(files)
}

/// Load one record config and merge it on top of the defaults.
pub fn load_record_variables(defaults: &Value, config_path: &Path) -> Result<Value, ConfigError> {
    let value = load_data(config_path)?;
    let config = into_object(value, "config", config_path)?;
    Ok(deep_merge(defaults.clone(), Value::Object(config)))
}

/// Check that every (dotted) key resolves in the merged variables.
///
/// All missing keys are reported at once.
pub fn require_keys(variables: &Value, keys: &[String]) -> Result<(), ConfigError> {
    let missing: Vec<String> = keys
        .iter()
        .filter(|k| lookup_dotted(variables, k).is_none())
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MissingKeys(missing))
    }
}

// =============================================================================
// Generator settings
// =============================================================================

/// Settings controlling a batch run, loaded from `card-gen.toml`.
///
/// All fields have defaults; the settings file only needs the values it wants
/// to change. CLI flags are applied on top by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Variables key holding each record's identifier (dotted keys allowed).
    pub id_key: String,
    /// Keys every merged record must define (dotted keys allowed).
    pub require_keys: Vec<String>,
    /// Fail on placeholders that have no value instead of leaving them as-is.
    pub strict: bool,
    /// Directory holding `<id>.<ext>` pictures. Defaults to a `pictures`
    /// directory next to the configs directory.
    pub pictures_dir: Option<PathBuf>,
    /// Picture extensions tried, in order.
    pub picture_extensions: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            id_key: "id".to_string(),
            require_keys: Vec::new(),
            strict: false,
            pictures_dir: None,
            picture_extensions: ["jpg", "jpeg", "png", "webp"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl GeneratorConfig {
    /// Validate settings are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id_key.trim().is_empty() {
            return Err(ConfigError::Validation("id_key must not be empty".into()));
        }
        if self.picture_extensions.is_empty() {
            return Err(ConfigError::Validation(
                "picture_extensions must not be empty".into(),
            ));
        }
        if let Some(bad) = self
            .picture_extensions
            .iter()
            .find(|e| e.is_empty() || e.starts_with('.'))
        {
            return Err(ConfigError::Validation(format!(
                "picture_extensions entries are bare extensions like \"jpg\", got \"{bad}\""
            )));
        }
        Ok(())
    }
}

/// Merge a settings document on top of the stock defaults, then deserialize
/// and validate.
pub fn resolve_settings(overlay: Option<Value>) -> Result<GeneratorConfig, ConfigError> {
    let base = serde_json::to_value(GeneratorConfig::default())
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    let merged = match overlay {
        Some(ov) => deep_merge(base, ov),
        None => base,
    };
    let config: GeneratorConfig =
        serde_json::from_value(merged).map_err(|e| ConfigError::Validation(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Load generator settings.
///
/// An explicit path must exist. Without one, `card-gen.toml` in the working
/// directory is used when present, otherwise the stock defaults. A relative
/// `pictures_dir` is resolved against the settings file's directory.
pub fn load_settings(explicit: Option<&Path>) -> Result<GeneratorConfig, ConfigError> {
    let path = match explicit {
        Some(p) if !p.is_file() => {
            return Err(ConfigError::NotFound {
                what: "settings file",
                path: p.to_path_buf(),
            });
        }
        Some(p) => Some(p.to_path_buf()),
        None => Some(PathBuf::from(SETTINGS_FILENAME)).filter(|p| p.is_file()),
    };
    let Some(path) = path else {
        return resolve_settings(None);
    };

    let overlay = load_data(&path)?;
    let overlay = into_object(overlay, "settings", &path)?;
    let mut config = resolve_settings(Some(Value::Object(overlay)))?;
    if let Some(dir) = config.pictures_dir.take() {
        let base = path.parent().unwrap_or(Path::new(""));
        config.pictures_dir = Some(if dir.is_relative() {
            base.join(dir)
        } else {
            dir
        });
    }
    Ok(config)
}

/// Returns a fully-commented stock `card-gen.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# card-gen Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Command-line flags override them.
#
# card-gen reads this file from the working directory, or from the path
# given with --config. Unknown keys will cause an error.

# Variables key holding the record identifier. The identifier names the
# output file (<id>.json) and the record's picture (pictures/<id>.jpg).
# Dotted keys like "meta.code" are allowed.
id_key = "id"

# Keys every record must define after merging with the defaults.
# Dotted keys are allowed, e.g. ["name", "stats.hp"].
require_keys = []

# Fail when a {{placeholder}} has no value. When false, unresolved
# placeholders are left in the output unchanged.
strict = false

# ---------------------------------------------------------------------------
# Pictures
# ---------------------------------------------------------------------------
# Directory holding <id>.<ext> pictures, relative to this file.
# Default: a "pictures" directory next to the configs directory.
# pictures_dir = "pictures"

# Extensions tried, in order, when looking up a record's picture and the
# shared default picture next to the defaults file.
picture_extensions = ["jpg", "jpeg", "png", "webp"]
"##
}
