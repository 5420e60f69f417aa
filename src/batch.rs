//! Batch driver: one card per config file.
//!
//! For every config file, in file name order:
//!
//! ```text
//! 1. variables = deep_merge(defaults, config)     config::load_record_variables
//! 2. check required keys                          config::require_keys
//! 3. identifier = normalize(variables[id_key])    naming::normalize_id (must be unique)
//! 4. record = parse(render(template, variables))  template::render_record
//! 5. picture = pictures/<id>.* or default         picture::PictureResolver
//! 6. images[*].src = data URI                     picture::inject_src
//! 7. crop/caption sidecar                         sidecar::reconcile
//! 8. write <out_dir>/<id>.json
//! ```
//!
//! After the last record the aggregate file (a JSON array of every record in
//! order) is written when requested.
//!
//! Any error aborts the batch immediately; records already written stay on
//! disk. Sidecar problems are the exception and never abort (see
//! [`crate::sidecar`]). [`RunMode::Check`] runs steps 1-6 without writing
//! outputs or touching sidecars.

use crate::config::{self, ConfigError, GeneratorConfig};
use crate::naming::{self, NamingError};
use crate::picture::{self, PictureError, PictureResolver, ResolvedPicture};
use crate::sidecar::{self, ReconcileOutcome};
use crate::template::{self, TemplateError};
use crate::tree::lookup_dotted;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{}: {source}", config.display())]
    RecordConfig { config: PathBuf, source: ConfigError },
    #[error("{}: {source}", config.display())]
    Template {
        config: PathBuf,
        source: TemplateError,
    },
    #[error("{}: {source}", config.display())]
    Identifier { config: PathBuf, source: NamingError },
    #[error(
        "duplicate id '{id}' in {} (already used by {})",
        config.display(),
        first.display()
    )]
    DuplicateId {
        id: String,
        config: PathBuf,
        first: PathBuf,
    },
    #[error("{}: {source}", config.display())]
    Picture {
        config: PathBuf,
        source: PictureError,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("no output requested: pass --out-dir and/or --out")]
    NoOutput,
}

impl BatchError {
    /// Process exit code for this error.
    ///
    /// | Code | Meaning |
    /// |------|---------|
    /// | 1 | configuration or output I/O |
    /// | 2 | template rendering / rendered JSON |
    /// | 3 | no picture for a record |
    /// | 4 | missing, empty or duplicate identifier |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::RecordConfig { .. } | Self::Write { .. } | Self::NoOutput => 1,
            Self::Template { .. } => 2,
            Self::Picture { .. } => 3,
            Self::Identifier { .. } | Self::DuplicateId { .. } => 4,
        }
    }
}

/// Whether a run writes anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Render, write outputs, reconcile sidecars.
    Generate,
    /// Validate every record without writing outputs or sidecars.
    Check,
}

/// Inputs of a batch run.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub template: PathBuf,
    pub defaults: Option<PathBuf>,
    pub configs_dir: PathBuf,
    /// Directory for per-record `<id>.json` files.
    pub out_dir: Option<PathBuf>,
    /// Aggregate JSON array of all records.
    pub out_file: Option<PathBuf>,
    pub settings: GeneratorConfig,
    pub mode: RunMode,
}

impl BatchOptions {
    /// Picture directory: the configured one, or `pictures/` next to the
    /// configs directory.
    pub fn pictures_dir(&self) -> PathBuf {
        match &self.settings.pictures_dir {
            Some(dir) => dir.clone(),
            None => self
                .configs_dir
                .parent()
                .unwrap_or(Path::new(""))
                .join("pictures"),
        }
    }
}

/// Outcome of one record.
#[derive(Debug, Clone)]
pub struct RecordReport {
    pub id: String,
    pub config: PathBuf,
    pub picture: ResolvedPicture,
    /// `None` in check mode.
    pub sidecar: Option<ReconcileOutcome>,
    /// Per-record output file, if one was written.
    pub output: Option<PathBuf>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub records: Vec<RecordReport>,
    pub aggregate: Option<PathBuf>,
    /// Placeholder keys found in the template.
    pub placeholders: Vec<String>,
}

/// Write a JSON value pretty-printed (2-space indent, non-ASCII literal),
/// creating parent directories as needed.
pub fn write_json(path: &Path, value: &Value) -> Result<(), BatchError> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json)
    };
    write().map_err(|source| BatchError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn load_template(path: &Path) -> Result<String, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            what: "template",
            path: path.to_path_buf(),
        });
    }
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Run the batch.
pub fn run(options: &BatchOptions) -> Result<BatchReport, BatchError> {
    let writes = options.mode == RunMode::Generate;
    if writes && options.out_dir.is_none() && options.out_file.is_none() {
        return Err(BatchError::NoOutput);
    }

    let template_text = load_template(&options.template)?;
    let defaults = config::load_defaults(options.defaults.as_deref())?;
    let config_files = config::list_config_files(&options.configs_dir)?;
    let placeholders = template::find_placeholders(&template_text);
    tracing::debug!(
        configs = config_files.len(),
        placeholders = placeholders.len(),
        "starting batch"
    );

    let resolver = PictureResolver::new(
        options.pictures_dir(),
        options.defaults.as_deref(),
        options.settings.picture_extensions.clone(),
    );
    tracing::debug!(default_picture = ?resolver.default_picture(), "resolved default picture");

    if writes && let Some(out_dir) = &options.out_dir {
        fs::create_dir_all(out_dir).map_err(|source| BatchError::Write {
            path: out_dir.clone(),
            source,
        })?;
    }

    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    let mut records = Vec::with_capacity(config_files.len());
    let mut aggregate = Vec::new();

    for config_path in &config_files {
        let (report, rendered) =
            process_record(config_path, &template_text, &defaults, &resolver, options, &mut seen)?;
        if options.out_file.is_some() {
            aggregate.push(rendered);
        }
        records.push(report);
    }

    let aggregate_path = match (&options.out_file, writes) {
        (Some(path), true) => {
            write_json(path, &Value::Array(aggregate))?;
            Some(path.clone())
        }
        _ => None,
    };

    Ok(BatchReport {
        records,
        aggregate: aggregate_path,
        placeholders,
    })
}

fn process_record(
    config_path: &Path,
    template_text: &str,
    defaults: &Value,
    resolver: &PictureResolver,
    options: &BatchOptions,
    seen: &mut HashMap<String, PathBuf>,
) -> Result<(RecordReport, Value), BatchError> {
    let settings = &options.settings;
    let record_config = |source: ConfigError| BatchError::RecordConfig {
        config: config_path.to_path_buf(),
        source,
    };

    let variables = config::load_record_variables(defaults, config_path).map_err(record_config)?;
    config::require_keys(&variables, &settings.require_keys).map_err(record_config)?;

    let id = naming::normalize_id(&settings.id_key, lookup_dotted(&variables, &settings.id_key))
        .map_err(|source| BatchError::Identifier {
            config: config_path.to_path_buf(),
            source,
        })?;
    if let Some(first) = seen.get(&id) {
        return Err(BatchError::DuplicateId {
            id,
            config: config_path.to_path_buf(),
            first: first.clone(),
        });
    }
    seen.insert(id.clone(), config_path.to_path_buf());
    tracing::debug!(config = %config_path.display(), %id, "rendering record");

    let rendered = template::render_record(template_text, &variables, settings.strict)
        .map_err(|source| BatchError::Template {
            config: config_path.to_path_buf(),
            source,
        })?;
    let mut rendered = Value::Object(rendered);

    let picture_error = |source: PictureError| BatchError::Picture {
        config: config_path.to_path_buf(),
        source,
    };
    let resolved = resolver.resolve(&id).map_err(picture_error)?;
    let uri = picture::data_uri(&resolved.path).map_err(picture_error)?;
    picture::inject_src(&mut rendered, &uri);

    let (sidecar_outcome, output) = match options.mode {
        RunMode::Check => (None, None),
        RunMode::Generate => {
            let sidecar_file = sidecar::sidecar_path(&resolved.path);
            let outcome = sidecar::reconcile(&mut rendered, &sidecar_file);
            tracing::debug!(%id, sidecar = %sidecar_file.display(), %outcome, "sidecar reconciled");

            let output = match &options.out_dir {
                Some(dir) => {
                    let path = dir.join(format!("{id}.json"));
                    write_json(&path, &rendered)?;
                    Some(path)
                }
                None => None,
            };
            (Some(outcome), output)
        }
    };

    let report = RecordReport {
        id,
        config: config_path.to_path_buf(),
        picture: resolved,
        sidecar: sidecar_outcome,
        output,
    };
    Ok((report, rendered))
}
