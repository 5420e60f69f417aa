//! Picture lookup and inline data-URI encoding.
//!
//! Each record gets exactly one picture:
//!
//! 1. `<pictures_dir>/<id>.<ext>`, trying the configured extensions in order
//!    (`jpg`, `jpeg`, `png`, `webp` by default), then any `<id>.*` file whose
//!    extension matches case-insensitively (`001.JPG`).
//! 2. Otherwise the shared default picture: `<defaults stem>.<ext>` next to the
//!    defaults file (`defaults.yml` → `defaults.jpg`).
//!
//! The chosen file is embedded into every image reference that has a `src`
//! key, as `data:<mime>;base64,<payload>`. The MIME type is sniffed from the
//! file's magic bytes, falling back to the extension and finally to
//! `image/jpeg`. No pixels are decoded.

use crate::tree::for_each_image_ref;
use base64::{Engine as _, engine::general_purpose};
use image::ImageFormat;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PictureError {
    #[error(
        "no picture found for '{id}' in {} and no default picture{}",
        pictures_dir.display(),
        defaults_hint(defaults.as_deref())
    )]
    NotFound {
        id: String,
        pictures_dir: PathBuf,
        defaults: Option<PathBuf>,
    },
    #[error("failed to read picture {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn defaults_hint(defaults: Option<&Path>) -> String {
    match defaults {
        Some(path) => format!(
            " next to {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        ),
        None => " (no defaults file given)".to_string(),
    }
}

/// Find `<dir>/<stem>.<ext>` for the first matching extension.
///
/// Exact-case names are tried first in extension order; then the directory is
/// scanned for `<stem>.<EXT>` with a case-insensitive extension match, in file
/// name order so the result is deterministic.
pub fn find_picture(dir: &Path, stem: &str, extensions: &[String]) -> Option<PathBuf> {
    for ext in extensions {
        let candidate = dir.join(format!("{stem}.{ext}"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let mut matches: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_stem().is_some_and(|s| s == stem)
                && p.extension().is_some_and(|e| {
                    let e = e.to_string_lossy();
                    extensions.iter().any(|ext| ext.eq_ignore_ascii_case(&e))
                })
        })
        .collect();
    matches.sort();
    matches.into_iter().next()
}

/// A picture chosen for a record.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPicture {
    pub path: PathBuf,
    /// True when the record fell back to the shared default picture.
    pub is_default: bool,
}

/// Resolves record identifiers to picture files.
#[derive(Debug, Clone)]
pub struct PictureResolver {
    pictures_dir: PathBuf,
    defaults_file: Option<PathBuf>,
    default_picture: Option<PathBuf>,
    extensions: Vec<String>,
}

impl PictureResolver {
    /// Build a resolver. The default picture is located once, next to the
    /// defaults file and named after its stem.
    pub fn new(pictures_dir: PathBuf, defaults_file: Option<&Path>, extensions: Vec<String>) -> Self {
        let default_picture = defaults_file.and_then(|path| {
            let dir = path.parent().unwrap_or(Path::new("."));
            let stem = path.file_stem()?.to_string_lossy().to_string();
            find_picture(dir, &stem, &extensions)
        });
        Self {
            pictures_dir,
            defaults_file: defaults_file.map(Path::to_path_buf),
            default_picture,
            extensions,
        }
    }

    pub fn default_picture(&self) -> Option<&Path> {
        self.default_picture.as_deref()
    }

    /// Resolve the picture for a record identifier.
    pub fn resolve(&self, id: &str) -> Result<ResolvedPicture, PictureError> {
        if let Some(path) = find_picture(&self.pictures_dir, id, &self.extensions) {
            return Ok(ResolvedPicture {
                path,
                is_default: false,
            });
        }
        match &self.default_picture {
            Some(path) => Ok(ResolvedPicture {
                path: path.clone(),
                is_default: true,
            }),
            None => Err(PictureError::NotFound {
                id: id.to_string(),
                pictures_dir: self.pictures_dir.clone(),
                defaults: self.defaults_file.clone(),
            }),
        }
    }
}

/// MIME type for picture bytes: content sniffing, then extension, then JPEG.
pub fn mime_type(path: &Path, bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .ok()
        .or_else(|| ImageFormat::from_path(path).ok())
        .map(|format| format.to_mime_type())
        .unwrap_or("image/jpeg")
}

/// Encode a picture file as a `data:` URI.
pub fn data_uri(path: &Path) -> Result<String, PictureError> {
    let bytes = fs::read(path).map_err(|source| PictureError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mime = mime_type(path, &bytes);
    let payload = general_purpose::STANDARD.encode(&bytes);
    Ok(format!("data:{mime};base64,{payload}"))
}

/// Overwrite `src` in every image reference that already has one.
///
/// Returns how many references were updated. References without a `src` key
/// are left alone.
pub fn inject_src(tree: &mut Value, uri: &str) -> usize {
    let mut updated = 0;
    for_each_image_ref(tree, |_, image| {
        if let Some(src) = image.get_mut("src") {
            *src = Value::String(uri.to_string());
            updated += 1;
        }
    });
    updated
}
