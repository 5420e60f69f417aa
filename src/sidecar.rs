//! Crop/caption sidecars: stable image metadata across regenerations.
//!
//! Card pictures are framed in an external editor that stores its crop state
//! (`croppedArea`, `zoom`, ...) in the generated card. Regenerating the cards
//! from the template would throw those edits away, so each picture gets a
//! small JSON sidecar that outlives the generated output:
//!
//! ```text
//! pictures/
//! ├── 025.jpg
//! └── 025.jpg.crop.json   {"croppedArea": {...}, "zoom": 1.4, "dexStats": "..."}
//! ```
//!
//! ## Rules
//!
//! - **Sidecar wins.** Every crop key stored in the sidecar is applied to every
//!   image reference of the record, and a stored `dexStats` caption replaces
//!   the rendered one.
//! - **Template fills gaps.** Crop keys the sidecar does not have yet are
//!   copied from the record's *first* image reference; a missing caption is
//!   copied from the record's top-level `dexStats`. Existing keys are never
//!   overwritten. Backfilled keys only reach the sidecar; the record keeps
//!   its rendered values for them until the next run.
//! - **First run creates.** Without a sidecar (or with one that does not parse
//!   as an object) the template-derived values are written as a new sidecar
//!   and the record is left as rendered. Nothing is written when there is
//!   nothing to store.
//! - **No images, no sidecar.** Records without image references are left
//!   alone.
//!
//! A caption counts as present only when it is a string that is non-empty
//! after trimming, both in the sidecar and in the record.
//!
//! Sidecar I/O failures are logged and swallowed: a sidecar is a convenience,
//! and losing one must not abort a batch. The sidecar is re-read from disk on
//! every call, so records sharing a picture (typically the default picture)
//! see each other's writes within a run.
//!
//! ## Naming
//!
//! The sidecar is named after the picture's full file name
//! (`025.jpg.crop.json`), so `025.jpg` and `025.png` never share state. Sidecars
//! from older generators named after the stem (`025.crop.json`) are adopted
//! when the full-name sidecar does not exist yet; the legacy file is left in
//! place.

use crate::tree::{first_image_ref, for_each_image_ref};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Keys describing image framing, passed through opaquely.
pub const CROP_KEYS: &[&str] = &[
    "croppedArea",
    "croppedAreaPixels",
    "crop",
    "zoom",
    "rotation",
    "aspect",
];

/// Top-level caption key kept stable by the sidecar.
pub const CAPTION_KEY: &str = "dexStats";

const SIDECAR_SUFFIX: &str = ".crop.json";

/// Sidecar path for a picture: `<dir>/<file name>.crop.json`.
pub fn sidecar_path(picture: &Path) -> PathBuf {
    let name = picture.file_name().unwrap_or_default().to_string_lossy();
    picture.with_file_name(format!("{name}{SIDECAR_SUFFIX}"))
}

/// Stem-named sidecar written by older generators: `<dir>/<stem>.crop.json`.
pub fn legacy_sidecar_path(picture: &Path) -> PathBuf {
    let stem = picture.file_stem().unwrap_or_default().to_string_lossy();
    picture.with_file_name(format!("{stem}{SIDECAR_SUFFIX}"))
}

/// A caption value, if it is a non-blank string.
fn caption(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// What happened to the sidecar while reconciling a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The record has no image references; the sidecar was not consulted.
    NoImages,
    /// A new sidecar was written from template-derived values.
    Created,
    /// The existing sidecar gained keys it did not have.
    Updated,
    /// The existing sidecar already had everything.
    Unchanged,
    /// No sidecar exists and the record had nothing worth storing.
    NothingToStore,
    /// Writing the sidecar failed; the record keeps the values it had.
    WriteFailed,
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NoImages => "no images",
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::NothingToStore => "nothing to store",
            Self::WriteFailed => "write failed",
        };
        f.write_str(label)
    }
}

/// Sidecar contents as loaded from disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sidecar {
    fields: Map<String, Value>,
}

impl Sidecar {
    /// Load a sidecar object.
    ///
    /// Returns `None` when the file is missing, unreadable, or not a JSON
    /// object; the caller then starts from an empty sidecar.
    pub fn load(path: &Path) -> Option<Self> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable sidecar, ignoring");
                return None;
            }
        };
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(fields)) => Some(Self { fields }),
            Ok(_) => {
                tracing::warn!(path = %path.display(), "sidecar is not a JSON object, ignoring");
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed sidecar, ignoring");
                None
            }
        }
    }

    /// Write the sidecar as pretty-printed UTF-8 JSON (2-space indent,
    /// non-ASCII kept literally).
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(&self.fields)?;
        fs::write(path, json)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Stored crop keys, in [`CROP_KEYS`] order.
    pub fn crop_params(&self) -> Vec<(&'static str, &Value)> {
        CROP_KEYS
            .iter()
            .filter_map(|&key| self.fields.get(key).map(|v| (key, v)))
            .collect()
    }

    /// Stored caption, if non-blank.
    pub fn caption(&self) -> Option<&str> {
        caption(self.fields.get(CAPTION_KEY))
    }

    /// Add template-derived values for keys the sidecar does not have yet.
    ///
    /// Crop keys come from `image` (the record's first image reference), the
    /// caption from `record_caption`. Returns true when anything was added.
    pub fn backfill(&mut self, image: &Map<String, Value>, record_caption: Option<&str>) -> bool {
        let mut changed = false;
        for &key in CROP_KEYS {
            if let Some(value) = image.get(key)
                && !self.fields.contains_key(key)
            {
                self.fields.insert(key.to_string(), value.clone());
                changed = true;
            }
        }
        if self.caption().is_none()
            && let Some(text) = record_caption
        {
            self.fields
                .insert(CAPTION_KEY.to_string(), Value::String(text.to_string()));
            changed = true;
        }
        changed
    }

    /// Apply stored values onto a rendered record: crop keys to every image
    /// reference, caption to the top level.
    pub fn apply(&self, record: &mut Value) {
        let params: Vec<(&str, Value)> = self
            .crop_params()
            .into_iter()
            .map(|(k, v)| (k, v.clone()))
            .collect();
        if !params.is_empty() {
            for_each_image_ref(record, |_, image| {
                for (key, value) in &params {
                    image.insert(key.to_string(), value.clone());
                }
            });
        }
        if let (Some(text), Value::Object(map)) = (self.caption(), &mut *record) {
            map.insert(CAPTION_KEY.to_string(), Value::String(text.to_string()));
        }
    }
}

/// Reconcile a rendered record with the sidecar of its picture.
///
/// Mutates `record` so its image references carry the stable crop values and
/// caption, and updates `sidecar` on disk with any newly discovered keys.
/// Never fails; see the [module docs](self) for the rules.
pub fn reconcile(record: &mut Value, sidecar: &Path) -> ReconcileOutcome {
    let Some(first_image) = first_image_ref(record) else {
        return ReconcileOutcome::NoImages;
    };
    let record_caption = caption(record.get(CAPTION_KEY)).map(str::to_string);

    let current = Sidecar::load(sidecar);
    let had_sidecar = current.is_some();
    let existing = current.or_else(|| adopt_legacy(sidecar));

    // Only values stored before this call reach the record; backfilled keys
    // go to the sidecar alone.
    if let Some(stored) = &existing {
        stored.apply(record);
    }
    let mut stored = existing.unwrap_or_default();
    let changed = stored.backfill(&first_image, record_caption.as_deref());

    if !changed && had_sidecar {
        return ReconcileOutcome::Unchanged;
    }
    if stored.is_empty() {
        return ReconcileOutcome::NothingToStore;
    }
    match stored.save(sidecar) {
        Ok(()) if had_sidecar => ReconcileOutcome::Updated,
        Ok(()) => ReconcileOutcome::Created,
        Err(e) => {
            tracing::warn!(path = %sidecar.display(), error = %e, "failed to write sidecar");
            ReconcileOutcome::WriteFailed
        }
    }
}

/// Load a stem-named sidecar for the picture `sidecar` belongs to, if any.
fn adopt_legacy(sidecar: &Path) -> Option<Sidecar> {
    let name = sidecar.file_name()?.to_string_lossy();
    let picture = sidecar.with_file_name(name.strip_suffix(SIDECAR_SUFFIX)?);
    let legacy = legacy_sidecar_path(&picture);
    if legacy == sidecar {
        return None;
    }
    let adopted = Sidecar::load(&legacy)?;
    tracing::info!(
        legacy = %legacy.display(),
        path = %sidecar.display(),
        "adopting legacy sidecar"
    );
    Some(adopted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    fn card(zoom: f64, rotation: i64, dex: &str) -> Value {
        json!({
            "name": "Pikachu",
            "dexStats": dex,
            "images": [
                {"src": "data:", "zoom": zoom, "rotation": rotation, "croppedArea": {"x": 0, "y": 0}},
                {"src": "data:", "zoom": 9.0}
            ]
        })
    }

    // =========================================================================
    // naming
    // =========================================================================

    #[test]
    fn sidecar_path_uses_full_file_name() {
        assert_eq!(
            sidecar_path(Path::new("pictures/025.jpg")),
            PathBuf::from("pictures/025.jpg.crop.json")
        );
        assert_eq!(
            legacy_sidecar_path(Path::new("pictures/025.jpg")),
            PathBuf::from("pictures/025.crop.json")
        );
    }

    // =========================================================================
    // first run
    // =========================================================================

    #[test]
    fn no_images_means_no_sidecar() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("x.jpg.crop.json");
        let mut record = json!({"dexStats": "caption", "images": []});

        assert_eq!(reconcile(&mut record, &path), ReconcileOutcome::NoImages);
        assert!(!path.exists());
    }

    #[test]
    fn first_run_creates_sidecar_from_first_image() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("025.jpg.crop.json");
        let mut record = card(1.5, 90, "Electric mouse");

        assert_eq!(reconcile(&mut record, &path), ReconcileOutcome::Created);
        assert_eq!(
            read_json(&path),
            json!({
                "croppedArea": {"x": 0, "y": 0},
                "zoom": 1.5,
                "rotation": 90,
                "dexStats": "Electric mouse"
            })
        );
        // Creating a sidecar leaves the rendered images alone
        assert_eq!(record["images"][1]["zoom"], json!(9.0));
        assert!(record["images"][1].get("rotation").is_none());
    }

    #[test]
    fn first_run_sidecar_is_pretty_and_keeps_non_ascii() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("669.png.crop.json");
        let mut record = json!({"dexStats": "Flabébé — フラベベ", "images": [{"zoom": 1}]});

        reconcile(&mut record, &path);
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\n  \"zoom\": 1,\n  \"dexStats\": \"Flabébé — フラベベ\"\n}");
    }

    #[test]
    fn nothing_to_store_creates_no_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg.crop.json");
        let mut record = json!({"dexStats": "   ", "images": [{"src": ""}]});

        assert_eq!(reconcile(&mut record, &path), ReconcileOutcome::NothingToStore);
        assert!(!path.exists());
    }

    #[test]
    fn malformed_sidecar_is_replaced_with_template_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg.crop.json");
        fs::write(&path, "{not json").unwrap();
        let mut record = card(2.0, 0, "cap");

        assert_eq!(reconcile(&mut record, &path), ReconcileOutcome::Created);
        assert_eq!(read_json(&path)["zoom"], json!(2.0));
    }

    #[test]
    fn non_object_sidecar_counts_as_missing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg.crop.json");
        fs::write(&path, "[1, 2]").unwrap();
        let mut record = card(2.0, 0, "cap");

        assert_eq!(reconcile(&mut record, &path), ReconcileOutcome::Created);
        assert!(read_json(&path).is_object());
    }

    // =========================================================================
    // existing sidecar
    // =========================================================================

    #[test]
    fn sidecar_values_win_over_template() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg.crop.json");
        fs::write(
            &path,
            r#"{"zoom": 3, "rotation": 180, "croppedArea": {"x": 5}, "dexStats": "A"}"#,
        )
        .unwrap();
        let mut record = card(1.0, 0, "B");

        assert_eq!(reconcile(&mut record, &path), ReconcileOutcome::Unchanged);
        assert_eq!(record["dexStats"], json!("A"));
        for image in record["images"].as_array().unwrap() {
            assert_eq!(image["zoom"], json!(3));
            assert_eq!(image["rotation"], json!(180));
            assert_eq!(image["croppedArea"], json!({"x": 5}));
        }
        assert_eq!(read_json(&path)["dexStats"], json!("A"));
    }

    #[test]
    fn backfill_adds_missing_keys_only() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg.crop.json");
        fs::write(&path, r#"{"zoom": 2}"#).unwrap();
        let mut record = json!({"images": [{"zoom": 5, "rotation": 90}, {"rotation": 10}]});

        assert_eq!(reconcile(&mut record, &path), ReconcileOutcome::Updated);
        assert_eq!(read_json(&path), json!({"zoom": 2, "rotation": 90}));
        assert_eq!(record["images"][0], json!({"zoom": 2, "rotation": 90}));
        // rotation was not stored before this run, so the second image keeps its own
        assert_eq!(record["images"][1], json!({"zoom": 2, "rotation": 10}));
    }

    #[test]
    fn backfill_caption_when_sidecar_lacks_one() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg.crop.json");
        fs::write(&path, r#"{"zoom": 2, "dexStats": "  "}"#).unwrap();
        let mut record = json!({"dexStats": "fresh", "images": [{"zoom": 2}]});

        assert_eq!(reconcile(&mut record, &path), ReconcileOutcome::Updated);
        assert_eq!(read_json(&path)["dexStats"], json!("fresh"));
        assert_eq!(record["dexStats"], json!("fresh"));
    }

    #[test]
    fn blank_record_caption_is_not_stored() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg.crop.json");
        fs::write(&path, r#"{"zoom": 2}"#).unwrap();
        let mut record = json!({"dexStats": "", "images": [{"zoom": 2}]});

        assert_eq!(reconcile(&mut record, &path), ReconcileOutcome::Unchanged);
        assert_eq!(read_json(&path), json!({"zoom": 2}));
    }

    #[test]
    fn stored_caption_added_to_record_without_one() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg.crop.json");
        fs::write(&path, r#"{"dexStats": "kept"}"#).unwrap();
        let mut record = json!({"images": [{"src": ""}]});

        reconcile(&mut record, &path);
        assert_eq!(record["dexStats"], json!("kept"));
    }

    #[test]
    fn empty_sidecar_object_with_nothing_to_add_is_untouched() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg.crop.json");
        fs::write(&path, "{}").unwrap();
        let mut record = json!({"images": [{"src": ""}]});

        assert_eq!(reconcile(&mut record, &path), ReconcileOutcome::Unchanged);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn reconcile_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg.crop.json");

        let mut first = card(1.25, 45, "cap");
        assert_eq!(reconcile(&mut first, &path), ReconcileOutcome::Created);
        let sidecar_after_first = fs::read_to_string(&path).unwrap();

        // From the second run on, every image carries the stored values
        let mut second = card(1.25, 45, "cap");
        assert_eq!(reconcile(&mut second, &path), ReconcileOutcome::Unchanged);
        assert_eq!(second["images"][1]["zoom"], json!(1.25));

        let mut third = card(1.25, 45, "cap");
        assert_eq!(reconcile(&mut third, &path), ReconcileOutcome::Unchanged);
        assert_eq!(second, third);
        assert_eq!(fs::read_to_string(&path).unwrap(), sidecar_after_first);
    }

    #[test]
    fn caption_first_write_wins() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg.crop.json");

        let mut first = card(1.0, 0, "A");
        reconcile(&mut first, &path);
        let mut changed = card(1.0, 0, "B");
        reconcile(&mut changed, &path);

        assert_eq!(changed["dexStats"], json!("A"));
        assert_eq!(read_json(&path)["dexStats"], json!("A"));
    }

    // =========================================================================
    // legacy sidecars
    // =========================================================================

    #[test]
    fn legacy_stem_sidecar_is_adopted() {
        let tmp = TempDir::new().unwrap();
        let picture = tmp.path().join("025.jpg");
        let legacy = tmp.path().join("025.crop.json");
        fs::write(&legacy, r#"{"zoom": 4, "dexStats": "old caption"}"#).unwrap();
        let path = sidecar_path(&picture);
        let mut record = card(1.0, 30, "new caption");

        assert_eq!(reconcile(&mut record, &path), ReconcileOutcome::Created);
        assert_eq!(record["dexStats"], json!("old caption"));
        assert_eq!(record["images"][0]["zoom"], json!(4));
        assert_eq!(
            read_json(&path),
            json!({
                "zoom": 4,
                "dexStats": "old caption",
                "croppedArea": {"x": 0, "y": 0},
                "rotation": 30
            })
        );
        // Legacy file untouched
        assert_eq!(read_json(&legacy), json!({"zoom": 4, "dexStats": "old caption"}));
    }

    #[test]
    fn legacy_adopted_even_when_nothing_new_to_add() {
        let tmp = TempDir::new().unwrap();
        let legacy = tmp.path().join("025.crop.json");
        fs::write(&legacy, r#"{"zoom": 4}"#).unwrap();
        let path = sidecar_path(&tmp.path().join("025.jpg"));
        let mut record = json!({"images": [{"zoom": 1}]});

        assert_eq!(reconcile(&mut record, &path), ReconcileOutcome::Created);
        assert_eq!(read_json(&path), json!({"zoom": 4}));
    }

    #[test]
    fn malformed_sidecar_is_replaced_even_with_legacy_present() {
        let tmp = TempDir::new().unwrap();
        let path = sidecar_path(&tmp.path().join("a.jpg"));
        fs::write(&path, "{broken").unwrap();
        fs::write(tmp.path().join("a.crop.json"), r#"{"zoom": 4}"#).unwrap();
        let mut record = json!({"images": [{"zoom": 1}]});

        assert_eq!(reconcile(&mut record, &path), ReconcileOutcome::Created);
        assert_eq!(read_json(&path), json!({"zoom": 4}));
        assert_eq!(record["images"][0]["zoom"], json!(4));
    }

    // =========================================================================
    // I/O failures
    // =========================================================================

    #[test]
    fn unusable_sidecar_path_is_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.jpg.crop.json");
        fs::create_dir(&path).unwrap();
        let mut record = card(1.5, 90, "cap");
        let rendered = record.clone();

        assert_eq!(reconcile(&mut record, &path), ReconcileOutcome::WriteFailed);
        assert_eq!(record, rendered);
        assert!(path.is_dir());
    }

    // =========================================================================
    // Sidecar unit behavior
    // =========================================================================

    #[test]
    fn crop_params_follow_key_order() {
        let sidecar = Sidecar {
            fields: json!({"aspect": 1.5, "dexStats": "x", "crop": {"x": 1}})
                .as_object()
                .unwrap()
                .clone(),
        };
        let keys: Vec<&str> = sidecar.crop_params().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["crop", "aspect"]);
    }

    #[test]
    fn outcome_display_labels() {
        assert_eq!(ReconcileOutcome::Created.to_string(), "created");
        assert_eq!(ReconcileOutcome::NoImages.to_string(), "no images");
    }
}
