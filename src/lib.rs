//! # Card Gen
//!
//! A batch generator for JSON "cards". A shared JSON template is rendered once
//! per config file, each record gets its picture embedded as a data URI, and
//! the framing and caption a user settles on for a picture are kept stable
//! across runs by a sidecar file next to it.
//!
//! # Pipeline
//!
//! Records are processed one at a time, in config file name order:
//!
//! ```text
//! defaults.yml ─┐
//!               ├─ deep merge ─→ variables ─→ render template ─→ record
//! configs/NNN ──┘                   │                              │
//!                                   └─ id ─→ pictures/<id>.*  ─→ images[*].src
//!                                                  │                │
//!                                         <picture>.crop.json ←→ crop + caption
//!                                                                   │
//!                                                          out/<id>.json
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`batch`] | Drives a run: per-record pipeline, duplicate detection, output files |
//! | [`config`] | Data file loading (JSON/YAML/TOML), defaults, `card-gen.toml` settings |
//! | [`template`] | `{{ key }}` substitution and parsing of rendered records |
//! | [`naming`] | Record identifier normalization |
//! | [`picture`] | Picture lookup by identifier, default picture, data URIs |
//! | [`sidecar`] | Crop/caption sidecar files and their reconciliation with records |
//! | [`tree`] | JSON tree helpers: deep merge, dotted lookup, image reference walk |
//! | [`output`] | CLI output formatting for generate and check runs |
//!
//! # Design Decisions
//!
//! ## Sidecar Values Win
//!
//! Template and config values only seed a sidecar. Once a sidecar holds a crop
//! key or a caption, that stored value is applied to every image of every
//! record using the picture, and later config edits never overwrite it. The
//! sidecar is only ever extended with keys it lacks. A user who wants new
//! values edits or deletes the sidecar.
//!
//! ## Shared Default Picture
//!
//! Records without their own picture fall back to the picture named after the
//! defaults file. All of them share its single sidecar, so the first record
//! processed decides the framing for the group.
//!
//! ## Fail Fast
//!
//! Configuration, template, identifier and picture problems abort the batch at
//! the first offending record. Sidecar problems never do: an unreadable
//! sidecar is treated as absent and a failed write is logged.

pub mod batch;
pub mod config;
pub mod naming;
pub mod output;
pub mod picture;
pub mod sidecar;
pub mod template;
pub mod tree;

#[cfg(test)]
pub(crate) mod test_helpers;
