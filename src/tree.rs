//! Generic helpers over `serde_json::Value` trees.
//!
//! Everything in the generator works on plain JSON values: configs are merged
//! as values, placeholders resolve by walking values, and image references are
//! found by walking the rendered record. Keeping these walks in one place means
//! the src injection in [`crate::picture`] and the reconciliation in
//! [`crate::sidecar`] always agree on what counts as an image.
//!
//! ## Image references
//!
//! An image reference is any object stored as an element of a sequence under a
//! key named `images`, at any depth:
//!
//! ```text
//! {
//!   "images": [ {"src": "", "zoom": 1} ],        ← image reference
//!   "back": {
//!     "images": [ {"src": ""}, "not-an-object" ] ← objects only
//!   }
//! }
//! ```
//!
//! Elements of an `images` sequence are not searched for nested `images` keys.

use serde_json::{Map, Value};

/// Recursively merge `overlay` on top of `base`.
///
/// - Objects are merged key-by-key (overlay keys override base keys).
/// - A `null` overlay value keeps whatever the base had.
/// - Any other overlay value (scalar or array) replaces the base value entirely.
/// - Keys in base that are not in overlay are preserved, in their original order.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => {
                        let base_val = slot.take();
                        *slot = deep_merge(base_val, overlay_val);
                    }
                    None => {
                        base_map.insert(key, overlay_val);
                    }
                }
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Resolve a dotted path like `stats.attack` against nested objects.
///
/// Only objects are traversed; a path segment that lands on an array or a
/// scalar before the last segment resolves to `None`.
pub fn lookup_dotted<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

/// Visit every image reference in document order.
///
/// The visitor receives the zero-based position of the reference in the walk,
/// so callers can single out the first one.
pub fn for_each_image_ref<F>(tree: &mut Value, mut visit: F)
where
    F: FnMut(usize, &mut Map<String, Value>),
{
    let mut index = 0;
    walk(tree, &mut |image: &mut Map<String, Value>| {
        visit(index, image);
        index += 1;
    });
}

fn walk(value: &mut Value, visit: &mut dyn FnMut(&mut Map<String, Value>)) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                match (key.as_str(), child) {
                    ("images", Value::Array(items)) => {
                        for item in items.iter_mut() {
                            if let Value::Object(image) = item {
                                visit(image);
                            }
                        }
                    }
                    (_, other) => walk(other, visit),
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                walk(item, visit);
            }
        }
        _ => {}
    }
}

/// Number of image references in the tree.
pub fn count_image_refs(tree: &mut Value) -> usize {
    let mut count = 0;
    for_each_image_ref(tree, |_, _| count += 1);
    count
}

/// Clone of the first image reference, if there is one.
pub fn first_image_ref(tree: &mut Value) -> Option<Map<String, Value>> {
    let mut first = None;
    for_each_image_ref(tree, |index, image| {
        if index == 0 {
            first = Some(image.clone());
        }
    });
    first
}
