//! Addressable sub-paths of a type.
//!
//! object{x: array[object{y: integer}]} yields
//!   x       -> array[object{y: integer}]
//!   x[i]    -> object{y: integer}
//!   x[i].y  -> integer
//!
//! Tuples, unions and dicts are addressable only as a whole.

use super::TypeDescriptor;
use std::collections::BTreeMap;

/// Placeholder standing for an array index inside a path.
pub const INDEX_PLACEHOLDER: &str = "[i]";

pub type PathMap = BTreeMap<String, TypeDescriptor>;

/// Every addressable sub-path of `ty` with the type reachable there. The root
/// path is not included.
pub fn enumerate(ty: &TypeDescriptor) -> PathMap {
    let mut out = PathMap::new();
    walk(ty, "", &mut out);
    out.remove("");
    out
}

/// Number of index placeholders in `path`.
pub fn placeholder_count(path: &str) -> usize {
    path.matches(INDEX_PLACEHOLDER).count()
}

fn walk(ty: &TypeDescriptor, prefix: &str, out: &mut PathMap) {
    out.insert(prefix.to_string(), ty.clone());
    match ty {
        TypeDescriptor::Object(fields) => {
            for (name, field) in fields {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                walk(field, &path, out);
            }
        }
        TypeDescriptor::Array(item) => {
            walk(item, &format!("{prefix}{INDEX_PLACEHOLDER}"), out);
        }
        _ => {}
    }
}
