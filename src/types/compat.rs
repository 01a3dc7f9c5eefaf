//! Wire compatibility between two port types.
//!
//! Rules, in order:
//! 1. `any` on either side matches (a union offering `any` counts as `any`).
//! 2. A union on either side matches when some pair of alternatives matches
//!    (a non-union side is a single alternative).
//! 3. An unbound placeholder matches nothing else.
//! 4. Two scalars match when they are the same kind.
//! 5. Anything else compares the full renderings of both sides.

use super::{TypeDescriptor, render};
use std::slice;

pub fn is_compatible(source: &TypeDescriptor, target: &TypeDescriptor) -> bool {
    if is_top(source) || is_top(target) {
        return true;
    }

    match (source, target) {
        (TypeDescriptor::Union(_), _) | (_, TypeDescriptor::Union(_)) => {
            let targets = alternatives(target);
            alternatives(source)
                .iter()
                .any(|s| targets.iter().any(|t| is_compatible(s, t)))
        }
        _ if source.is_unbound() || target.is_unbound() => false,
        (TypeDescriptor::Scalar(a), TypeDescriptor::Scalar(b)) => a == b,
        _ => render(source) == render(target),
    }
}

/// A map input only accepts arrays; the item type is irrelevant.
pub fn is_map_source(source: &TypeDescriptor) -> bool {
    matches!(source, TypeDescriptor::Array(_))
}

fn is_top(ty: &TypeDescriptor) -> bool {
    match ty {
        TypeDescriptor::Union(items) => items.iter().any(is_top),
        other => other.is_any(),
    }
}

fn alternatives(ty: &TypeDescriptor) -> &[TypeDescriptor] {
    match ty {
        TypeDescriptor::Union(items) => items,
        other => slice::from_ref(other),
    }
}
