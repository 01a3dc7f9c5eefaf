//! Canonical text rendering of type descriptors.
//!
//! Full rendering:   array[object{coords: array[tuple[integer, integer]], image: tensor}]
//! Depth 1:          array[object]
//! Depth 0:          array
//!
//! Object fields are rendered in name order, so the output is a stable key.

use super::TypeDescriptor;

/// Width budget of a type label next to a port.
pub const MAX_TYPE_LENGTH: usize = 16;

/// Unrestricted rendering.
pub fn render(ty: &TypeDescriptor) -> String {
    let mut out = String::new();
    write_type(ty, None, &mut out);
    out
}

/// Rendering with at most `depth` composite levels expanded. A composite at
/// depth 0 collapses to its bare kind name.
pub fn render_depth(ty: &TypeDescriptor, depth: usize) -> String {
    let mut out = String::new();
    write_type(ty, Some(depth), &mut out);
    out
}

/// Deepest rendering that fits in `budget` characters.
///
/// Depths are tried from the full depth of `ty` down to 0. If even the bare
/// kind name does not fit, the unrestricted rendering is returned.
pub fn render_fit(ty: &TypeDescriptor, budget: usize) -> String {
    for depth in (0..=ty.depth()).rev() {
        let text = render_depth(ty, depth);
        if text.chars().count() <= budget {
            return text;
        }
    }
    render(ty)
}

fn write_type(ty: &TypeDescriptor, depth: Option<usize>, out: &mut String) {
    if let TypeDescriptor::Scalar(kind) = ty {
        out.push_str(kind.as_str());
        return;
    }

    out.push_str(ty.kind_name());
    let inner = match depth {
        Some(0) => return,
        Some(d) => Some(d - 1),
        None => None,
    };

    match ty {
        TypeDescriptor::Scalar(_) => {}
        TypeDescriptor::Array(item) => {
            out.push('[');
            write_type(item, inner, out);
            out.push(']');
        }
        TypeDescriptor::Tuple(items) | TypeDescriptor::Union(items) => {
            out.push('[');
            write_list(items.iter(), inner, out);
            out.push(']');
        }
        TypeDescriptor::Dict { key, value } => {
            out.push('[');
            write_list([key.as_ref(), value.as_ref()].into_iter(), inner, out);
            out.push(']');
        }
        TypeDescriptor::Object(fields) => {
            out.push('{');
            for (i, (name, field)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(name);
                out.push_str(": ");
                write_type(field, inner, out);
            }
            out.push('}');
        }
    }
}

fn write_list<'a>(
    items: impl Iterator<Item = &'a TypeDescriptor>,
    depth: Option<usize>,
    out: &mut String,
) {
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_type(item, depth, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarKind;
    use pretty_assertions::assert_eq;

    fn int() -> TypeDescriptor {
        TypeDescriptor::scalar(ScalarKind::Integer)
    }

    fn documents() -> TypeDescriptor {
        TypeDescriptor::array(TypeDescriptor::object([
            ("image", TypeDescriptor::scalar(ScalarKind::Tensor)),
            ("coords", TypeDescriptor::array(TypeDescriptor::tuple([int(), int()]))),
        ]))
    }

    #[test]
    fn renders_every_shape() {
        assert_eq!(
            render(&documents()),
            "array[object{coords: array[tuple[integer, integer]], image: tensor}]"
        );
        assert_eq!(
            render(&TypeDescriptor::union([
                TypeDescriptor::scalar(ScalarKind::String),
                TypeDescriptor::scalar(ScalarKind::None),
            ])),
            "union[string, none]"
        );
        assert_eq!(
            render(&TypeDescriptor::dict(
                TypeDescriptor::scalar(ScalarKind::String),
                TypeDescriptor::any()
            )),
            "dict[string, any]"
        );
        assert_eq!(render(&TypeDescriptor::unbound()), "?");
        assert_eq!(render(&TypeDescriptor::Object(Default::default())), "object{}");
    }

    #[test]
    fn depth_zero_shows_bare_kind() {
        let nested = TypeDescriptor::array(TypeDescriptor::array(int()));
        assert_eq!(render_depth(&nested, 0), "array");
        assert_eq!(render_depth(&nested, 1), "array[array]");
        assert_eq!(render_depth(&int(), 0), "integer");
    }

    #[test]
    fn large_depth_matches_unrestricted_rendering() {
        let ty = TypeDescriptor::object([("a", int())]);
        assert_eq!(render_depth(&ty, 100), render(&ty));
    }

    #[test]
    fn fit_picks_deepest_rendering_within_budget() {
        let ty = documents();
        assert_eq!(render_fit(&ty, MAX_TYPE_LENGTH), "array[object]");
        assert_eq!(render_fit(&ty, 1000), render(&ty));
        assert_eq!(render_fit(&ty, 5), "array");
    }

    #[test]
    fn fit_falls_back_to_full_rendering_when_nothing_fits() {
        let ty = TypeDescriptor::array(int());
        assert_eq!(render_fit(&ty, 2), "array[integer]");
    }
}
