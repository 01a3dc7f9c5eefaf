//! Type descriptors attached to ports.
//!
//! Wire format (as published by the function catalog):
//! {"type": "integer"}
//! {"type": "array",  "value_type": {"type": "tensor"}}
//! {"type": "tuple",  "value_type": [{"type": "integer"}, {"type": "integer"}]}
//! {"type": "union",  "value_type": [{"type": "string"}, {"type": "none"}]}
//! {"type": "object", "value_type": {"text": {"type": "string"}}}
//! {"type": "dict",   "key_type": {"type": "string"}, "value_type": {"type": "any"}}
//!
//! A bare string is read as a scalar kind and a bare mapping without "type" is
//! read as the field map of an object. "?" marks a port whose type is not bound
//! yet (a fresh map input).

pub mod compat;
pub mod paths;
pub mod render;

pub use compat::{is_compatible, is_map_source};
pub use paths::{INDEX_PLACEHOLDER, PathMap, enumerate, placeholder_count};
pub use render::{MAX_TYPE_LENGTH, render, render_depth, render_fit};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Leaf kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarKind {
    String,
    Bytes,
    Integer,
    Float,
    Boolean,
    Tensor,
    /// Top type: flows into and out of everything.
    Any,
    None,
    /// Placeholder of a map input that has no incoming wire yet.
    Unbound,
    /// Kind published by the catalog that this crate has no special rules for.
    Other(String),
}

impl ScalarKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "string" => Self::String,
            "bytes" => Self::Bytes,
            "integer" => Self::Integer,
            "float" => Self::Float,
            "boolean" => Self::Boolean,
            "tensor" => Self::Tensor,
            "any" => Self::Any,
            "none" => Self::None,
            "?" => Self::Unbound,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Tensor => "tensor",
            Self::Any => "any",
            Self::None => "none",
            Self::Unbound => "?",
            Self::Other(name) => name,
        }
    }
}

/// Recursive shape of the data flowing through a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum TypeDescriptor {
    Scalar(ScalarKind),
    Array(Box<TypeDescriptor>),
    Tuple(Vec<TypeDescriptor>),
    Object(BTreeMap<String, TypeDescriptor>),
    Union(Vec<TypeDescriptor>),
    Dict {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("type descriptor must be a string or a mapping, got {0}")]
    Unexpected(String),

    #[error("type tag must be a string, got {0}")]
    InvalidTag(String),

    #[error("{kind} type is missing `{field}`")]
    MissingField { kind: String, field: &'static str },

    #[error("`value_type` of {kind} type must be {expected}")]
    Shape { kind: String, expected: &'static str },
}

impl TypeDescriptor {
    pub fn scalar(kind: ScalarKind) -> Self {
        Self::Scalar(kind)
    }

    pub fn any() -> Self {
        Self::Scalar(ScalarKind::Any)
    }

    pub fn unbound() -> Self {
        Self::Scalar(ScalarKind::Unbound)
    }

    pub fn array(item: TypeDescriptor) -> Self {
        Self::Array(Box::new(item))
    }

    pub fn tuple(items: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        Self::Tuple(items.into_iter().collect())
    }

    pub fn union(alternatives: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        Self::Union(alternatives.into_iter().collect())
    }

    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, TypeDescriptor)>) -> Self {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn dict(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        Self::Dict {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Scalar(ScalarKind::Any))
    }

    pub fn is_unbound(&self) -> bool {
        matches!(self, Self::Scalar(ScalarKind::Unbound))
    }

    /// Item type of an array, `None` for every other shape.
    pub fn item(&self) -> Option<&TypeDescriptor> {
        match self {
            Self::Array(item) => Some(item),
            _ => None,
        }
    }

    /// Name rendered for this shape when its children are hidden.
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Scalar(kind) => kind.as_str(),
            Self::Array(_) => "array",
            Self::Tuple(_) => "tuple",
            Self::Object(_) => "object",
            Self::Union(_) => "union",
            Self::Dict { .. } => "dict",
        }
    }

    /// Nesting depth: 0 for scalars, 1 + deepest child for composites.
    pub fn depth(&self) -> usize {
        match self {
            Self::Scalar(_) => 0,
            Self::Array(item) => 1 + item.depth(),
            Self::Tuple(items) | Self::Union(items) => 1 + deepest(items.iter()),
            Self::Object(fields) => 1 + deepest(fields.values()),
            Self::Dict { key, value } => 1 + key.depth().max(value.depth()),
        }
    }

    fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::String(kind) => Ok(Self::Scalar(ScalarKind::from_name(kind))),
            Value::Object(map) => match map.get("type") {
                None => Ok(Self::Object(fields_from(map)?)),
                Some(Value::String(kind)) => Self::from_tagged(kind, map),
                Some(other) => Err(TypeError::InvalidTag(other.to_string())),
            },
            other => Err(TypeError::Unexpected(other.to_string())),
        }
    }

    fn from_tagged(kind: &str, map: &Map<String, Value>) -> Result<Self, TypeError> {
        let field = |name: &'static str| {
            map.get(name).ok_or_else(|| TypeError::MissingField {
                kind: kind.to_string(),
                field: name,
            })
        };
        let items = |value: &Value| -> Result<Vec<Self>, TypeError> {
            match value {
                Value::Array(items) => items.iter().map(Self::from_value).collect(),
                _ => Err(TypeError::Shape {
                    kind: kind.to_string(),
                    expected: "a sequence",
                }),
            }
        };

        match kind {
            "array" => Ok(Self::array(Self::from_value(field("value_type")?)?)),
            "tuple" => Ok(Self::Tuple(items(field("value_type")?)?)),
            "union" => Ok(Self::Union(items(field("value_type")?)?)),
            "object" => match field("value_type")? {
                Value::Object(fields) => Ok(Self::Object(fields_from(fields)?)),
                _ => Err(TypeError::Shape {
                    kind: kind.to_string(),
                    expected: "a mapping",
                }),
            },
            "dict" => Ok(Self::dict(
                Self::from_value(field("key_type")?)?,
                Self::from_value(field("value_type")?)?,
            )),
            scalar => Ok(Self::Scalar(ScalarKind::from_name(scalar))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Scalar(kind) => json!({ "type": kind.as_str() }),
            Self::Array(item) => json!({ "type": "array", "value_type": item.to_value() }),
            Self::Tuple(items) => json!({
                "type": "tuple",
                "value_type": items.iter().map(Self::to_value).collect::<Vec<_>>(),
            }),
            Self::Union(items) => json!({
                "type": "union",
                "value_type": items.iter().map(Self::to_value).collect::<Vec<_>>(),
            }),
            Self::Object(fields) => {
                let fields: Map<String, Value> = fields
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.to_value()))
                    .collect();
                json!({ "type": "object", "value_type": fields })
            }
            Self::Dict { key, value } => json!({
                "type": "dict",
                "key_type": key.to_value(),
                "value_type": value.to_value(),
            }),
        }
    }
}

fn deepest<'a>(items: impl Iterator<Item = &'a TypeDescriptor>) -> usize {
    items.map(TypeDescriptor::depth).max().unwrap_or(0)
}

fn fields_from(map: &Map<String, Value>) -> Result<BTreeMap<String, TypeDescriptor>, TypeError> {
    map.iter()
        .map(|(name, value)| Ok((name.clone(), TypeDescriptor::from_value(value)?)))
        .collect()
}

impl TryFrom<Value> for TypeDescriptor {
    type Error = TypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

impl From<TypeDescriptor> for Value {
    fn from(ty: TypeDescriptor) -> Self {
        ty.to_value()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self))
    }
}
