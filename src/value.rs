//! Dynamically typed values carried by remote attributes.
//!
//! The backend exposes attribute values of a handful of shapes: scalars, ordered
//! sequences, and mappings. `Value` is the closed set of those shapes; a value
//! read from an attribute doubles as the type template when a new value is
//! parsed from text (see [`crate::coerce`]).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Concrete kind of a remote sequence.
///
/// Lists are variable-length and mutable on the backend side, tuples are
/// fixed-shape (e.g. a `(width, height)` resolution). Coercion keeps the kind
/// of the template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceKind {
    List,
    Tuple,
}

/// A remote attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(SequenceKind, Vec<Value>),
    /// Insertion-ordered key/value pairs with unique keys.
    Mapping(Vec<(Value, Value)>),
    /// A remote value the client can show but has no text conversion for.
    Opaque { type_name: String },
}

impl Value {
    /// Build a list value.
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Sequence(SequenceKind::List, items.into_iter().collect())
    }

    /// Build a tuple value.
    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Sequence(SequenceKind::Tuple, items.into_iter().collect())
    }

    /// Build a mapping; later duplicate keys overwrite earlier ones.
    pub fn mapping(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut entries: Vec<(Value, Value)> = Vec::new();
        for (key, value) in pairs {
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
        }
        Value::Mapping(entries)
    }

    /// Name of the value's shape, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Sequence(SequenceKind::List, _) => "list",
            Value::Sequence(SequenceKind::Tuple, _) => "tuple",
            Value::Mapping(_) => "mapping",
            Value::Opaque { .. } => "opaque",
        }
    }

    /// Look up a key in a mapping value.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Mapping(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Interpret a two-element integer sequence as a `(width, height)` pair.
    pub fn as_size(&self) -> Option<(u32, u32)> {
        match self {
            Value::Sequence(_, items) if items.len() == 2 => {
                let w = u32::try_from(items[0].as_i64()?).ok()?;
                let h = u32::try_from(items[1].as_i64()?).ok()?;
                Some((w, h))
            }
            _ => None,
        }
    }

    /// Ordering between two values of the same numeric or string shape.
    pub fn partial_cmp_same_shape(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{:?}", fl),
            Value::String(s) => write!(f, "{}", s),
            Value::Sequence(kind, items) => {
                let (open, close) = match kind {
                    SequenceKind::List => ("[", "]"),
                    SequenceKind::Tuple => ("(", ")"),
                };
                f.write_str(open)?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(close)
            }
            Value::Mapping(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Value::Opaque { type_name } => write!(f, "<{}>", type_name),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_wire_format() {
        let value = Value::tuple([Value::Int(320), Value::Int(240)]);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["type"], "Sequence");
        assert_eq!(json["value"][0], "Tuple");
        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
        assert_eq!(back.as_size(), Some((320, 240)));
    }

    #[test]
    fn test_mapping_overwrites_duplicate_keys() {
        let map = Value::mapping([
            (Value::from("a"), Value::Int(1)),
            (Value::from("b"), Value::Int(2)),
            (Value::from("a"), Value::Int(3)),
        ]);
        assert_eq!(map.get(&Value::from("a")), Some(&Value::Int(3)));
        match map {
            Value::Mapping(entries) => assert_eq!(entries.len(), 2),
            other => panic!("expected mapping, got {:?}", other),
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(
            Value::tuple([Value::Int(640), Value::Int(480)]).to_string(),
            "(640, 480)"
        );
        assert_eq!(
            Value::mapping([(Value::from("x"), Value::Float(0.5))]).to_string(),
            "{x: 0.5}"
        );
    }

    #[test]
    fn test_as_size() {
        let res = Value::tuple([Value::Int(1024), Value::Int(768)]);
        assert_eq!(res.as_size(), Some((1024, 768)));
        assert_eq!(Value::list([Value::Int(-1), Value::Int(2)]).as_size(), None);
        assert_eq!(Value::Int(3).as_size(), None);
    }

    #[test]
    fn test_same_shape_ordering() {
        use std::cmp::Ordering;
        assert_eq!(
            Value::Int(2).partial_cmp_same_shape(&Value::Int(5)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Float(2.5).partial_cmp_same_shape(&Value::Int(2)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Bool(true).partial_cmp_same_shape(&Value::Int(1)), None);
    }
}
