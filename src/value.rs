//! Dynamic values handed to conversion routines.
//!
//! A [`Value`] is the runtime shape of the data a routine converts. Records keep
//! their field order so generated output is stable across runs.

use std::fmt;

use serde::de::{self, DeserializeSeed, EnumAccess, SeqAccess, VariantAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Deepest list/record nesting accepted when decoding a [`Value`].
///
/// Decoding recurses once per level, so artifacts carrying constants nested
/// deeper than this are rejected instead of exhausting the stack.
pub const MAX_VALUE_DEPTH: usize = 128;

/// A dynamically shaped data value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// Ordered `(field, value)` pairs.
    Record(Vec<(String, Value)>),
}

impl Value {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
            Self::List(_) => ValueKind::List,
            Self::Record(_) => ValueKind::Record,
        }
    }

    /// Build a record from `(field, value)` pairs.
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Look up a record field by name. `None` for missing fields and non-records.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Record(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Record(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ValueSeed { depth: 0 }.deserialize(deserializer)
    }
}

const VARIANTS: &[&str] = &["Null", "Bool", "Int", "Float", "Str", "List", "Record"];

#[derive(Deserialize)]
#[serde(variant_identifier)]
enum Tag {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Record,
}

/// Decodes one value at a known nesting depth.
#[derive(Clone, Copy)]
struct ValueSeed {
    depth: usize,
}

impl ValueSeed {
    fn nested(self) -> Self {
        Self {
            depth: self.depth + 1,
        }
    }
}

impl<'de> DeserializeSeed<'de> for ValueSeed {
    type Value = Value;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        if self.depth > MAX_VALUE_DEPTH {
            return Err(de::Error::custom(format!(
                "value nesting exceeds {MAX_VALUE_DEPTH} levels"
            )));
        }
        deserializer.deserialize_enum("Value", VARIANTS, self)
    }
}

impl<'de> Visitor<'de> for ValueSeed {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a value")
    }

    fn visit_enum<A: EnumAccess<'de>>(self, data: A) -> Result<Value, A::Error> {
        let (tag, variant) = data.variant::<Tag>()?;
        match tag {
            Tag::Null => variant.unit_variant().map(|()| Value::Null),
            Tag::Bool => variant.newtype_variant().map(Value::Bool),
            Tag::Int => variant.newtype_variant().map(Value::Int),
            Tag::Float => variant.newtype_variant().map(Value::Float),
            Tag::Str => variant.newtype_variant().map(Value::Str),
            Tag::List => variant
                .newtype_variant_seed(ListSeed(self.nested()))
                .map(Value::List),
            Tag::Record => variant
                .newtype_variant_seed(RecordSeed(self.nested()))
                .map(Value::Record),
        }
    }
}

struct ListSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for ListSeed {
    type Value = Vec<Value>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Vec<Value>, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for ListSeed {
    type Value = Vec<Value>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of values")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<Value>, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(4096));
        while let Some(item) = seq.next_element_seed(self.0)? {
            items.push(item);
        }
        Ok(items)
    }
}

struct RecordSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for RecordSeed {
    type Value = Vec<(String, Value)>;

    fn deserialize<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> Result<Vec<(String, Value)>, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for RecordSeed {
    type Value = Vec<(String, Value)>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of record fields")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut fields = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(4096));
        while let Some(field) = seq.next_element_seed(FieldSeed(self.0))? {
            fields.push(field);
        }
        Ok(fields)
    }
}

/// One `(name, value)` record field.
struct FieldSeed(ValueSeed);

impl<'de> DeserializeSeed<'de> for FieldSeed {
    type Value = (String, Value);

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_tuple(2, self)
    }
}

impl<'de> Visitor<'de> for FieldSeed {
    type Value = (String, Value);

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a record field")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let name: String = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let value = seq
            .next_element_seed(self.0)?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        Ok((name, value))
    }
}

/// The kind of a [`Value`], used in routine signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Accepts every kind.
    Any,
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Record,
}

impl ValueKind {
    /// Whether a value of kind `other` satisfies this kind.
    pub fn accepts(self, other: ValueKind) -> bool {
        self == ValueKind::Any || self == other
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Null => write!(f, "null"),
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Str => write!(f, "str"),
            Self::List => write!(f, "list"),
            Self::Record => write!(f, "record"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_preserves_field_order() {
        let point = Value::record([("y", Value::Int(2)), ("x", Value::Int(1))]);
        match &point {
            Value::Record(fields) => {
                assert_eq!(fields[0].0, "y");
                assert_eq!(fields[1].0, "x");
            }
            other => panic!("expected record, got {other:?}"),
        }
        assert_eq!(point.field("x"), Some(&Value::Int(1)));
        assert_eq!(point.field("z"), None);
    }

    #[test]
    fn any_accepts_everything() {
        for kind in [ValueKind::Null, ValueKind::Int, ValueKind::Record] {
            assert!(ValueKind::Any.accepts(kind));
        }
        assert!(ValueKind::Int.accepts(ValueKind::Int));
        assert!(!ValueKind::Int.accepts(ValueKind::Float));
    }

    #[test]
    fn converts_from_json() {
        let json = serde_json::json!({"x": 1, "y": 2.5, "tags": ["a"], "none": null});
        let value = Value::from(json);
        assert_eq!(value.field("x"), Some(&Value::Int(1)));
        assert_eq!(value.field("y"), Some(&Value::Float(2.5)));
        assert_eq!(value.field("tags"), Some(&Value::List(vec![Value::from("a")])));
        assert!(value.field("none").is_some_and(Value::is_null));

        let names: Vec<&str> = match &value {
            Value::Record(fields) => fields.iter().map(|(k, _)| k.as_str()).collect(),
            other => panic!("expected record, got {other:?}"),
        };
        assert_eq!(names, ["x", "y", "tags", "none"]);
    }

    #[test]
    fn json_objects_keep_source_field_order() {
        let value = Value::from(serde_json::json!({"y": 1, "x": 2}));
        assert_eq!(
            value,
            Value::record([("y", Value::Int(1)), ("x", Value::Int(2))])
        );
    }

    fn nested_list(depth: usize) -> Value {
        let mut value = Value::Int(0);
        for _ in 0..depth {
            value = Value::List(vec![value]);
        }
        value
    }

    #[test]
    fn bincode_round_trip_keeps_shape() {
        let value = Value::record([
            ("name", Value::from("p")),
            ("at", Value::List(vec![Value::Float(1.5), Value::Null])),
            ("inner", Value::record([("ok", Value::Bool(true))])),
        ]);
        let bytes = bincode::serialize(&value).unwrap();
        assert_eq!(bincode::deserialize::<Value>(&bytes).unwrap(), value);
    }

    #[test]
    fn decoding_rejects_excessive_nesting() {
        let ok = nested_list(MAX_VALUE_DEPTH);
        let bytes = bincode::serialize(&ok).unwrap();
        assert_eq!(bincode::deserialize::<Value>(&bytes).unwrap(), ok);

        let deep = nested_list(MAX_VALUE_DEPTH + 1);
        let bytes = bincode::serialize(&deep).unwrap();
        let err = bincode::deserialize::<Value>(&bytes).unwrap_err();
        assert!(err.to_string().contains("nesting"), "{err}");
    }
}
