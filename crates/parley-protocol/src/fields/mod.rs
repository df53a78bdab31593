//! Field type system.
//!
//! A closed sum type ([`FieldType`]) describes what a speech-act field may
//! hold; [`Value`] is the runtime value. Validation and the wire mapping
//! are exhaustive matches over both.
//!
//! Set elements and dict keys are restricted to hashable scalars
//! (`bytes`, `str`, `int`, `bool`) and carried as [`Key`]. Sets go on the
//! wire in key order; dicts keep their insertion order.
pub mod parse;
pub(crate) mod wire;

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;

use crate::error::{DecodeError, ProtocolError, TypeError};

pub use parse::{parse_type, CustomTypes};

/// Primitive field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bytes,
    Str,
    Int,
    Float,
    Bool,
}

impl ScalarType {
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Bytes => "pt:bytes",
            ScalarType::Str => "pt:str",
            ScalarType::Int => "pt:int",
            ScalarType::Float => "pt:float",
            ScalarType::Bool => "pt:bool",
        }
    }

    /// Usable as a set element / dict key.
    pub fn is_hashable(self) -> bool {
        !matches!(self, ScalarType::Float)
    }

    fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ScalarType::Bytes, Value::Bytes(_))
                | (ScalarType::Str, Value::Str(_))
                | (ScalarType::Int, Value::Int(_))
                | (ScalarType::Float, Value::Float(_))
                | (ScalarType::Bool, Value::Bool(_))
        )
    }

    fn matches_key(self, key: &Key) -> bool {
        matches!(
            (self, key),
            (ScalarType::Bytes, Key::Bytes(_))
                | (ScalarType::Str, Key::Str(_))
                | (ScalarType::Int, Key::Int(_))
                | (ScalarType::Bool, Key::Bool(_))
        )
    }
}

/// A named record type (`ct:Name` in specification sources).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    name: String,
    fields: Vec<(String, FieldType)>,
}

impl StructType {
    pub fn new(name: impl Into<String>, fields: Vec<(String, FieldType)>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields, in declaration order.
    pub fn fields(&self) -> &[(String, FieldType)] {
        &self.fields
    }

    fn validate(&self, values: &[(String, Value)]) -> Result<(), TypeError> {
        if values.len() != self.fields.len() {
            return Err(self.error(format!(
                "expected {} fields, found {}",
                self.fields.len(),
                values.len()
            )));
        }
        for ((name, ty), (value_name, value)) in self.fields.iter().zip(values) {
            if name != value_name {
                return Err(self.error(format!("expected field `{name}`, found `{value_name}`")));
            }
            ty.validate(value)
                .map_err(|e| self.error(format!("field `{name}`: {e}")))?;
        }
        Ok(())
    }

    fn error(&self, reason: String) -> TypeError {
        TypeError::Struct {
            name: self.name.clone(),
            reason,
        }
    }
}

/// Type of a speech-act field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Scalar(ScalarType),
    Optional(Box<FieldType>),
    /// Members are tried in declaration order when decoding.
    Union(Vec<FieldType>),
    Set(Box<FieldType>),
    List(Box<FieldType>),
    Dict(Box<FieldType>, Box<FieldType>),
    Struct(StructType),
}

impl FieldType {
    pub fn bytes() -> Self {
        FieldType::Scalar(ScalarType::Bytes)
    }

    pub fn str() -> Self {
        FieldType::Scalar(ScalarType::Str)
    }

    pub fn int() -> Self {
        FieldType::Scalar(ScalarType::Int)
    }

    pub fn float() -> Self {
        FieldType::Scalar(ScalarType::Float)
    }

    pub fn bool() -> Self {
        FieldType::Scalar(ScalarType::Bool)
    }

    pub fn optional(inner: FieldType) -> Self {
        FieldType::Optional(Box::new(inner))
    }

    pub fn set(element: FieldType) -> Self {
        FieldType::Set(Box::new(element))
    }

    pub fn list(element: FieldType) -> Self {
        FieldType::List(Box::new(element))
    }

    pub fn dict(key: FieldType, value: FieldType) -> Self {
        FieldType::Dict(Box::new(key), Box::new(value))
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, FieldType::Optional(_))
    }

    /// Structural well-formedness, checked once when a specification loads.
    ///
    /// Returns a human-readable reason on failure.
    pub fn check(&self) -> Result<(), String> {
        match self {
            FieldType::Scalar(_) => Ok(()),
            FieldType::Optional(inner) | FieldType::List(inner) => inner.check(),
            FieldType::Set(element) => check_key_type(element, "set element"),
            FieldType::Dict(key, value) => {
                check_key_type(key, "dict key")?;
                value.check()
            }
            FieldType::Union(members) => {
                if members.is_empty() {
                    return Err("union has no members".into());
                }
                for (i, member) in members.iter().enumerate() {
                    if members[..i].contains(member) {
                        return Err(format!("union member {member} declared twice"));
                    }
                    member.check()?;
                }
                Ok(())
            }
            FieldType::Struct(st) => {
                if st.name.is_empty() {
                    return Err("struct has no name".into());
                }
                for (i, (name, ty)) in st.fields.iter().enumerate() {
                    if st.fields[..i].iter().any(|(n, _)| n == name) {
                        return Err(format!("struct {} declares `{name}` twice", st.name));
                    }
                    ty.check()?;
                }
                Ok(())
            }
        }
    }

    /// Check `value` against this type.
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (FieldType::Scalar(scalar), value) if scalar.matches(value) => Ok(()),
            (FieldType::Optional(_), Value::Optional(None)) => Ok(()),
            (FieldType::Optional(inner), Value::Optional(Some(value))) => inner.validate(value),
            (FieldType::Union(members), value) => {
                if members.iter().any(|m| m.validate(value).is_ok()) {
                    Ok(())
                } else {
                    Err(TypeError::NoUnionMember {
                        union: self.to_string(),
                    })
                }
            }
            (FieldType::Set(element), Value::Set(keys)) => {
                keys.iter().try_for_each(|k| element.validate_key(k))
            }
            (FieldType::List(element), Value::List(items)) => {
                items.iter().try_for_each(|v| element.validate(v))
            }
            (FieldType::Dict(key_ty, value_ty), Value::Dict(entries)) => {
                entries.iter().try_for_each(|(k, v)| {
                    key_ty.validate_key(k)?;
                    value_ty.validate(v)
                })
            }
            (FieldType::Struct(st), Value::Struct(fields)) => st.validate(fields),
            (ty, value) => Err(TypeError::Mismatch {
                expected: ty.to_string(),
                found: value.kind(),
            }),
        }
    }

    fn validate_key(&self, key: &Key) -> Result<(), TypeError> {
        match self {
            FieldType::Scalar(scalar) if scalar.matches_key(key) => Ok(()),
            ty => Err(TypeError::Mismatch {
                expected: ty.to_string(),
                found: key.kind(),
            }),
        }
    }

    /// Validate, then encode a standalone value as MessagePack.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, ProtocolError> {
        self.validate(value)
            .map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        Ok(rmp_serde::to_vec(&wire::to_wire(value))?)
    }

    /// Decode a standalone value produced by [`FieldType::encode`].
    pub fn decode(&self, data: &[u8]) -> Result<Value, DecodeError> {
        let raw: wire::WireValue = wire::read_exact(data)?;
        Ok(wire::from_wire(&raw, self)?)
    }
}

fn check_key_type(ty: &FieldType, what: &str) -> Result<(), String> {
    match ty {
        FieldType::Scalar(scalar) if scalar.is_hashable() => Ok(()),
        other => Err(format!(
            "{what} must be one of pt:bytes, pt:str, pt:int, pt:bool, found {other}"
        )),
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Scalar(scalar) => f.write_str(scalar.name()),
            FieldType::Optional(inner) => write!(f, "pt:optional[{inner}]"),
            FieldType::Union(members) => {
                f.write_str("pt:union[")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{member}")?;
                }
                f.write_str("]")
            }
            FieldType::Set(element) => write!(f, "pt:set[{element}]"),
            FieldType::List(element) => write!(f, "pt:list[{element}]"),
            FieldType::Dict(key, value) => write!(f, "pt:dict[{key}, {value}]"),
            FieldType::Struct(st) => write!(f, "ct:{}", st.name),
        }
    }
}

/// Hashable, totally ordered scalar: a set element or dict key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Bytes(Vec<u8>),
    Str(String),
    Int(i64),
    Bool(bool),
}

impl Key {
    pub fn kind(&self) -> &'static str {
        match self {
            Key::Bytes(_) => "bytes",
            Key::Str(_) => "str",
            Key::Int(_) => "int",
            Key::Bool(_) => "bool",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Key::Bool(b)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Bytes(b) => Value::Bytes(b),
            Key::Str(s) => Value::Str(s),
            Key::Int(n) => Value::Int(n),
            Key::Bool(b) => Value::Bool(b),
        }
    }
}

impl TryFrom<Value> for Key {
    type Error = TypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bytes(b) => Ok(Key::Bytes(b)),
            Value::Str(s) => Ok(Key::Str(s)),
            Value::Int(n) => Ok(Key::Int(n)),
            Value::Bool(b) => Ok(Key::Bool(b)),
            other => Err(TypeError::Mismatch {
                expected: "hashable scalar".into(),
                found: other.kind(),
            }),
        }
    }
}

/// Runtime value of a speech-act field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bytes(Vec<u8>),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Optional(Option<Box<Value>>),
    Set(BTreeSet<Key>),
    List(Vec<Value>),
    /// Entries in insertion order. Equality ignores order.
    Dict(IndexMap<Key, Value>),
    /// Field values in the struct's declaration order.
    Struct(Vec<(String, Value)>),
}

impl Value {
    /// An absent optional.
    pub fn none() -> Self {
        Value::Optional(None)
    }

    /// A present optional.
    pub fn some(value: impl Into<Value>) -> Self {
        Value::Optional(Some(Box::new(value.into())))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bytes(_) => "bytes",
            Value::Str(_) => "str",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Optional(_) => "optional",
            Value::Set(_) => "set",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Struct(_) => "struct",
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// `Some(inner)` for an optional value, where `inner` is `None` if absent.
    pub fn as_optional(&self) -> Option<Option<&Value>> {
        match self {
            Value::Optional(inner) => Some(inner.as_deref()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<Key>> {
        match self {
            Value::Set(keys) => Some(keys),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&IndexMap<Key, Value>> {
        match self {
            Value::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a field of a struct value.
    pub fn struct_field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Option<Value>> for Value {
    fn from(opt: Option<Value>) -> Self {
        Value::Optional(opt.map(Box::new))
    }
}
