/// Structural MessagePack mapping for field values.
///
/// Encoding is value-directed (a [`Value`] knows its own shape);
/// decoding is type-directed, so the same bytes can be read as
/// different values depending on the declared [`FieldType`].
use std::collections::BTreeSet;
use std::fmt;
use std::io::Cursor;

use indexmap::IndexMap;

use serde::de::{
    self, Deserialize, DeserializeOwned, DeserializeSeed, Deserializer, MapAccess, SeqAccess,
    Visitor,
};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::{DecodeError, TypeError};
use crate::fields::{FieldType, Key, ScalarType, StructType, Value};
use crate::types::MAX_NESTING_DEPTH;

/// Schema-less MessagePack tree, as read off the wire.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WireValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bin(Vec<u8>),
    Array(Vec<WireValue>),
    Map(Vec<(WireValue, WireValue)>),
}

impl WireValue {
    fn kind(&self) -> &'static str {
        match self {
            WireValue::Nil => "nil",
            WireValue::Bool(_) => "bool",
            WireValue::Int(_) => "int",
            WireValue::Float(_) => "float",
            WireValue::Str(_) => "str",
            WireValue::Bin(_) => "bin",
            WireValue::Array(_) => "array",
            WireValue::Map(_) => "map",
        }
    }
}

impl Serialize for WireValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WireValue::Nil => serializer.serialize_unit(),
            WireValue::Bool(b) => serializer.serialize_bool(*b),
            WireValue::Int(n) => serializer.serialize_i64(*n),
            WireValue::Float(x) => serializer.serialize_f64(*x),
            WireValue::Str(s) => serializer.serialize_str(s),
            WireValue::Bin(b) => serializer.serialize_bytes(b),
            WireValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            WireValue::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for WireValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        WireSeed {
            remaining: MAX_NESTING_DEPTH,
        }
        .deserialize(deserializer)
    }
}

/// Reads one [`WireValue`], allowing at most `remaining` more levels of
/// arrays and maps below it.
#[derive(Clone, Copy)]
struct WireSeed {
    remaining: usize,
}

impl WireSeed {
    fn nested<E: de::Error>(self) -> Result<WireSeed, E> {
        match self.remaining.checked_sub(1) {
            Some(remaining) => Ok(WireSeed { remaining }),
            None => Err(E::custom(format!(
                "nesting deeper than {MAX_NESTING_DEPTH} levels"
            ))),
        }
    }
}

impl<'de> DeserializeSeed<'de> for WireSeed {
    type Value = WireValue;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<WireValue, D::Error> {
        deserializer.deserialize_any(WireVisitor(self))
    }
}

struct WireVisitor(WireSeed);

impl<'de> Visitor<'de> for WireVisitor {
    type Value = WireValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a MessagePack value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<WireValue, E> {
        Ok(WireValue::Nil)
    }

    fn visit_none<E: de::Error>(self) -> Result<WireValue, E> {
        Ok(WireValue::Nil)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<WireValue, D::Error> {
        self.0.deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<WireValue, E> {
        Ok(WireValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<WireValue, E> {
        Ok(WireValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<WireValue, E> {
        i64::try_from(v)
            .map(WireValue::Int)
            .map_err(|_| E::custom(TypeError::IntegerRange(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<WireValue, E> {
        Ok(WireValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<WireValue, E> {
        Ok(WireValue::Str(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<WireValue, E> {
        Ok(WireValue::Str(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<WireValue, E> {
        Ok(WireValue::Bin(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<WireValue, E> {
        Ok(WireValue::Bin(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<WireValue, A::Error> {
        let inner = self.0.nested()?;
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(1024));
        while let Some(item) = seq.next_element_seed(inner)? {
            items.push(item);
        }
        Ok(WireValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<WireValue, A::Error> {
        let inner = self.0.nested()?;
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0).min(1024));
        while let Some(key) = map.next_key_seed(inner)? {
            let value = map.next_value_seed(inner)?;
            entries.push((key, value));
        }
        Ok(WireValue::Map(entries))
    }
}

/// Deserialize exactly one MessagePack item from `data`; leftover bytes are an error.
pub(crate) fn read_exact<T: DeserializeOwned>(data: &[u8]) -> Result<T, DecodeError> {
    let mut cursor = Cursor::new(data);
    let item = {
        let mut de = rmp_serde::Deserializer::new(&mut cursor);
        T::deserialize(&mut de)?
    };
    let consumed = cursor.position() as usize;
    if consumed != data.len() {
        return Err(DecodeError::TrailingBytes(data.len() - consumed));
    }
    Ok(item)
}

pub(crate) fn to_wire(value: &Value) -> WireValue {
    match value {
        Value::Bytes(b) => WireValue::Bin(b.clone()),
        Value::Str(s) => WireValue::Str(s.clone()),
        Value::Int(n) => WireValue::Int(*n),
        Value::Float(x) => WireValue::Float(*x),
        Value::Bool(b) => WireValue::Bool(*b),
        Value::Optional(None) => WireValue::Array(vec![WireValue::Bool(false)]),
        Value::Optional(Some(inner)) => {
            WireValue::Array(vec![WireValue::Bool(true), to_wire(inner)])
        }
        Value::Set(keys) => WireValue::Array(keys.iter().map(key_to_wire).collect()),
        Value::List(items) => WireValue::Array(items.iter().map(to_wire).collect()),
        Value::Dict(entries) => WireValue::Map(
            entries
                .iter()
                .map(|(k, v)| (key_to_wire(k), to_wire(v)))
                .collect(),
        ),
        Value::Struct(fields) => WireValue::Map(
            fields
                .iter()
                .map(|(name, v)| (WireValue::Str(name.clone()), to_wire(v)))
                .collect(),
        ),
    }
}

fn key_to_wire(key: &Key) -> WireValue {
    match key {
        Key::Bytes(b) => WireValue::Bin(b.clone()),
        Key::Str(s) => WireValue::Str(s.clone()),
        Key::Int(n) => WireValue::Int(*n),
        Key::Bool(b) => WireValue::Bool(*b),
    }
}

/// Read `wire` as a value of type `ty`.
pub(crate) fn from_wire(wire: &WireValue, ty: &FieldType) -> Result<Value, TypeError> {
    match (ty, wire) {
        (FieldType::Scalar(ScalarType::Bytes), WireValue::Bin(b)) => Ok(Value::Bytes(b.clone())),
        (FieldType::Scalar(ScalarType::Str), WireValue::Str(s)) => Ok(Value::Str(s.clone())),
        (FieldType::Scalar(ScalarType::Int), WireValue::Int(n)) => Ok(Value::Int(*n)),
        (FieldType::Scalar(ScalarType::Float), WireValue::Float(x)) => Ok(Value::Float(*x)),
        (FieldType::Scalar(ScalarType::Bool), WireValue::Bool(b)) => Ok(Value::Bool(*b)),
        (FieldType::Optional(inner), WireValue::Array(items)) => match items.as_slice() {
            [WireValue::Bool(false)] => Ok(Value::Optional(None)),
            [WireValue::Bool(true), value] => {
                Ok(Value::Optional(Some(Box::new(from_wire(value, inner)?))))
            }
            _ => Err(mismatch(ty, wire)),
        },
        (FieldType::Union(members), wire) => members
            .iter()
            .find_map(|member| from_wire(wire, member).ok())
            .ok_or_else(|| TypeError::NoUnionMember {
                union: ty.to_string(),
            }),
        (FieldType::Set(element), WireValue::Array(items)) => {
            let mut keys = BTreeSet::new();
            for item in items {
                let key = Key::try_from(from_wire(item, element)?)?;
                if !keys.insert(key) {
                    return Err(TypeError::DuplicateEntry { container: "set" });
                }
            }
            Ok(Value::Set(keys))
        }
        (FieldType::List(element), WireValue::Array(items)) => items
            .iter()
            .map(|item| from_wire(item, element))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        (FieldType::Dict(key_ty, value_ty), WireValue::Map(entries)) => {
            let mut map = IndexMap::with_capacity(entries.len());
            for (k, v) in entries {
                let key = Key::try_from(from_wire(k, key_ty)?)?;
                let value = from_wire(v, value_ty)?;
                if map.insert(key, value).is_some() {
                    return Err(TypeError::DuplicateEntry { container: "dict" });
                }
            }
            Ok(Value::Dict(map))
        }
        (FieldType::Struct(st), WireValue::Map(entries)) => struct_from_wire(st, entries),
        (ty, wire) => Err(mismatch(ty, wire)),
    }
}

fn struct_from_wire(
    st: &StructType,
    entries: &[(WireValue, WireValue)],
) -> Result<Value, TypeError> {
    let error = |reason: String| TypeError::Struct {
        name: st.name().to_string(),
        reason,
    };
    if entries.len() != st.fields().len() {
        return Err(error(format!(
            "expected {} fields, found {}",
            st.fields().len(),
            entries.len()
        )));
    }
    let mut fields = Vec::with_capacity(st.fields().len());
    for (name, field_ty) in st.fields() {
        let raw = entries
            .iter()
            .find(|(k, _)| matches!(k, WireValue::Str(s) if s == name))
            .map(|(_, v)| v)
            .ok_or_else(|| error(format!("missing field `{name}`")))?;
        let value =
            from_wire(raw, field_ty).map_err(|e| error(format!("field `{name}`: {e}")))?;
        fields.push((name.clone(), value));
    }
    Ok(Value::Struct(fields))
}

fn mismatch(ty: &FieldType, wire: &WireValue) -> TypeError {
    TypeError::Mismatch {
        expected: ty.to_string(),
        found: wire.kind(),
    }
}
