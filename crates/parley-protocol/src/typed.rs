//! Typed speech acts.
//!
//! A protocol can expose its performatives as a closed enum (one variant
//! per performative, typed fields) instead of name/value pairs. The
//! schema still governs: every conversion goes through [`Message::build`]
//! or a decoded [`Message`].
use std::collections::BTreeMap;

use crate::error::{FieldError, TypeError};
use crate::fields::{Key, Value};
use crate::message::Message;

/// Conversion between a typed per-protocol enum and dialogue messages.
pub trait SpeechAct: Sized {
    /// Performative of this variant.
    fn performative(&self) -> &'static str;

    /// Field values in the shape [`Message::build`] expects.
    fn to_fields(&self) -> Vec<(String, Value)>;

    /// Read a validated message back into its variant.
    fn from_message(message: &Message) -> Result<Self, FieldError>;
}

// ── Field extraction helpers for `SpeechAct` impls ───────────────────────

/// The value of a required field.
pub fn field<'a>(message: &'a Message, name: &str) -> Result<&'a Value, FieldError> {
    message.get(name).ok_or_else(|| FieldError::Missing {
        performative: message.performative().to_string(),
        field: name.to_string(),
    })
}

pub fn float_field(message: &Message, name: &str) -> Result<f64, FieldError> {
    let value = field(message, name)?;
    value
        .as_float()
        .ok_or_else(|| mismatch(name, "pt:float", value))
}

pub fn str_list_field(message: &Message, name: &str) -> Result<Vec<String>, FieldError> {
    let value = field(message, name)?;
    value
        .as_list()
        .and_then(|items| {
            items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| mismatch(name, "pt:list[pt:str]", value))
}

/// An optional string field; `None` when absent.
pub fn optional_str_field(message: &Message, name: &str) -> Result<Option<String>, FieldError> {
    let value = field(message, name)?;
    match value.as_optional() {
        Some(None) => Ok(None),
        Some(Some(inner)) => inner
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| mismatch(name, "pt:optional[pt:str]", value)),
        None => Err(mismatch(name, "pt:optional[pt:str]", value)),
    }
}

/// A `dict[str, int]` value as a map.
pub fn str_int_map(value: &Value) -> Option<BTreeMap<String, i64>> {
    value
        .as_dict()?
        .iter()
        .map(|(k, v)| Some((k.as_str()?.to_string(), v.as_int()?)))
        .collect()
}

/// The inverse of [`str_int_map`].
pub fn str_int_dict(map: &BTreeMap<String, i64>) -> Value {
    Value::Dict(
        map.iter()
            .map(|(k, v)| (Key::from(k.as_str()), Value::Int(*v)))
            .collect(),
    )
}

pub fn mismatch(field: &str, expected: &str, found: &Value) -> FieldError {
    FieldError::Type {
        field: field.to_string(),
        source: TypeError::Mismatch {
            expected: expected.to_string(),
            found: found.kind(),
        },
    }
}
