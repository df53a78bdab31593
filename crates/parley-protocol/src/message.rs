use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, FieldError, ProtocolError};
use crate::fields::wire::{self, WireValue};
use crate::fields::Value;
use crate::spec::ProtocolSpecification;
use crate::types::{
    DialogueReference, ProtocolId, MAX_MESSAGE_SIZE, REFERENCE_SENTINEL, STARTING_MESSAGE_ID,
    STARTING_TARGET,
};

/// Routing metadata of a message: which dialogue, which position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routing {
    pub reference: DialogueReference,
    pub message_id: u64,
    pub target: u64,
}

impl Routing {
    /// Routing for the first message of a dialogue.
    pub fn opening(reference: DialogueReference) -> Self {
        Self {
            reference,
            message_id: STARTING_MESSAGE_ID,
            target: STARTING_TARGET,
        }
    }
}

/// A validated speech act plus its routing metadata.
///
/// Built with [`Message::build`] (or [`MessageBuilder`]) against a
/// [`ProtocolSpecification`], or decoded with [`Message::from_bytes`].
/// Fields are kept in schema order; every declared field is present,
/// absent optionals as `Value::Optional(None)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    protocol: ProtocolId,
    reference: DialogueReference,
    message_id: u64,
    target: u64,
    performative: String,
    fields: Vec<(String, Value)>,
}

/// On-the-wire layout. Struct fields serialize as a MessagePack array.
#[derive(Serialize, Deserialize)]
struct WireMessage {
    protocol: String,
    dialogue_reference: (String, String),
    message_id: u64,
    target: u64,
    performative: String,
    body: Vec<(String, WireValue)>,
}

impl Message {
    /// Check `fields` against the schema of `performative` and build a message.
    ///
    /// A bare value given for an optional field is wrapped as present;
    /// an omitted optional field is stored as absent.
    pub fn build<K, I>(
        spec: &ProtocolSpecification,
        performative: &str,
        fields: I,
        routing: Routing,
    ) -> Result<Self, FieldError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let schema = spec
            .speech_act(performative)
            .ok_or_else(|| FieldError::UnknownPerformative(performative.to_string()))?;

        let mut given: BTreeMap<String, Value> = fields
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();
        if let Some(extra) = given.keys().find(|name| schema.field(name).is_none()) {
            return Err(FieldError::Undeclared {
                performative: performative.to_string(),
                field: extra.clone(),
            });
        }

        let mut values = Vec::with_capacity(schema.fields().len());
        for (name, ty) in schema.fields() {
            let value = match given.remove(name) {
                Some(value @ Value::Optional(_)) => value,
                Some(value) if ty.is_optional() => Value::some(value),
                Some(value) => value,
                None if ty.is_optional() => Value::none(),
                None => {
                    return Err(FieldError::Missing {
                        performative: performative.to_string(),
                        field: name.clone(),
                    })
                }
            };
            ty.validate(&value).map_err(|source| FieldError::Type {
                field: name.clone(),
                source,
            })?;
            values.push((name.clone(), value));
        }

        Ok(Self {
            protocol: spec.id().clone(),
            reference: routing.reference,
            message_id: routing.message_id,
            target: routing.target,
            performative: performative.to_string(),
            fields: values,
        })
    }

    pub fn builder(performative: impl Into<String>) -> MessageBuilder {
        MessageBuilder::new(performative)
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn protocol(&self) -> &ProtocolId {
        &self.protocol
    }

    pub fn reference(&self) -> &DialogueReference {
        &self.reference
    }

    pub fn message_id(&self) -> u64 {
        self.message_id
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn performative(&self) -> &str {
        &self.performative
    }

    /// All fields, in schema order.
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Whether this message claims to open a dialogue.
    pub fn is_opener(&self) -> bool {
        self.target == STARTING_TARGET
    }

    // ── Codec ────────────────────────────────────────────────────────────

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let body = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), wire::to_wire(value)))
            .collect();
        let message = WireMessage {
            protocol: self.protocol.to_string(),
            dialogue_reference: (
                self.reference.initiator_half().to_string(),
                self.reference.responder_half().to_string(),
            ),
            message_id: self.message_id,
            target: self.target,
            performative: self.performative.clone(),
            body,
        };
        Ok(rmp_serde::to_vec(&message)?)
    }

    /// Deserialize from MessagePack bytes, validating against `spec`.
    pub fn from_bytes(data: &[u8], spec: &ProtocolSpecification) -> Result<Self, DecodeError> {
        Self::from_bytes_limited(data, spec, MAX_MESSAGE_SIZE)
    }

    /// Like [`Message::from_bytes`] with an explicit size limit.
    pub fn from_bytes_limited(
        data: &[u8],
        spec: &ProtocolSpecification,
        max_size: usize,
    ) -> Result<Self, DecodeError> {
        if data.len() > max_size {
            return Err(DecodeError::TooLarge {
                size: data.len(),
                max: max_size,
            });
        }
        let raw: WireMessage = wire::read_exact(data)?;

        let expected = spec.id().to_string();
        if raw.protocol != expected {
            return Err(DecodeError::ProtocolMismatch {
                expected,
                found: raw.protocol,
            });
        }

        let (initiator, responder) = raw.dialogue_reference;
        if initiator == REFERENCE_SENTINEL {
            return Err(DecodeError::InvalidReference {
                reason: "initiator half is empty".into(),
            });
        }
        if raw.message_id < STARTING_MESSAGE_ID {
            return Err(DecodeError::Malformed(format!(
                "message id {} below {STARTING_MESSAGE_ID}",
                raw.message_id
            )));
        }

        let performative = raw.performative;
        let schema = spec
            .speech_act(&performative)
            .ok_or_else(|| FieldError::UnknownPerformative(performative.clone()))?;

        let mut body: BTreeMap<String, WireValue> = BTreeMap::new();
        for (name, value) in raw.body {
            if schema.field(&name).is_none() {
                return Err(FieldError::Undeclared {
                    performative,
                    field: name,
                }
                .into());
            }
            if body.insert(name.clone(), value).is_some() {
                return Err(DecodeError::Malformed(format!("field `{name}` repeated")));
            }
        }

        let mut fields = Vec::with_capacity(schema.fields().len());
        for (name, ty) in schema.fields() {
            let raw_value = body.get(name).ok_or_else(|| FieldError::Missing {
                performative: performative.clone(),
                field: name.clone(),
            })?;
            let value = wire::from_wire(raw_value, ty).map_err(|source| FieldError::Type {
                field: name.clone(),
                source,
            })?;
            fields.push((name.clone(), value));
        }

        Ok(Self {
            protocol: spec.id().clone(),
            reference: DialogueReference::new(initiator, responder),
            message_id: raw.message_id,
            target: raw.target,
            performative,
            fields,
        })
    }
}

/// Fluent builder for messages.
///
/// # Example
/// ```ignore
/// let msg = Message::builder("propose")
///     .field("price", 12.5)
///     .field("items", Value::List(vec!["apples".into()]))
///     .build(&spec, routing)?;
/// ```
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    performative: String,
    fields: Vec<(String, Value)>,
}

impl MessageBuilder {
    pub fn new(performative: impl Into<String>) -> Self {
        Self {
            performative: performative.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn build(
        self,
        spec: &ProtocolSpecification,
        routing: Routing,
    ) -> Result<Message, FieldError> {
        Message::build(spec, &self.performative, self.fields, routing)
    }
}
