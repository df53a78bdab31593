/// Error kinds for the Parley protocol layer.
///
/// One enum per concern. `SpecError` is the only fatal one (load time);
/// everything else is reported to the caller and leaves registry state
/// untouched.
use crate::types::ProtocolId;

/// Specification failed to load. Fatal for that protocol.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("malformed specification source: {0}")]
    Source(String),

    #[error("invalid protocol identity: {reason}")]
    InvalidIdentity { reason: String },

    #[error("invalid type `{ty}`: {reason}")]
    InvalidType { ty: String, reason: String },

    #[error("performative `{performative}`: invalid content name `{name}`")]
    InvalidContentName { performative: String, name: String },

    #[error("undeclared performative `{performative}` referenced in {context}")]
    UndeclaredPerformative {
        performative: String,
        context: &'static str,
    },

    #[error("performative `{0}` has no entry in the reply table")]
    MissingReplyEntry(String),

    #[error("reply graph has no terminal performative")]
    NoTerminalPerformative,

    #[error("no initiating performative could be designated")]
    NoInitiatingPerformative,

    #[error("expected exactly two roles, found {0}")]
    RoleCount(usize),

    #[error("duplicate {kind} `{name}`")]
    Duplicate { kind: &'static str, name: String },

    #[error("unknown role `{0}`")]
    UnknownRole(String),

    #[error("unknown end state `{0}`")]
    UnknownEndState(String),

    #[error("outcome bound to non-terminal performative `{0}`")]
    NonTerminalOutcome(String),
}

impl From<serde_yaml::Error> for SpecError {
    fn from(e: serde_yaml::Error) -> Self {
        SpecError::Source(e.to_string())
    }
}

impl From<serde_json::Error> for SpecError {
    fn from(e: serde_json::Error) -> Self {
        SpecError::Source(e.to_string())
    }
}

/// A value does not conform to its `FieldType`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("expected {expected}, found {found}")]
    Mismatch { expected: String, found: &'static str },

    #[error("struct {name}: {reason}")]
    Struct { name: String, reason: String },

    #[error("no member of {union} matched")]
    NoUnionMember { union: String },

    #[error("duplicate {container} entry")]
    DuplicateEntry { container: &'static str },

    #[error("integer {0} out of range")]
    IntegerRange(u64),
}

/// Message construction (or decoded content) does not fit the schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("unknown performative `{0}`")]
    UnknownPerformative(String),

    #[error("performative `{performative}`: missing field `{field}`")]
    Missing { performative: String, field: String },

    #[error("performative `{performative}`: undeclared field `{field}`")]
    Undeclared { performative: String, field: String },

    #[error("field `{field}`: {source}")]
    Type {
        field: String,
        #[source]
        source: TypeError,
    },
}

/// Inbound bytes could not be turned into a validated message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    #[error("payload of {size} bytes exceeds limit of {max}")]
    TooLarge { size: usize, max: usize },

    #[error("message for protocol `{found}`, expected `{expected}`")]
    ProtocolMismatch { expected: String, found: String },

    #[error("invalid dialogue reference: {reason}")]
    InvalidReference { reason: String },

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Field(#[from] FieldError),
}

impl From<rmp_serde::decode::Error> for DecodeError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        DecodeError::Malformed(e.to_string())
    }
}

/// A well-formed message violates the protocol ordering rules, or the
/// registry cannot place it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DialogueError {
    #[error(
        "out of order: expected id {expected_id} targeting {expected_target}, got id {message_id} targeting {target}"
    )]
    OutOfOrder {
        expected_id: u64,
        expected_target: u64,
        message_id: u64,
        target: u64,
    },

    #[error("illegal transition: `{performative}` cannot follow {after}")]
    IllegalTransition { after: String, performative: String },

    #[error("role `{role}` may not send `{performative}`")]
    RoleViolation { role: String, performative: String },

    #[error("dialogue {label} has ended")]
    TerminatedDialogue { label: String },

    #[error("no dialogue for reference {reference} with {opponent}")]
    UnknownDialogue { reference: String, opponent: String },

    #[error("reference {found} does not match dialogue reference {expected}")]
    ReferenceMismatch { expected: String, found: String },

    #[error("reference {reference} already in use")]
    ReferenceCollision { reference: String },

    #[error("cannot open a dialogue with self ({address})")]
    SelfAddressed { address: String },

    #[error("registry full ({capacity} dialogues)")]
    RegistryFull { capacity: usize },

    #[error("end state `{0}` is not declared by the protocol")]
    UnknownEndState(String),
}

/// Crate-level error wrapping every concern.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("specification error: {0}")]
    Spec(#[from] SpecError),

    #[error("field error: {0}")]
    Field(#[from] FieldError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("dialogue error: {0}")]
    Dialogue(#[from] DialogueError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unknown protocol `{0}`")]
    UnknownProtocol(ProtocolId),
}

impl From<rmp_serde::encode::Error> for ProtocolError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        ProtocolError::Serialization(e.to_string())
    }
}
