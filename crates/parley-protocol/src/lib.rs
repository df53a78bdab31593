//! Parley protocol layer.
//!
//! Compiles declarative protocol specifications (speech acts with typed
//! contents, a reply graph, two roles, end states) into immutable
//! schemas, and validates every two-party dialogue conducted under them.
//!
//! Wire format: MessagePack (compact binary).
//! Specification sources: YAML or JSON.

pub mod dialogue;
pub mod error;
pub mod fields;
pub mod message;
pub mod protocols;
pub mod spec;
pub mod typed;
pub mod types;

pub use dialogue::{
    AgentDialogues, Dialogue, DialogueLabel, DialogueRegistry, DialogueState, DialogueStats,
    RegistryConfig, StatsSnapshot,
};
pub use error::{DecodeError, DialogueError, FieldError, ProtocolError, SpecError, TypeError};
pub use fields::{parse_type, FieldType, Key, ScalarType, StructType, Value};
pub use message::{Message, MessageBuilder, Routing};
pub use protocols::NegotiationAct;
pub use spec::{
    EndState, ProtocolSpecification, Role, RoleSet, SpecificationSource, SpeechActSchema,
};
pub use typed::SpeechAct;
pub use types::{
    Address, DialogueReference, ProtocolId, MAX_MESSAGE_SIZE, MAX_NESTING_DEPTH, REFERENCE_SENTINEL,
    STARTING_MESSAGE_ID, STARTING_TARGET,
};
