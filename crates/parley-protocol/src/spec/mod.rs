//! Compiled protocol specifications.
//!
//! A [`ProtocolSpecification`] is built once from a
//! [`SpecificationSource`], checked exhaustively, and then shared
//! read-only (behind an `Arc`) by every dialogue of that protocol.
//! Nothing here is re-validated per message.
pub mod source;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SpecError;
use crate::fields::{parse_type, CustomTypes, FieldType, StructType};
use crate::types::{ProtocolId, RESERVED_NAMES};

pub use source::{OrderedMap, SpecificationSource};

/// Side of a two-party dialogue.
///
/// Fixed at dialogue creation: whoever sends the first message is the
/// initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    pub fn counterpart(self) -> Self {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }
}

/// Named terminal outcome of a dialogue (e.g. `successful`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndState(String);

impl EndState {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Schema of one speech act: its performative and typed contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechActSchema {
    performative: String,
    fields: Vec<(String, FieldType)>,
}

impl SpeechActSchema {
    pub fn performative(&self) -> &str {
        &self.performative
    }

    /// Declared contents, in declaration order.
    pub fn fields(&self) -> &[(String, FieldType)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldType> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
}

/// The two role names of a protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSet {
    initiator: String,
    responder: String,
}

impl RoleSet {
    pub fn name(&self, role: Role) -> &str {
        match role {
            Role::Initiator => &self.initiator,
            Role::Responder => &self.responder,
        }
    }

    pub fn role(&self, name: &str) -> Option<Role> {
        if name == self.initiator {
            Some(Role::Initiator)
        } else if name == self.responder {
            Some(Role::Responder)
        } else {
            None
        }
    }
}

/// Immutable, validated description of one protocol.
#[derive(Debug, Clone)]
pub struct ProtocolSpecification {
    id: ProtocolId,
    description: Option<String>,
    /// Declaration order.
    speech_acts: Vec<SpeechActSchema>,
    reply: BTreeMap<String, Vec<String>>,
    roles: RoleSet,
    end_states: Vec<EndState>,
    initiation: BTreeSet<String>,
    /// Roles absent from this map may send anything.
    speakers: BTreeMap<Role, BTreeSet<String>>,
    outcomes: BTreeMap<String, EndState>,
}

impl ProtocolSpecification {
    /// Parse a YAML source and load it.
    pub fn from_yaml(text: &str) -> Result<Self, SpecError> {
        Self::load(SpecificationSource::from_yaml(text)?)
    }

    /// Parse a JSON source and load it.
    pub fn from_json(text: &str) -> Result<Self, SpecError> {
        Self::load(SpecificationSource::from_json(text)?)
    }

    /// Compile and check a specification source. Any inconsistency is a
    /// `SpecError`; a loaded specification never fails at message time
    /// because of its own shape.
    pub fn load(source: SpecificationSource) -> Result<Self, SpecError> {
        let id = ProtocolId::new(&source.author, &source.name, &source.version);
        for (what, value) in [
            ("author", &source.author),
            ("name", &source.name),
            ("version", &source.version),
        ] {
            if value.trim().is_empty() {
                return Err(SpecError::InvalidIdentity {
                    reason: format!("{what} is empty"),
                });
            }
        }

        let custom = load_custom_types(&source.custom_types)?;
        let speech_acts = load_speech_acts(&source.speech_acts, &custom)?;
        let declared: BTreeSet<&str> = speech_acts.iter().map(|s| s.performative.as_str()).collect();

        // Reply graph
        let mut reply = BTreeMap::new();
        for (performative, replies) in source.reply.iter() {
            require_declared(&declared, performative, "reply table")?;
            let mut seen = BTreeSet::new();
            for r in replies {
                require_declared(&declared, r, "reply table")?;
                if !seen.insert(r.as_str()) {
                    return Err(SpecError::Duplicate {
                        kind: "reply",
                        name: format!("{performative} -> {r}"),
                    });
                }
            }
            reply.insert(performative.to_string(), replies.clone());
        }
        if let Some(missing) = declared.iter().find(|p| !reply.contains_key(**p)) {
            return Err(SpecError::MissingReplyEntry(missing.to_string()));
        }
        if !reply.values().any(Vec::is_empty) {
            return Err(SpecError::NoTerminalPerformative);
        }

        // Roles
        let roles = match source.roles.as_slice() {
            [initiator, responder] if initiator != responder => RoleSet {
                initiator: initiator.clone(),
                responder: responder.clone(),
            },
            [same, _] => {
                return Err(SpecError::Duplicate {
                    kind: "role",
                    name: same.clone(),
                })
            }
            other => return Err(SpecError::RoleCount(other.len())),
        };

        // End states
        let mut end_states: Vec<EndState> = Vec::with_capacity(source.end_states.len());
        for name in &source.end_states {
            let state = EndState::new(name);
            if end_states.contains(&state) {
                return Err(SpecError::Duplicate {
                    kind: "end state",
                    name: name.clone(),
                });
            }
            end_states.push(state);
        }

        // Openers
        let initiation: BTreeSet<String> = match &source.initiation {
            Some(openers) => {
                for p in openers {
                    require_declared(&declared, p, "initiation")?;
                }
                openers.iter().cloned().collect()
            }
            None => {
                let replies: BTreeSet<&str> =
                    reply.values().flatten().map(String::as_str).collect();
                declared
                    .iter()
                    .filter(|p| !replies.contains(**p))
                    .map(|p| p.to_string())
                    .collect()
            }
        };
        if initiation.is_empty() {
            return Err(SpecError::NoInitiatingPerformative);
        }

        // Speakers
        let mut speakers = BTreeMap::new();
        for (role_name, performatives) in source.speakers.iter() {
            let role = roles
                .role(role_name)
                .ok_or_else(|| SpecError::UnknownRole(role_name.to_string()))?;
            for p in performatives {
                require_declared(&declared, p, "speakers")?;
            }
            speakers.insert(role, performatives.iter().cloned().collect());
        }

        // Outcomes
        let mut outcomes = BTreeMap::new();
        for (performative, end_state) in source.terminal_outcomes.iter() {
            require_declared(&declared, performative, "terminal outcomes")?;
            if reply.get(performative).is_some_and(|r| !r.is_empty()) {
                return Err(SpecError::NonTerminalOutcome(performative.to_string()));
            }
            let state = EndState::new(end_state);
            if !end_states.contains(&state) {
                return Err(SpecError::UnknownEndState(end_state.clone()));
            }
            outcomes.insert(performative.to_string(), state);
        }

        tracing::debug!(
            "loaded protocol {id}: {} speech acts, openers {:?}",
            speech_acts.len(),
            initiation
        );

        Ok(Self {
            id,
            description: source.description,
            speech_acts,
            reply,
            roles,
            end_states,
            initiation,
            speakers,
            outcomes,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn id(&self) -> &ProtocolId {
        &self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn speech_act(&self, performative: &str) -> Option<&SpeechActSchema> {
        self.speech_acts.iter().find(|s| s.performative == performative)
    }

    /// All speech acts, in declaration order.
    pub fn speech_acts(&self) -> &[SpeechActSchema] {
        &self.speech_acts
    }

    /// Legal replies to `performative`, or `None` if it is not declared.
    pub fn replies(&self, performative: &str) -> Option<&[String]> {
        self.reply.get(performative).map(Vec::as_slice)
    }

    pub fn is_valid_reply(&self, previous: &str, next: &str) -> bool {
        self.replies(previous)
            .is_some_and(|replies| replies.iter().any(|r| r == next))
    }

    /// A performative with no legal replies.
    pub fn is_terminal(&self, performative: &str) -> bool {
        self.replies(performative).is_some_and(<[String]>::is_empty)
    }

    pub fn is_initiating(&self, performative: &str) -> bool {
        self.initiation.contains(performative)
    }

    pub fn initiating_performatives(&self) -> impl Iterator<Item = &str> {
        self.initiation.iter().map(String::as_str)
    }

    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    /// Whether `role` may send `performative`.
    pub fn may_send(&self, role: Role, performative: &str) -> bool {
        self.speakers
            .get(&role)
            .map_or(true, |allowed| allowed.contains(performative))
    }

    pub fn end_states(&self) -> &[EndState] {
        &self.end_states
    }

    /// Outcome recorded when a dialogue ends on `performative`.
    pub fn outcome(&self, performative: &str) -> Option<&EndState> {
        self.outcomes.get(performative)
    }

    pub fn has_end_state(&self, end_state: &EndState) -> bool {
        self.end_states.contains(end_state)
    }
}

fn require_declared(
    declared: &BTreeSet<&str>,
    performative: &str,
    context: &'static str,
) -> Result<(), SpecError> {
    if declared.contains(performative) {
        Ok(())
    } else {
        Err(SpecError::UndeclaredPerformative {
            performative: performative.to_string(),
            context,
        })
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn load_custom_types(
    declared: &OrderedMap<OrderedMap<String>>,
) -> Result<CustomTypes, SpecError> {
    let mut custom = CustomTypes::new();
    for (name, fields) in declared.iter() {
        let well_formed = name.starts_with(|c: char| c.is_ascii_uppercase())
            && name.chars().all(|c| c.is_ascii_alphanumeric());
        if !well_formed {
            return Err(SpecError::InvalidType {
                ty: format!("ct:{name}"),
                reason: "custom type names must match [A-Z][a-zA-Z0-9]*".into(),
            });
        }
        if custom.contains_key(name) {
            return Err(SpecError::Duplicate {
                kind: "custom type",
                name: name.to_string(),
            });
        }
        let mut members = Vec::with_capacity(fields.len());
        for (field, ty) in fields.iter() {
            if !is_identifier(field) {
                return Err(SpecError::InvalidContentName {
                    performative: format!("ct:{name}"),
                    name: field.to_string(),
                });
            }
            members.push((field.to_string(), parse_type(ty, &custom)?));
        }
        custom.insert(name.to_string(), StructType::new(name, members));
    }
    Ok(custom)
}

fn load_speech_acts(
    declared: &OrderedMap<OrderedMap<String>>,
    custom: &CustomTypes,
) -> Result<Vec<SpeechActSchema>, SpecError> {
    let mut speech_acts: Vec<SpeechActSchema> = Vec::with_capacity(declared.len());
    for (performative, contents) in declared.iter() {
        if !is_identifier(performative) {
            return Err(SpecError::InvalidContentName {
                performative: performative.to_string(),
                name: performative.to_string(),
            });
        }
        if speech_acts.iter().any(|s| s.performative == performative) {
            return Err(SpecError::Duplicate {
                kind: "performative",
                name: performative.to_string(),
            });
        }
        let mut fields = Vec::with_capacity(contents.len());
        for (name, ty) in contents.iter() {
            if !is_identifier(name) || RESERVED_NAMES.contains(&name) {
                return Err(SpecError::InvalidContentName {
                    performative: performative.to_string(),
                    name: name.to_string(),
                });
            }
            fields.push((name.to_string(), parse_type(ty, custom)?));
        }
        speech_acts.push(SpeechActSchema {
            performative: performative.to_string(),
            fields,
        });
    }
    Ok(speech_acts)
}
