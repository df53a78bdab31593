use std::fmt;

use serde::{Deserialize, Serialize};

/// Id of the first message of every dialogue.
pub const STARTING_MESSAGE_ID: u64 = 1;

/// Target of a dialogue opener (it replies to nothing).
pub const STARTING_TARGET: u64 = 0;

/// Placeholder for the reference half not yet assigned by the responder.
pub const REFERENCE_SENTINEL: &str = "";

/// Default upper bound for an inbound payload (1 MiB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Deepest nesting of arrays and maps accepted inside a field value.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Content names reserved for routing metadata.
pub const RESERVED_NAMES: [&str; 5] = [
    "body",
    "message_id",
    "dialogue_reference",
    "target",
    "performative",
];

/// Opaque agent address, as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a protocol specification: `(author, name, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolId {
    pub author: String,
    pub name: String,
    pub version: String,
}

impl ProtocolId {
    pub fn new(
        author: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.author, self.name, self.version)
    }
}

/// Two-part conversation identifier.
///
/// The initiator assigns the first half when opening; the responder
/// assigns the second half on its first reply. Until then the second
/// half is [`REFERENCE_SENTINEL`]. Both participants end up holding the
/// same pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DialogueReference {
    initiator: String,
    responder: String,
}

impl DialogueReference {
    /// Reference as sent by the initiator before any reply.
    pub fn opening(initiator_half: impl Into<String>) -> Self {
        Self {
            initiator: initiator_half.into(),
            responder: REFERENCE_SENTINEL.to_string(),
        }
    }

    pub fn new(initiator_half: impl Into<String>, responder_half: impl Into<String>) -> Self {
        Self {
            initiator: initiator_half.into(),
            responder: responder_half.into(),
        }
    }

    pub fn initiator_half(&self) -> &str {
        &self.initiator
    }

    pub fn responder_half(&self) -> &str {
        &self.responder
    }

    /// Both halves assigned.
    pub fn is_complete(&self) -> bool {
        self.initiator != REFERENCE_SENTINEL && self.responder != REFERENCE_SENTINEL
    }

    /// Same initiator half, responder half reset to the sentinel.
    pub fn to_opening(&self) -> Self {
        Self::opening(self.initiator.clone())
    }

    /// Same initiator half with the given responder half.
    pub fn with_responder(&self, responder_half: impl Into<String>) -> Self {
        Self::new(self.initiator.clone(), responder_half)
    }

    /// Whether `half` is used on either side of this reference.
    pub fn uses(&self, half: &str) -> bool {
        self.initiator == half || self.responder == half
    }
}

impl fmt::Display for DialogueReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let responder = if self.responder == REFERENCE_SENTINEL {
            "?"
        } else {
            &self.responder
        };
        write!(f, "({}, {})", self.initiator, responder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_reference_is_incomplete() {
        let r = DialogueReference::opening("abc");
        assert!(!r.is_complete());
        assert_eq!(r.initiator_half(), "abc");
        assert_eq!(r.responder_half(), REFERENCE_SENTINEL);
        assert_eq!(r.to_string(), "(abc, ?)");
    }

    #[test]
    fn completed_reference() {
        let r = DialogueReference::opening("abc").with_responder("xyz");
        assert!(r.is_complete());
        assert_eq!(r.to_opening(), DialogueReference::opening("abc"));
        assert_eq!(r.to_string(), "(abc, xyz)");
        assert!(r.uses("xyz"));
        assert!(!r.uses("nope"));
    }

    #[test]
    fn protocol_id_display() {
        let id = ProtocolId::new("fetchai", "two_party_negotiation", "0.1.0");
        assert_eq!(id.to_string(), "fetchai/two_party_negotiation:0.1.0");
    }

    #[test]
    fn reference_roundtrip_msgpack() {
        let r = DialogueReference::new("a", "b");
        let bytes = rmp_serde::to_vec(&r).expect("serialize");
        let decoded: DialogueReference = rmp_serde::from_slice(&bytes).expect("deserialize");
        assert_eq!(r, decoded);
    }
}
