use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Address, DialogueReference};

/// One conversation as seen from one agent.
///
/// The two participants of a dialogue hold mirrored labels: same
/// reference, addresses swapped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DialogueLabel {
    reference: DialogueReference,
    self_address: Address,
    opponent: Address,
}

impl DialogueLabel {
    pub fn new(reference: DialogueReference, self_address: Address, opponent: Address) -> Self {
        Self {
            reference,
            self_address,
            opponent,
        }
    }

    pub fn reference(&self) -> &DialogueReference {
        &self.reference
    }

    pub fn self_address(&self) -> &Address {
        &self.self_address
    }

    pub fn opponent(&self) -> &Address {
        &self.opponent
    }

    pub fn is_complete(&self) -> bool {
        self.reference.is_complete()
    }

    /// The label this dialogue had before the responder half was known.
    pub fn incomplete(&self) -> Self {
        Self {
            reference: self.reference.to_opening(),
            ..self.clone()
        }
    }

    /// Same addresses, another reference.
    pub fn with_reference(&self, reference: DialogueReference) -> Self {
        Self {
            reference,
            ..self.clone()
        }
    }

    /// The label the opponent holds for the same dialogue.
    pub fn mirror(&self) -> Self {
        Self {
            reference: self.reference.clone(),
            self_address: self.opponent.clone(),
            opponent: self.self_address.clone(),
        }
    }
}

impl fmt::Display for DialogueLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}<->{}", self.reference, self.self_address, self.opponent)
    }
}
