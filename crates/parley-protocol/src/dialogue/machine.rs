//! Per-dialogue validation.
//!
//! A [`Dialogue`] is an append-only history plus the state derived from
//! it. Validation is pure: a rejected message leaves the dialogue
//! exactly as it was.
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::dialogue::DialogueLabel;
use crate::error::DialogueError;
use crate::message::{Message, Routing};
use crate::spec::{EndState, ProtocolSpecification, Role};
use crate::types::{STARTING_MESSAGE_ID, STARTING_TARGET};

/// Lifecycle of a dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogueState {
    /// Opened; at most the opener has been exchanged.
    Started,
    InProgress,
    /// No further messages accepted. `outcome` is `None` when the last
    /// performative has no declared outcome.
    Ended { outcome: Option<EndState> },
}

/// One two-party conversation under one protocol.
#[derive(Debug, Clone)]
pub struct Dialogue {
    label: DialogueLabel,
    spec: Arc<ProtocolSpecification>,
    /// Role of the local agent.
    role: Role,
    history: Vec<Message>,
    /// Sender of each history entry, index-aligned with `history`.
    senders: Vec<Role>,
    state: DialogueState,
}

impl Dialogue {
    pub fn new(label: DialogueLabel, spec: Arc<ProtocolSpecification>, role: Role) -> Self {
        Self {
            label,
            spec,
            role,
            history: Vec::new(),
            senders: Vec::new(),
            state: DialogueState::Started,
        }
    }

    pub fn label(&self) -> &DialogueLabel {
        &self.label
    }

    pub fn spec(&self) -> &ProtocolSpecification {
        &self.spec
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Role name as declared by the protocol (e.g. `buyer`).
    pub fn role_name(&self) -> &str {
        self.spec.roles().name(self.role)
    }

    pub fn is_self_initiated(&self) -> bool {
        self.role == Role::Initiator
    }

    pub fn state(&self) -> &DialogueState {
        &self.state
    }

    pub fn is_ended(&self) -> bool {
        matches!(self.state, DialogueState::Ended { .. })
    }

    pub fn outcome(&self) -> Option<&EndState> {
        match &self.state {
            DialogueState::Ended { outcome } => outcome.as_ref(),
            _ => None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.history
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.history.last()
    }

    /// History entries with the role that sent each one.
    pub fn entries(&self) -> impl Iterator<Item = (Role, &Message)> {
        self.senders.iter().copied().zip(&self.history)
    }

    /// The message with id `message_id`, if it is in the history.
    pub fn get_message(&self, message_id: u64) -> Option<&Message> {
        let index = message_id.checked_sub(STARTING_MESSAGE_ID)?;
        let message = self.history.get(usize::try_from(index).ok()?)?;
        (message.message_id() == message_id).then_some(message)
    }

    /// Role that sent `message_id`.
    pub fn sender_of(&self, message_id: u64) -> Option<Role> {
        let index = message_id.checked_sub(STARTING_MESSAGE_ID)?;
        self.senders.get(usize::try_from(index).ok()?).copied()
    }

    /// Last message sent by the local agent.
    pub fn last_outgoing_message(&self) -> Option<&Message> {
        self.last_sent_by(self.role)
    }

    /// Last message received from the opponent.
    pub fn last_incoming_message(&self) -> Option<&Message> {
        self.last_sent_by(self.role.counterpart())
    }

    fn last_sent_by(&self, role: Role) -> Option<&Message> {
        self.senders
            .iter()
            .zip(&self.history)
            .rev()
            .find(|(sender, _)| **sender == role)
            .map(|(_, message)| message)
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Routing for the next message the local agent sends.
    pub fn next_routing(&self) -> Routing {
        let (message_id, target) = self.next_position();
        Routing {
            reference: self.label.reference().clone(),
            message_id,
            target,
        }
    }

    fn next_position(&self) -> (u64, u64) {
        match self.history.last() {
            Some(last) => (last.message_id() + 1, last.message_id()),
            None => (STARTING_MESSAGE_ID, STARTING_TARGET),
        }
    }

    /// Whether `message`, sent by the party playing `sender`, is a legal
    /// next move.
    pub fn is_valid_reply(&self, message: &Message, sender: Role) -> bool {
        self.check(message, sender).is_ok()
    }

    /// Validate `message` as the next move without changing anything.
    ///
    /// Checks run in a fixed order: termination, position (id and
    /// target), reply legality, then sender role.
    pub fn check(&self, message: &Message, sender: Role) -> Result<(), DialogueError> {
        if self.is_ended() {
            return Err(DialogueError::TerminatedDialogue {
                label: self.label.to_string(),
            });
        }

        let (expected_id, expected_target) = self.next_position();
        if message.message_id() != expected_id || message.target() != expected_target {
            return Err(DialogueError::OutOfOrder {
                expected_id,
                expected_target,
                message_id: message.message_id(),
                target: message.target(),
            });
        }

        let performative = message.performative();
        match self.history.last() {
            None if !self.spec.is_initiating(performative) => {
                return Err(DialogueError::IllegalTransition {
                    after: "dialogue start".into(),
                    performative: performative.to_string(),
                });
            }
            Some(last) if !self.spec.is_valid_reply(last.performative(), performative) => {
                return Err(DialogueError::IllegalTransition {
                    after: format!("`{}`", last.performative()),
                    performative: performative.to_string(),
                });
            }
            _ => {}
        }

        if !self.spec.may_send(sender, performative) {
            return Err(DialogueError::RoleViolation {
                role: self.spec.roles().name(sender).to_string(),
                performative: performative.to_string(),
            });
        }
        Ok(())
    }

    /// Validate and append. Ends the dialogue on a terminal performative.
    pub fn append(&mut self, message: Message, sender: Role) -> Result<(), DialogueError> {
        self.check(&message, sender)?;

        let performative = message.performative();
        self.state = if self.spec.is_terminal(performative) {
            DialogueState::Ended {
                outcome: self.spec.outcome(performative).cloned(),
            }
        } else if self.history.is_empty() {
            DialogueState::Started
        } else {
            DialogueState::InProgress
        };
        self.history.push(message);
        self.senders.push(sender);
        Ok(())
    }

    /// End the dialogue early (timeout, policy decision) with `end_state`.
    pub fn end(&mut self, end_state: EndState) -> Result<(), DialogueError> {
        if self.is_ended() {
            return Err(DialogueError::TerminatedDialogue {
                label: self.label.to_string(),
            });
        }
        if !self.spec.has_end_state(&end_state) {
            return Err(DialogueError::UnknownEndState(end_state.to_string()));
        }
        self.state = DialogueState::Ended {
            outcome: Some(end_state),
        };
        Ok(())
    }

    pub(crate) fn set_label(&mut self, label: DialogueLabel) {
        self.label = label;
    }
}
