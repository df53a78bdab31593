/// Dialogue registry: every dialogue one agent holds under one protocol.
///
/// Each dialogue sits behind its own mutex, so operations on different
/// dialogues run independently while operations on the same dialogue
/// are strictly ordered. The index (label -> dialogue) is a separate
/// `RwLock`.
///
/// Lock order: a dialogue lock may be held while taking the index lock,
/// never the reverse. The only index-side access to a dialogue is
/// `try_lock` during eviction.
use std::collections::HashMap;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError,
};

use crate::dialogue::{Dialogue, DialogueLabel, DialogueStats};
use crate::error::{DecodeError, DialogueError, ProtocolError};
use crate::fields::Value;
use crate::message::Message;
use crate::spec::{EndState, ProtocolSpecification, Role};
use crate::typed::SpeechAct;
use crate::types::{Address, DialogueReference, ProtocolId, MAX_MESSAGE_SIZE};

/// Default registry capacity (DoS protection).
pub const MAX_DIALOGUES: usize = 10_000;

/// Registry tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Dialogues held at once. Ended dialogues are evicted first when full.
    pub max_dialogues: usize,
    /// Inbound payloads above this size are rejected unparsed.
    pub max_message_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_dialogues: MAX_DIALOGUES,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

type SharedDialogue = Arc<Mutex<Dialogue>>;

#[derive(Default)]
struct Index {
    dialogues: HashMap<DialogueLabel, SharedDialogue>,
    /// Incomplete label -> label after reference completion.
    completed: HashMap<DialogueLabel, DialogueLabel>,
}

impl Index {
    fn resolve(&self, label: &DialogueLabel) -> Option<SharedDialogue> {
        let key = self.completed.get(label).unwrap_or(label);
        if let Some(dialogue) = self.dialogues.get(key) {
            return Some(dialogue.clone());
        }
        // The initiator keys its dialogue by the incomplete label until
        // the first reply arrives.
        if label.is_complete() {
            let incomplete = label.incomplete();
            let key = self.completed.get(&incomplete).unwrap_or(&incomplete);
            return self.dialogues.get(key).cloned();
        }
        None
    }

    fn half_in_use(&self, half: &str) -> bool {
        self.dialogues.keys().any(|l| l.reference().uses(half))
    }

    fn fresh_half(&self) -> String {
        loop {
            let half = uuid::Uuid::new_v4().to_string();
            if !self.half_in_use(&half) {
                return half;
            }
        }
    }

    fn evict_ended(&mut self) -> usize {
        let before = self.dialogues.len();
        self.dialogues.retain(|_, dialogue| {
            let ended = match dialogue.try_lock() {
                Ok(d) => d.is_ended(),
                Err(TryLockError::Poisoned(p)) => p.into_inner().is_ended(),
                // Busy: someone is mid-turn on it.
                Err(TryLockError::WouldBlock) => false,
            };
            !ended
        });
        let live = &self.dialogues;
        self.completed.retain(|_, label| live.contains_key(label));
        before - self.dialogues.len()
    }
}

/// Owns every dialogue of one agent under one protocol.
pub struct DialogueRegistry {
    spec: Arc<ProtocolSpecification>,
    self_address: Address,
    config: RegistryConfig,
    index: RwLock<Index>,
    stats: DialogueStats,
}

impl DialogueRegistry {
    pub fn new(spec: Arc<ProtocolSpecification>, self_address: Address) -> Self {
        Self::with_config(spec, self_address, RegistryConfig::default())
    }

    pub fn with_config(
        spec: Arc<ProtocolSpecification>,
        self_address: Address,
        config: RegistryConfig,
    ) -> Self {
        let stats = DialogueStats::new(spec.end_states());
        Self {
            spec,
            self_address,
            config,
            index: RwLock::new(Index::default()),
            stats,
        }
    }

    pub fn spec(&self) -> &Arc<ProtocolSpecification> {
        &self.spec
    }

    pub fn self_address(&self) -> &Address {
        &self.self_address
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn stats(&self) -> &DialogueStats {
        &self.stats
    }

    // ── Outbound ─────────────────────────────────────────────────────────

    /// Send `performative`: opens a new dialogue with `opponent` when
    /// `label` is `None`, otherwise continues the labelled dialogue.
    pub fn on_send<K, I>(
        &self,
        performative: &str,
        fields: I,
        opponent: &Address,
        label: Option<&DialogueLabel>,
    ) -> Result<Message, ProtocolError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        match label {
            None => self.open(performative, fields, opponent).map(|(_, msg)| msg),
            Some(label) if label.opponent() != opponent => Err(unknown(label).into()),
            Some(label) => self.reply(label, performative, fields),
        }
    }

    /// [`on_send`](Self::on_send) for a typed speech act.
    pub fn send_act<A: SpeechAct>(
        &self,
        act: &A,
        opponent: &Address,
        label: Option<&DialogueLabel>,
    ) -> Result<Message, ProtocolError> {
        self.on_send(act.performative(), act.to_fields(), opponent, label)
    }

    /// Open a dialogue with `opponent`, the local agent as initiator.
    ///
    /// Returns the new dialogue's label and the opening message.
    pub fn open<K, I>(
        &self,
        performative: &str,
        fields: I,
        opponent: &Address,
    ) -> Result<(DialogueLabel, Message), ProtocolError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        if *opponent == self.self_address {
            return Err(DialogueError::SelfAddressed {
                address: opponent.to_string(),
            }
            .into());
        }

        let mut index = self.write_index();
        self.ensure_capacity(&mut index)?;
        let reference = DialogueReference::opening(index.fresh_half());
        let label = DialogueLabel::new(reference, self.self_address.clone(), opponent.clone());
        let mut dialogue = Dialogue::new(label.clone(), self.spec.clone(), Role::Initiator);
        let message = Message::build(&self.spec, performative, fields, dialogue.next_routing())?;
        self.accept(&mut dialogue, message.clone(), Role::Initiator)?;
        index
            .dialogues
            .insert(label.clone(), Arc::new(Mutex::new(dialogue)));
        drop(index);

        self.stats.record_opened();
        tracing::info!("dialogue {label} opened with `{performative}`");
        Ok((label, message))
    }

    /// Continue the dialogue at `label` with the next local move.
    pub fn reply<K, I>(
        &self,
        label: &DialogueLabel,
        performative: &str,
        fields: I,
    ) -> Result<Message, ProtocolError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let shared = self.resolve(label).ok_or_else(|| unknown(label))?;
        let mut dialogue = lock(&shared);
        let message = Message::build(&self.spec, performative, fields, dialogue.next_routing())?;
        let role = dialogue.role();
        self.accept(&mut dialogue, message.clone(), role)?;
        Ok(message)
    }

    // ── Inbound ──────────────────────────────────────────────────────────

    /// Decode `data` from `sender` and run it through its dialogue.
    ///
    /// Returns a snapshot of the dialogue after the message was accepted.
    pub fn on_receive(
        &self,
        data: &[u8],
        sender: &Address,
    ) -> Result<(Dialogue, Message), ProtocolError> {
        let message = Message::from_bytes_limited(data, &self.spec, self.config.max_message_size)
            .map_err(|e| {
                self.stats.record_decode_failure();
                tracing::debug!("dropping payload from {sender}: {e}");
                e
            })?;
        self.on_receive_message(message, sender)
    }

    /// [`on_receive`](Self::on_receive) for an already decoded message.
    pub fn on_receive_message(
        &self,
        message: Message,
        sender: &Address,
    ) -> Result<(Dialogue, Message), ProtocolError> {
        if message.protocol() != self.spec.id() {
            return Err(DecodeError::ProtocolMismatch {
                expected: self.spec.id().to_string(),
                found: message.protocol().to_string(),
            }
            .into());
        }
        if *sender == self.self_address {
            return Err(DialogueError::SelfAddressed {
                address: sender.to_string(),
            }
            .into());
        }

        let label = DialogueLabel::new(
            message.reference().clone(),
            self.self_address.clone(),
            sender.clone(),
        );
        match self.resolve(&label) {
            Some(shared) => self.continue_dialogue(&shared, message),
            None if message.is_opener() => self.accept_opening(label, message),
            None => {
                self.stats.record_rejected();
                tracing::debug!(
                    "orphan `{}` from {sender} for {}",
                    message.performative(),
                    message.reference()
                );
                Err(unknown(&label).into())
            }
        }
    }

    /// An opener from a new opponent: create a responder-side dialogue
    /// and assign our half of the reference.
    fn accept_opening(
        &self,
        label: DialogueLabel,
        message: Message,
    ) -> Result<(Dialogue, Message), ProtocolError> {
        if label.is_complete() {
            return Err(DialogueError::ReferenceMismatch {
                expected: label.reference().to_opening().to_string(),
                found: label.reference().to_string(),
            }
            .into());
        }

        let mut index = self.write_index();
        // Lost a race with another opener on the same reference.
        if let Some(shared) = index.resolve(&label) {
            drop(index);
            return self.continue_dialogue(&shared, message);
        }

        self.ensure_capacity(&mut index)?;
        let reference = label.reference().with_responder(index.fresh_half());
        let complete = label.with_reference(reference);
        let mut dialogue = Dialogue::new(complete.clone(), self.spec.clone(), Role::Responder);
        self.accept(&mut dialogue, message.clone(), Role::Initiator)?;
        let snapshot = dialogue.clone();
        index
            .dialogues
            .insert(complete.clone(), Arc::new(Mutex::new(dialogue)));
        index.completed.insert(label, complete.clone());
        drop(index);

        self.stats.record_opened();
        tracing::info!(
            "dialogue {complete} opened by {} with `{}`",
            complete.opponent(),
            message.performative()
        );
        Ok((snapshot, message))
    }

    fn continue_dialogue(
        &self,
        shared: &SharedDialogue,
        message: Message,
    ) -> Result<(Dialogue, Message), ProtocolError> {
        let mut dialogue = lock(shared);
        let current = dialogue.label().clone();
        let ours = current.reference();
        let theirs = message.reference();
        let sender = dialogue.role().counterpart();

        let completes = match dialogue.role() {
            Role::Initiator if !ours.is_complete() => {
                theirs.is_complete() && theirs.initiator_half() == ours.initiator_half()
            }
            // The initiator has not seen our half until we send something.
            Role::Responder
                if *theirs == ours.to_opening() && dialogue.last_outgoing_message().is_none() =>
            {
                false
            }
            _ => {
                if theirs != ours {
                    return Err(mismatch(ours, theirs).into());
                }
                false
            }
        };
        if !completes && !ours.is_complete() {
            return Err(mismatch(ours, theirs).into());
        }

        if completes {
            if let Err(e) = dialogue.check(&message, sender) {
                return Err(self.reject(&dialogue, &message, e).into());
            }
            let complete = current.with_reference(theirs.clone());
            {
                let mut index = self.write_index();
                if index.dialogues.contains_key(&complete) {
                    return Err(DialogueError::ReferenceCollision {
                        reference: theirs.to_string(),
                    }
                    .into());
                }
                index.dialogues.remove(&current);
                index.dialogues.insert(complete.clone(), shared.clone());
                index.completed.insert(current, complete.clone());
            }
            dialogue.set_label(complete.clone());
            tracing::info!("dialogue {complete} reference completed");
        }

        self.accept(&mut dialogue, message.clone(), sender)?;
        Ok((dialogue.clone(), message))
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// End a dialogue early (timeout, policy) with a declared end state.
    pub fn end_dialogue(
        &self,
        label: &DialogueLabel,
        end_state: EndState,
    ) -> Result<(), ProtocolError> {
        let shared = self.resolve(label).ok_or_else(|| unknown(label))?;
        let mut dialogue = lock(&shared);
        dialogue.end(end_state.clone())?;
        self.stats
            .record_end(&end_state, dialogue.is_self_initiated());
        tracing::info!("dialogue {} ended early: {end_state}", dialogue.label());
        Ok(())
    }

    /// Drop every ended dialogue. Returns how many were removed.
    pub fn evict_ended(&self) -> usize {
        let evicted = self.write_index().evict_ended();
        if evicted > 0 {
            tracing::debug!("evicted {evicted} ended dialogues");
        }
        evicted
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Snapshot of the dialogue at `label` (incomplete labels resolve
    /// after completion).
    pub fn dialogue(&self, label: &DialogueLabel) -> Option<Dialogue> {
        self.resolve(label).map(|shared| snapshot(&shared))
    }

    /// Current labels of all held dialogues.
    pub fn labels(&self) -> Vec<DialogueLabel> {
        self.read_index().dialogues.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read_index().dialogues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_index().dialogues.is_empty()
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn resolve(&self, label: &DialogueLabel) -> Option<SharedDialogue> {
        self.read_index().resolve(label)
    }

    fn accept(
        &self,
        dialogue: &mut Dialogue,
        message: Message,
        sender: Role,
    ) -> Result<(), DialogueError> {
        if let Err(e) = dialogue.check(&message, sender) {
            return Err(self.reject(dialogue, &message, e));
        }
        dialogue.append(message, sender)?;
        self.stats.record_accepted();

        if dialogue.is_ended() {
            match dialogue.outcome() {
                Some(outcome) => {
                    self.stats.record_end(outcome, dialogue.is_self_initiated());
                    tracing::info!("dialogue {} ended: {outcome}", dialogue.label());
                }
                None => tracing::info!("dialogue {} ended", dialogue.label()),
            }
        }
        Ok(())
    }

    fn reject(&self, dialogue: &Dialogue, message: &Message, error: DialogueError) -> DialogueError {
        self.stats.record_rejected();
        tracing::debug!(
            "rejected `{}` #{} in {}: {error}",
            message.performative(),
            message.message_id(),
            dialogue.label()
        );
        error
    }

    fn ensure_capacity(&self, index: &mut Index) -> Result<(), DialogueError> {
        let capacity = self.config.max_dialogues;
        if index.dialogues.len() < capacity {
            return Ok(());
        }
        let evicted = index.evict_ended();
        if evicted > 0 {
            tracing::debug!("evicted {evicted} ended dialogues at capacity");
        }
        if index.dialogues.len() >= capacity {
            tracing::warn!("dialogue registry full ({capacity} dialogues)");
            return Err(DialogueError::RegistryFull { capacity });
        }
        Ok(())
    }

    fn read_index(&self) -> RwLockReadGuard<'_, Index> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, Index> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock(dialogue: &Mutex<Dialogue>) -> MutexGuard<'_, Dialogue> {
    dialogue.lock().unwrap_or_else(PoisonError::into_inner)
}

fn snapshot(dialogue: &Mutex<Dialogue>) -> Dialogue {
    lock(dialogue).clone()
}

fn unknown(label: &DialogueLabel) -> DialogueError {
    DialogueError::UnknownDialogue {
        reference: label.reference().to_string(),
        opponent: label.opponent().to_string(),
    }
}

fn mismatch(expected: &DialogueReference, found: &DialogueReference) -> DialogueError {
    DialogueError::ReferenceMismatch {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

/// All registries of one agent, one per protocol.
pub struct AgentDialogues {
    address: Address,
    config: RegistryConfig,
    registries: HashMap<ProtocolId, DialogueRegistry>,
}

impl AgentDialogues {
    pub fn new(address: Address) -> Self {
        Self::with_config(address, RegistryConfig::default())
    }

    pub fn with_config(address: Address, config: RegistryConfig) -> Self {
        Self {
            address,
            config,
            registries: HashMap::new(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Add a registry for `spec`. An already registered protocol keeps
    /// its existing registry.
    pub fn register(&mut self, spec: Arc<ProtocolSpecification>) -> &DialogueRegistry {
        let id = spec.id().clone();
        let address = self.address.clone();
        let config = self.config.clone();
        self.registries
            .entry(id)
            .or_insert_with(|| DialogueRegistry::with_config(spec, address, config))
    }

    pub fn registry(&self, protocol: &ProtocolId) -> Option<&DialogueRegistry> {
        self.registries.get(protocol)
    }

    pub fn protocols(&self) -> impl Iterator<Item = &ProtocolId> {
        self.registries.keys()
    }

    /// Dispatch an inbound payload to the registry of `protocol`.
    pub fn on_receive(
        &self,
        protocol: &ProtocolId,
        data: &[u8],
        sender: &Address,
    ) -> Result<(Dialogue, Message), ProtocolError> {
        self.registry(protocol)
            .ok_or_else(|| ProtocolError::UnknownProtocol(protocol.clone()))?
            .on_receive(data, sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Routing;

    const SPEC: &str = r#"
name: ping
author: parley
version: 0.1.0
speech_acts:
  ping:
    nonce: pt:int
  pong:
    nonce: pt:int
  bye: {}
reply:
  ping: [pong, bye]
  pong: [ping, bye]
  bye: []
roles: [pinger, ponger]
end_states: [done, timeout]
initiation: [ping]
terminal_outcomes:
  bye: done
"#;

    fn spec() -> Arc<ProtocolSpecification> {
        Arc::new(ProtocolSpecification::from_yaml(SPEC).expect("spec loads"))
    }

    fn nonce(n: i64) -> Vec<(&'static str, Value)> {
        vec![("nonce", Value::Int(n))]
    }

    fn pair() -> (DialogueRegistry, DialogueRegistry) {
        let spec = spec();
        (
            DialogueRegistry::new(spec.clone(), Address::new("alice")),
            DialogueRegistry::new(spec, Address::new("bob")),
        )
    }

    #[test]
    fn open_and_answer() {
        let (alice, bob) = pair();
        let (label, ping) = alice.open("ping", nonce(1), &Address::new("bob")).expect("open");
        assert!(!label.is_complete());
        assert_eq!(alice.len(), 1);

        let (bob_view, _) = bob
            .on_receive(&ping.to_bytes().expect("encode"), &Address::new("alice"))
            .expect("receive ping");
        assert_eq!(bob_view.role(), Role::Responder);
        assert!(bob_view.label().is_complete());

        let pong = bob
            .reply(bob_view.label(), "pong", nonce(1))
            .expect("pong");
        let (alice_view, _) = alice
            .on_receive(&pong.to_bytes().expect("encode"), &Address::new("bob"))
            .expect("receive pong");

        assert_eq!(alice_view.label().mirror(), *bob_view.label());
        // The old incomplete label still resolves.
        assert_eq!(
            alice.dialogue(&label).map(|d| d.messages().len()),
            Some(2)
        );
        assert_eq!(alice.stats().messages_accepted(), 2);
    }

    #[test]
    fn self_addressed_rejected() {
        let (alice, _) = pair();
        let err = alice
            .open("ping", nonce(1), &Address::new("alice"))
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Dialogue(DialogueError::SelfAddressed { .. })
        ));
    }

    #[test]
    fn rejected_open_leaves_no_dialogue() {
        let (alice, _) = pair();
        let err = alice
            .open("pong", nonce(1), &Address::new("bob"))
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Dialogue(DialogueError::IllegalTransition { .. })
        ));
        assert!(alice.is_empty());
        assert_eq!(alice.stats().messages_rejected(), 1);
    }

    #[test]
    fn orphan_reply_is_unknown_dialogue() {
        let (alice, bob) = pair();
        let routing = Routing {
            reference: DialogueReference::new("ghost", "x"),
            message_id: 2,
            target: 1,
        };
        let msg = Message::build(bob.spec(), "pong", nonce(1), routing).expect("build");
        let err = alice
            .on_receive(&msg.to_bytes().expect("encode"), &Address::new("bob"))
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Dialogue(DialogueError::UnknownDialogue { .. })
        ));
    }

    #[test]
    fn opening_reference_expires_once_responder_speaks() {
        let (alice, bob) = pair();
        let (label, ping) = alice.open("ping", nonce(1), &Address::new("bob")).expect("open");
        let (bob_view, _) = bob
            .on_receive(&ping.to_bytes().expect("encode"), &Address::new("alice"))
            .expect("receive ping");

        // Alice moves again before hearing back, still on the opening reference.
        let early = alice.reply(&label, "pong", nonce(2)).expect("early pong");
        assert_eq!(early.reference(), label.reference());
        bob.on_receive(&early.to_bytes().expect("encode"), &Address::new("alice"))
            .expect("opening reference accepted before bob speaks");

        bob.reply(bob_view.label(), "ping", nonce(3)).expect("bob pings");

        let stale = Routing {
            reference: label.reference().clone(),
            message_id: 4,
            target: 3,
        };
        let msg = Message::build(bob.spec(), "pong", nonce(4), stale).expect("build");
        assert!(matches!(
            bob.on_receive(&msg.to_bytes().expect("encode"), &Address::new("alice")),
            Err(ProtocolError::Dialogue(DialogueError::ReferenceMismatch { .. }))
        ));

        let current = Routing {
            reference: bob_view.label().reference().clone(),
            message_id: 4,
            target: 3,
        };
        let msg = Message::build(bob.spec(), "pong", nonce(4), current).expect("build");
        let (view, _) = bob
            .on_receive(&msg.to_bytes().expect("encode"), &Address::new("alice"))
            .expect("completed reference accepted");
        assert_eq!(view.messages().len(), 4);
        assert_eq!(view.sender_of(4), Some(Role::Initiator));
    }

    #[test]
    fn garbage_counts_as_decode_failure() {
        let (alice, _) = pair();
        assert!(matches!(
            alice.on_receive(&[0xff, 0x00], &Address::new("bob")),
            Err(ProtocolError::Decode(_))
        ));
        assert_eq!(alice.stats().decode_failures(), 1);
    }

    #[test]
    fn end_dialogue_records_outcome() {
        let (alice, _) = pair();
        let (label, _) = alice.open("ping", nonce(1), &Address::new("bob")).expect("open");
        alice
            .end_dialogue(&label, EndState::new("timeout"))
            .expect("end");
        assert_eq!(
            alice.stats().end_state_count(&EndState::new("timeout")),
            (1, 0)
        );
        assert!(alice
            .reply(&label, "ping", nonce(2))
            .is_err());
        assert_eq!(alice.evict_ended(), 1);
        assert!(alice.is_empty());
    }

    #[test]
    fn capacity_evicts_ended_then_fails() {
        let spec = spec();
        let config = RegistryConfig {
            max_dialogues: 2,
            ..RegistryConfig::default()
        };
        let alice = DialogueRegistry::with_config(spec, Address::new("alice"), config);
        let bob = Address::new("bob");

        let (first, _) = alice.open("ping", nonce(1), &bob).expect("first");
        alice.open("ping", nonce(2), &bob).expect("second");
        let err = alice.open("ping", nonce(3), &bob).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Dialogue(DialogueError::RegistryFull { capacity: 2 })
        ));

        alice.reply(&first, "bye", Vec::<(&str, Value)>::new()).expect("bye");
        alice.open("ping", nonce(3), &bob).expect("third after eviction");
        assert_eq!(alice.len(), 2);
    }

    #[test]
    fn agent_dispatches_by_protocol() {
        let spec = spec();
        let mut agent = AgentDialogues::new(Address::new("bob"));
        agent.register(spec.clone());
        let alice = DialogueRegistry::new(spec.clone(), Address::new("alice"));
        let (_, ping) = alice.open("ping", nonce(1), &Address::new("bob")).expect("open");
        let bytes = ping.to_bytes().expect("encode");

        agent
            .on_receive(spec.id(), &bytes, &Address::new("alice"))
            .expect("dispatch");

        let other = ProtocolId::new("parley", "other", "0.1.0");
        assert!(matches!(
            agent.on_receive(&other, &bytes, &Address::new("alice")),
            Err(ProtocolError::UnknownProtocol(_))
        ));
    }
}
