use std::collections::BTreeMap;

use parley_metrics::{Counter, Tally};
use serde::{Deserialize, Serialize};

use crate::spec::EndState;

/// Outcome and traffic bookkeeping for one registry.
///
/// End states are counted separately for dialogues the local agent
/// opened and dialogues the opponent opened.
#[derive(Debug)]
pub struct DialogueStats {
    self_initiated: Tally<EndState>,
    other_initiated: Tally<EndState>,
    opened: Counter,
    accepted: Counter,
    rejected: Counter,
    decode_failures: Counter,
}

/// Point-in-time copy of [`DialogueStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub self_initiated: BTreeMap<String, u64>,
    pub other_initiated: BTreeMap<String, u64>,
    pub dialogues_opened: u64,
    pub messages_accepted: u64,
    pub messages_rejected: u64,
    pub decode_failures: u64,
}

impl DialogueStats {
    pub fn new(end_states: &[EndState]) -> Self {
        Self {
            self_initiated: Tally::new(end_states.iter().cloned()),
            other_initiated: Tally::new(end_states.iter().cloned()),
            opened: Counter::new(),
            accepted: Counter::new(),
            rejected: Counter::new(),
            decode_failures: Counter::new(),
        }
    }

    pub(crate) fn record_end(&self, end_state: &EndState, self_initiated: bool) {
        let tally = if self_initiated {
            &self.self_initiated
        } else {
            &self.other_initiated
        };
        if !tally.record(end_state) {
            tracing::warn!("end state {end_state} not tracked");
        }
    }

    pub(crate) fn record_opened(&self) {
        self.opened.inc();
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.inc();
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.inc();
    }

    pub(crate) fn record_decode_failure(&self) {
        self.decode_failures.inc();
    }

    /// Dialogues that reached `end_state`, split as (self-initiated, other-initiated).
    pub fn end_state_count(&self, end_state: &EndState) -> (u64, u64) {
        (
            self.self_initiated.get(end_state).unwrap_or(0),
            self.other_initiated.get(end_state).unwrap_or(0),
        )
    }

    pub fn dialogues_opened(&self) -> u64 {
        self.opened.get()
    }

    pub fn messages_accepted(&self) -> u64 {
        self.accepted.get()
    }

    pub fn messages_rejected(&self) -> u64 {
        self.rejected.get()
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.get()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let collect = |tally: &Tally<EndState>| -> BTreeMap<String, u64> {
            tally
                .iter()
                .map(|(state, n)| (state.to_string(), n))
                .collect()
        };
        StatsSnapshot {
            self_initiated: collect(&self.self_initiated),
            other_initiated: collect(&self.other_initiated),
            dialogues_opened: self.opened.get(),
            messages_accepted: self.accepted.get(),
            messages_rejected: self.rejected.get(),
            decode_failures: self.decode_failures.get(),
        }
    }
}
