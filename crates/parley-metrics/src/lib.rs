//! Minimal statistics primitives for the Parley protocol stack.
//!
//! [`Counter`] is an atomic monotonic counter; [`Tally`] is a fixed set
//! of counters keyed by name, keys chosen at construction. Both serialize
//! as plain numbers and maps, so snapshots ship as JSON or MessagePack.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter backed by [`AtomicU64`].
///
/// Relaxed ordering throughout: values are statistics, not
/// synchronization points.
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Counter {
    fn clone(&self) -> Self {
        Self(AtomicU64::new(self.get()))
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Counter").field(&self.get()).finish()
    }
}

impl serde::Serialize for Counter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.get())
    }
}

impl<'de> serde::Deserialize<'de> for Counter {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <u64 as serde::Deserialize>::deserialize(deserializer)?;
        Ok(Self(AtomicU64::new(value)))
    }
}

/// A fixed family of counters, one per key.
///
/// The key set is frozen at construction, so recording only needs
/// `&self`. Recording an unknown key is a no-op that returns `false`.
#[derive(Clone)]
pub struct Tally<K: Ord> {
    counters: BTreeMap<K, Counter>,
}

impl<K: Ord> Tally<K> {
    /// Create a tally with a zeroed counter for every key.
    pub fn new(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            counters: keys.into_iter().map(|k| (k, Counter::new())).collect(),
        }
    }

    /// Increment the counter for `key`. Returns `false` if the key is unknown.
    pub fn record(&self, key: &K) -> bool {
        match self.counters.get(key) {
            Some(counter) => {
                counter.inc();
                true
            }
            None => false,
        }
    }

    /// Current value for `key` (`None` if the key is unknown).
    pub fn get(&self, key: &K) -> Option<u64> {
        self.counters.get(key).map(Counter::get)
    }

    /// Sum over all keys.
    pub fn total(&self) -> u64 {
        self.counters.values().map(Counter::get).sum()
    }

    /// Iterate `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, u64)> {
        self.counters.iter().map(|(k, c)| (k, c.get()))
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

impl<K: Ord + fmt::Debug> fmt::Debug for Tally<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Ord + serde::Serialize> serde::Serialize for Tally<K> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&self.counters, serializer)
    }
}
