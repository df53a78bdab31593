/// Serde-facing specification document.
///
/// This is the raw, unvalidated shape a protocol author writes (YAML or
/// JSON). [`ProtocolSpecification::load`](super::ProtocolSpecification::load)
/// turns it into the checked, immutable form.
use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::SpecError;

/// A string-keyed mapping that keeps declaration order.
///
/// Duplicate keys are rejected while deserializing.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append an entry; returns `false` (and changes nothing) if `key` is present.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> bool {
        let key = key.into();
        if self.contains_key(&key) {
            return false;
        }
        self.0.push((key, value));
        true
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    /// Later duplicates are ignored.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OrderedMapVisitor(PhantomData))
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping with string keys")
    }

    // `accept:` with nothing after it in YAML.
    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(OrderedMap::new())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = OrderedMap::new();
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            if map.contains_key(&key) {
                return Err(de::Error::custom(format!("duplicate key `{key}`")));
            }
            map.0.push((key, value));
        }
        Ok(map)
    }
}

/// A protocol specification as written by its author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecificationSource {
    pub name: String,
    pub author: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// performative -> (content name -> type string)
    pub speech_acts: OrderedMap<OrderedMap<String>>,
    /// `Name` -> (field name -> type string), referenced as `ct:Name`
    #[serde(default)]
    pub custom_types: OrderedMap<OrderedMap<String>>,
    /// performative -> legal replies (empty = terminal)
    pub reply: OrderedMap<Vec<String>>,
    /// `[initiator, responder]`
    pub roles: Vec<String>,
    #[serde(default)]
    pub end_states: Vec<String>,
    /// Designated openers; inferred when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiation: Option<Vec<String>>,
    /// role -> performatives that role may send
    #[serde(default)]
    pub speakers: OrderedMap<Vec<String>>,
    /// terminal performative -> end state
    #[serde(default)]
    pub terminal_outcomes: OrderedMap<String>,
}

impl SpecificationSource {
    pub fn from_yaml(text: &str) -> Result<Self, SpecError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self, SpecError> {
        Ok(serde_json::from_str(text)?)
    }
}
