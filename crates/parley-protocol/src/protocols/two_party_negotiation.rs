//! Two-party negotiation: a buyer calls for proposals, a seller proposes,
//! the buyer accepts or declines, the seller confirms.
//!
//! ```text
//! cfp -> propose | decline
//! propose -> accept | decline
//! accept -> decline | match_accept
//! ```
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{FieldError, SpecError};
use crate::fields::Value;
use crate::message::Message;
use crate::spec::ProtocolSpecification;
use crate::typed::{
    field, float_field, mismatch, optional_str_field, str_int_dict, str_int_map, str_list_field,
    SpeechAct,
};

/// Specification source, YAML.
pub const SOURCE: &str = include_str!("two_party_negotiation.yaml");

/// Load the bundled specification.
pub fn specification() -> Result<Arc<ProtocolSpecification>, SpecError> {
    ProtocolSpecification::from_yaml(SOURCE).map(Arc::new)
}

/// What the buyer is looking for (`ct:Query`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub subject: String,
    pub constraints: BTreeMap<String, i64>,
}

impl Query {
    fn to_value(&self) -> Value {
        Value::Struct(vec![
            ("subject".into(), Value::from(self.subject.as_str())),
            ("constraints".into(), str_int_dict(&self.constraints)),
        ])
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            subject: value.struct_field("subject")?.as_str()?.to_string(),
            constraints: str_int_map(value.struct_field("constraints")?)?,
        })
    }
}

/// `union[str, dict[str, int]]`: free text or structured terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conditions {
    Text(String),
    Terms(BTreeMap<String, i64>),
}

impl Conditions {
    fn to_value(&self) -> Value {
        match self {
            Conditions::Text(text) => Value::from(text.as_str()),
            Conditions::Terms(terms) => str_int_dict(terms),
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(text) => Some(Conditions::Text(text.clone())),
            other => str_int_map(other).map(Conditions::Terms),
        }
    }
}

/// Speech acts of the negotiation protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum NegotiationAct {
    Cfp {
        query: Query,
    },
    Propose {
        price: f64,
        items: Vec<String>,
        conditions: Conditions,
    },
    Accept,
    Decline {
        reason: Option<String>,
    },
    MatchAccept,
}

impl SpeechAct for NegotiationAct {
    fn performative(&self) -> &'static str {
        match self {
            NegotiationAct::Cfp { .. } => "cfp",
            NegotiationAct::Propose { .. } => "propose",
            NegotiationAct::Accept => "accept",
            NegotiationAct::Decline { .. } => "decline",
            NegotiationAct::MatchAccept => "match_accept",
        }
    }

    fn to_fields(&self) -> Vec<(String, Value)> {
        match self {
            NegotiationAct::Cfp { query } => vec![("query".into(), query.to_value())],
            NegotiationAct::Propose {
                price,
                items,
                conditions,
            } => vec![
                ("price".into(), Value::Float(*price)),
                (
                    "items".into(),
                    Value::List(items.iter().map(|i| Value::from(i.as_str())).collect()),
                ),
                ("conditions".into(), conditions.to_value()),
            ],
            NegotiationAct::Decline { reason } => vec![(
                "reason".into(),
                Value::from(reason.as_deref().map(Value::from)),
            )],
            NegotiationAct::Accept | NegotiationAct::MatchAccept => Vec::new(),
        }
    }

    fn from_message(message: &Message) -> Result<Self, FieldError> {
        let act = match message.performative() {
            "cfp" => {
                let value = field(message, "query")?;
                let query =
                    Query::from_value(value).ok_or_else(|| mismatch("query", "ct:Query", value))?;
                NegotiationAct::Cfp { query }
            }
            "propose" => {
                let value = field(message, "conditions")?;
                let conditions = Conditions::from_value(value).ok_or_else(|| {
                    mismatch("conditions", "pt:union[pt:str, pt:dict[pt:str, pt:int]]", value)
                })?;
                NegotiationAct::Propose {
                    price: float_field(message, "price")?,
                    items: str_list_field(message, "items")?,
                    conditions,
                }
            }
            "accept" => NegotiationAct::Accept,
            "decline" => NegotiationAct::Decline {
                reason: optional_str_field(message, "reason")?,
            },
            "match_accept" => NegotiationAct::MatchAccept,
            other => return Err(FieldError::UnknownPerformative(other.to_string())),
        };
        Ok(act)
    }
}

impl NegotiationAct {
    /// Subject of a `cfp`, if this is one.
    pub fn subject(&self) -> Option<&str> {
        match self {
            NegotiationAct::Cfp { query } => Some(&query.subject),
            _ => None,
        }
    }
}
