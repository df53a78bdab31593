//! Protocols bundled with the crate.
pub mod two_party_negotiation;

pub use two_party_negotiation::{Conditions, NegotiationAct, Query};
