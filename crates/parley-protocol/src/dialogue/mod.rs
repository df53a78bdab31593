//! Two-party dialogues: labels, the per-dialogue state machine, the
//! per-agent registry and outcome statistics.
mod label;
mod machine;
mod registry;
mod stats;

pub use label::DialogueLabel;
pub use machine::{Dialogue, DialogueState};
pub use registry::{AgentDialogues, DialogueRegistry, RegistryConfig, MAX_DIALOGUES};
pub use stats::{DialogueStats, StatsSnapshot};
