//! Shared domain types for the IVR navigation agent.
//!
//! Every other crate in the workspace depends on this one for the call
//! identifier, resolved configuration, menu/decision/state shapes, and the
//! call-history event union. None of these types perform I/O.

pub mod call_state;
pub mod config;
pub mod conversation;
pub mod decision;
pub mod history;
pub mod ids;
pub mod menu;
pub mod redact;

pub use call_state::{CallState, ConsecutivePress};
pub use config::CallConfig;
pub use conversation::{ConversationHistory, ConversationTurn, Speaker};
pub use decision::{Decision, DtmfDecision, TerminationReason};
pub use history::HistoryEvent;
pub use ids::CallId;
pub use menu::{MenuOption, MenuSet};
pub use redact::{RedactedPhone, RedactedText};
