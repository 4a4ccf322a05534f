//! The Speech Orchestrator: the stateful per-turn pipeline tying the config
//! resolver, call state store, voice processor, history sink, and telephony
//! response builder together (§4.6).

pub mod conversational;
pub mod orchestrator;

pub use orchestrator::{OrchestratorError, SpeechOrchestrator, TurnInput};
