//! Seven LLM-backed utterance classifiers, each with a regex heuristic
//! fallback so a single malformed or unreachable LLM response degrades the
//! call rather than aborting it (§4.2).

pub mod confirmation;
pub mod incomplete_speech;
pub mod loop_detect;
pub mod menu;
pub mod termination;
pub mod transfer;

pub use confirmation::classify_human_confirmation;
pub use incomplete_speech::{classify_incomplete_speech, looks_incomplete_heuristic};
pub use loop_detect::classify_loop;
pub use menu::{classify_menu_detection, classify_menu_extraction};
pub use termination::classify_termination;
pub use transfer::classify_transfer_request;

use ivr_core::TerminationReason;
use serde::{Deserialize, Serialize};

/// Every classifier returns a confidence-scored verdict so downstream
/// consumers (DTMF Chooser, Voice Processor) can weigh LLM output against
/// heuristic fallback output consistently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub value: bool,
    pub confidence: f32,
}

impl Verdict {
    pub fn new(value: bool, confidence: f32) -> Self {
        Self { value, confidence }
    }

    pub fn heuristic(value: bool) -> Self {
        // Heuristic fallback never claims high confidence; it exists to keep
        // the call moving, not to out-vote a working LLM.
        Self::new(value, if value { 0.55 } else { 0.5 })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminationVerdict {
    pub should_terminate: bool,
    pub reason: TerminationReason,
    pub message: String,
    pub confidence: f32,
}

impl TerminationVerdict {
    pub fn none() -> Self {
        Self {
            should_terminate: false,
            reason: TerminationReason::None,
            message: String::new(),
            confidence: 0.5,
        }
    }
}
