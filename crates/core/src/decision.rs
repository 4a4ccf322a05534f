//! The Voice Processor's output: a small, closed record with a tagged
//! termination reason, per the spec's "dynamic decision record" redesign note.

use serde::{Deserialize, Serialize};

use crate::menu::MenuSet;

/// Why the Voice Processor decided the call should end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    Voicemail,
    Closed,
    DeadEnd,
    None,
}

impl Default for TerminationReason {
    fn default() -> Self {
        Self::None
    }
}

/// The DTMF chooser's verdict, possibly overridden by loop suppression.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DtmfDecision {
    pub should_press: bool,
    pub digit: Option<char>,
    pub matched_option: Option<String>,
    pub reason: String,
}

/// One turn's fused verdict from the classifier suite and DTMF chooser.
/// Produced by `ivr-processor::process`, consumed by `ivr-orchestrator`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Decision {
    pub is_menu: bool,
    pub menu_options: MenuSet,
    pub menu_complete: bool,

    pub loop_detected: bool,
    pub loop_confidence: f32,

    pub should_terminate: bool,
    pub termination_reason: TerminationReason,
    pub termination_message: String,

    pub transfer_requested: bool,

    pub dtmf_decision: DtmfDecision,
    pub should_prevent_dtmf: bool,
}
