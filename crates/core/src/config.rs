//! Resolved per-call configuration.

use serde::{Deserialize, Serialize};

/// Configuration resolved for a single call, immutable within the turn it's
/// resolved for. See `ivr-config` for the layered resolution that produces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// E.164 number to dial when a transfer to a human is warranted.
    pub transfer_destination: String,
    /// Free-text statement of what the agent is trying to accomplish.
    pub call_purpose: String,
    /// Free-text guidance layered on top of `call_purpose` (tone, constraints).
    pub custom_instructions: String,
    /// Phone/email the caller can be reached at for callbacks, if known.
    pub user_contact: Option<String>,
    /// TTS voice identifier.
    pub tts_voice: String,
    /// BCP-47 language tag for TTS/ASR.
    pub tts_language: String,
    /// LLM model name used for classifier and conversational calls.
    pub llm_model: String,
    /// Sampling temperature. Classifier calls clamp this to <= 0.3 regardless.
    pub llm_temperature: f32,
    /// Maximum tokens for a single LLM completion.
    pub llm_max_tokens: usize,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            transfer_destination: String::new(),
            call_purpose: "speak with a representative".to_string(),
            custom_instructions: String::new(),
            user_contact: None,
            tts_voice: "alice".to_string(),
            tts_language: "en-US".to_string(),
            llm_model: "gpt-4o-mini".to_string(),
            llm_temperature: 0.3,
            llm_max_tokens: 256,
        }
    }
}
