//! Termination classification: voicemail, a closed business, a dead end with
//! no valid options, or nothing worth ending the call over.

use ivr_core::TerminationReason;
use ivr_llm::LlmClient;
use serde::Deserialize;
use serde_json::json;

use crate::TerminationVerdict;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ReasonWire {
    Voicemail,
    Closed,
    DeadEnd,
    None,
}

impl From<ReasonWire> for TerminationReason {
    fn from(value: ReasonWire) -> Self {
        match value {
            ReasonWire::Voicemail => TerminationReason::Voicemail,
            ReasonWire::Closed => TerminationReason::Closed,
            ReasonWire::DeadEnd => TerminationReason::DeadEnd,
            ReasonWire::None => TerminationReason::None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TerminationResponse {
    should_terminate: bool,
    reason: ReasonWire,
    message: String,
    confidence: f32,
}

pub async fn classify_termination(
    client: &LlmClient,
    model: &str,
    temperature: f32,
    max_tokens: usize,
    utterance: &str,
) -> TerminationVerdict {
    let schema = json!({
        "type": "object",
        "properties": {
            "should_terminate": {"type": "boolean"},
            "reason": {"type": "string", "enum": ["voicemail", "closed", "dead-end", "none"]},
            "message": {"type": "string"},
            "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
        },
        "required": ["should_terminate", "reason", "message", "confidence"],
        "additionalProperties": false
    });

    let system = "You decide whether an outbound IVR call has reached a dead end: a voicemail \
        box, a message that the business is closed, or a menu with no valid path forward. If \
        none of these apply, set should_terminate to false and reason to \"none\".";

    match client
        .analyze::<TerminationResponse>(system, utterance, &schema, model, temperature, max_tokens)
        .await
    {
        Ok(resp) => TerminationVerdict {
            should_terminate: resp.should_terminate,
            reason: resp.reason.into(),
            message: resp.message,
            confidence: resp.confidence,
        },
        Err(err) => {
            // §7's conservative-default contract: an LLM failure must never
            // itself end the call. A heuristic that could return
            // `should_terminate: true` would let a transient network error
            // hang up on a live human.
            tracing::warn!(error = %err, "termination LLM call failed, defaulting to no-terminate");
            metrics::counter!("classifier_llm_fallback_total", "classifier" => "termination").increment(1);
            TerminationVerdict::none()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn llm_failure_defaults_to_conservative_no_terminate() {
        let client = LlmClient::new(ivr_llm::LlmClientConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            api_key: String::new(),
        });
        let v = classify_termination(
            &client,
            "gpt-4o-mini",
            0.2,
            64,
            "Please leave a message after the tone.",
        )
        .await;
        assert!(!v.should_terminate);
        assert_eq!(v.reason, TerminationReason::None);
    }
}
