//! Human-confirmation classification: after a transfer, did an actual human
//! (not hold music or another automated prompt) pick up.

use ivr_llm::LlmClient;
use serde::Deserialize;
use serde_json::json;

use crate::Verdict;

#[derive(Debug, Deserialize)]
struct ConfirmationResponse {
    is_human: bool,
    confidence: f32,
}

pub async fn classify_human_confirmation(
    client: &LlmClient,
    model: &str,
    temperature: f32,
    max_tokens: usize,
    utterance: &str,
) -> Verdict {
    let schema = json!({
        "type": "object",
        "properties": {
            "is_human": {"type": "boolean"},
            "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
        },
        "required": ["is_human", "confidence"],
        "additionalProperties": false
    });

    let system = "You classify phone transcripts captured right after a call transfer. \
        Decide whether a live human representative has picked up and is speaking, as opposed \
        to hold music, an automated message, or another IVR menu.";

    match client
        .analyze::<ConfirmationResponse>(system, utterance, &schema, model, temperature, max_tokens)
        .await
    {
        Ok(resp) => Verdict::new(resp.is_human, resp.confidence),
        Err(err) => {
            // §7's conservative-default contract: a call the IVR has already
            // transferred must not be treated as human-confirmed on a guess.
            // Staying unconfirmed just means another confirmation turn runs
            // once the LLM is reachable again.
            tracing::warn!(error = %err, "human-confirmation LLM call failed, defaulting to not-confirmed");
            metrics::counter!("classifier_llm_fallback_total", "classifier" => "human_confirmation").increment(1);
            Verdict::heuristic(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn llm_failure_defaults_to_conservative_not_confirmed() {
        let client = LlmClient::new(ivr_llm::LlmClientConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            api_key: String::new(),
        });
        let v = classify_human_confirmation(
            &client,
            "gpt-4o-mini",
            0.2,
            64,
            "Hi, this is Sarah, how can I help you?",
        )
        .await;
        assert!(!v.value);
    }
}
