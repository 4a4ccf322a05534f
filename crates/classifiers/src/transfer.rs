//! Transfer-request classification: does the utterance indicate the IVR is
//! offering (or has already initiated) a transfer to a human agent.

use ivr_llm::LlmClient;
use serde::Deserialize;
use serde_json::json;

use crate::Verdict;

#[derive(Debug, Deserialize)]
struct TransferResponse {
    transfer_requested: bool,
    confidence: f32,
}

pub async fn classify_transfer_request(
    client: &LlmClient,
    model: &str,
    temperature: f32,
    max_tokens: usize,
    utterance: &str,
) -> Verdict {
    let schema = json!({
        "type": "object",
        "properties": {
            "transfer_requested": {"type": "boolean"},
            "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
        },
        "required": ["transfer_requested", "confidence"],
        "additionalProperties": false
    });

    let system = "You classify IVR phone prompts. Decide whether the system is transferring \
        the caller to a human representative, e.g. \"please hold while we connect you\" or \
        \"transferring your call now\".";

    match client
        .analyze::<TransferResponse>(system, utterance, &schema, model, temperature, max_tokens)
        .await
    {
        Ok(resp) => Verdict::new(resp.transfer_requested, resp.confidence),
        Err(err) => {
            // §7's conservative-default contract: a missed transfer offer
            // just means the next turn gets another chance to classify it.
            // A keyword guess that can fire `true` risks dialing a
            // transfer destination the IVR never actually offered.
            tracing::warn!(error = %err, "transfer-request LLM call failed, defaulting to no-transfer");
            metrics::counter!("classifier_llm_fallback_total", "classifier" => "transfer_request").increment(1);
            Verdict::heuristic(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn llm_failure_defaults_to_conservative_no_transfer() {
        let client = LlmClient::new(ivr_llm::LlmClientConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            api_key: String::new(),
        });
        let v = classify_transfer_request(
            &client,
            "gpt-4o-mini",
            0.2,
            64,
            "Please hold while we connect you to an agent.",
        )
        .await;
        assert!(!v.value);
    }
}
