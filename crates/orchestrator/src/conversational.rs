//! Step 10's "nothing more specific matched" fallback (§4.6): a short AI
//! reply in the transfer-agent persona, generated only when no digit is
//! about to be pressed. The agent prefers silence — the system prompt asks
//! for the literal word `silent` whenever a reply isn't actually warranted,
//! and the orchestrator treats that sentinel as "emit no TTS".

use ivr_core::{CallConfig, ConversationHistory};
use ivr_llm::LlmClient;

const SILENT_SENTINEL: &str = "silent";

fn system_prompt(config: &CallConfig) -> String {
    format!(
        "You are a transfer agent placing an outbound phone call on the caller's behalf. \
        Your goal on this call: {purpose}. {instructions}\
        You almost never need to say anything — the caller is an IVR system, not a person, \
        and most turns should pass in silence while you listen for a menu or a transfer offer. \
        Only speak if the IVR has asked you a direct question that a menu press or digit can't \
        answer, and then answer in one short sentence. If nothing needs saying, reply with \
        exactly the word \"{silent}\" and nothing else.",
        purpose = config.call_purpose,
        instructions = if config.custom_instructions.is_empty() {
            String::new()
        } else {
            format!("{} ", config.custom_instructions)
        },
        silent = SILENT_SENTINEL,
    )
}

fn user_prompt(utterance: &str, history: &ConversationHistory) -> String {
    let mut prompt = String::new();
    let recent: Vec<_> = history.iter().collect();
    for turn in recent.iter().rev().take(4).collect::<Vec<_>>().into_iter().rev() {
        prompt.push_str(&format!("{:?}: {}\n", turn.speaker, turn.text));
    }
    prompt.push_str(&format!("Latest utterance: {utterance}"));
    prompt
}

/// Returns `None` when the model declines to speak (the `silent` sentinel,
/// case-insensitively, possibly with trailing punctuation/whitespace) or
/// when the LLM call itself fails — in both cases the orchestrator's only
/// obligation is to keep listening, so silence is the safe default.
pub async fn generate_reply(
    client: &LlmClient,
    config: &CallConfig,
    utterance: &str,
    history: &ConversationHistory,
) -> Option<String> {
    let system = system_prompt(config);
    let user = user_prompt(utterance, history);

    match client
        .generate_reply(&system, &user, &config.llm_model, config.llm_temperature, config.llm_max_tokens)
        .await
    {
        Ok(reply) => {
            let trimmed = reply.trim().trim_end_matches(['.', '!', '?']).trim();
            if trimmed.eq_ignore_ascii_case(SILENT_SENTINEL) || trimmed.is_empty() {
                None
            } else {
                Some(reply.trim().to_string())
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "conversational reply LLM call failed, staying silent");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivr_llm::LlmClientConfig;

    fn unreachable_client() -> LlmClient {
        LlmClient::new(LlmClientConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            api_key: String::new(),
        })
    }

    #[test]
    fn system_prompt_embeds_call_purpose_and_silent_sentinel() {
        let config = CallConfig {
            call_purpose: "reschedule an appointment".to_string(),
            ..CallConfig::default()
        };
        let prompt = system_prompt(&config);
        assert!(prompt.contains("reschedule an appointment"));
        assert!(prompt.contains(SILENT_SENTINEL));
    }

    #[tokio::test]
    async fn unreachable_llm_falls_back_to_silence() {
        let client = unreachable_client();
        let config = CallConfig::default();
        let reply = generate_reply(&client, &config, "Hi, how can I help?", &ConversationHistory::new()).await;
        assert_eq!(reply, None);
    }
}
