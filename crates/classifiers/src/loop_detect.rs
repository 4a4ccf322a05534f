//! Loop detection: has the IVR looped back to a menu the caller already
//! heard, typically because a prior digit press did not register.

use ivr_core::MenuSet;
use ivr_llm::LlmClient;
use serde::Deserialize;
use serde_json::json;

use crate::Verdict;

#[derive(Debug, Deserialize)]
struct LoopResponse {
    loop_detected: bool,
    confidence: f32,
}

/// `current_menu` is the just-extracted menu; `previous_menus` is the call's
/// history of previously observed complete menus, most recent last.
pub async fn classify_loop(
    client: &LlmClient,
    model: &str,
    temperature: f32,
    max_tokens: usize,
    utterance: &str,
    current_menu: &MenuSet,
    previous_menus: &[MenuSet],
) -> Verdict {
    if previous_menus.is_empty() {
        return Verdict::new(false, 0.9);
    }

    let schema = json!({
        "type": "object",
        "properties": {
            "loop_detected": {"type": "boolean"},
            "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
        },
        "required": ["loop_detected", "confidence"],
        "additionalProperties": false
    });

    let recent: Vec<String> = previous_menus
        .iter()
        .rev()
        .take(3)
        .flat_map(|m| m.iter().map(|o| format!("{}: {}", o.digit, o.label)))
        .collect();

    let system = "You detect whether an IVR call has looped back to a menu the caller already \
        heard, which usually means a digit press was not accepted. You are given the current \
        menu transcript plus a summary of recently seen menu options.";
    let user = format!(
        "Current prompt: {utterance}\nRecently seen options: {}",
        recent.join(", ")
    );

    match client
        .analyze::<LoopResponse>(system, &user, &schema, model, temperature, max_tokens)
        .await
    {
        Ok(resp) => Verdict::new(resp.loop_detected, resp.confidence),
        Err(err) => {
            // §7's conservative-default contract: a structural match is
            // suggestive but not proof of a loop, and wrongly declaring one
            // routes the call toward escalation/termination. An LLM outage
            // must not be able to trigger that on its own.
            tracing::warn!(error = %err, "loop-detection LLM call failed, defaulting to no-loop");
            metrics::counter!("classifier_llm_fallback_total", "classifier" => "loop_detection").increment(1);
            Verdict::heuristic(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivr_core::MenuOption;

    fn menu(opts: &[(char, &str)]) -> MenuSet {
        MenuSet::from_options(opts.iter().map(|(d, l)| MenuOption::new(*d, *l)))
    }

    #[tokio::test]
    async fn llm_failure_defaults_to_conservative_no_loop_even_on_structural_match() {
        let client = LlmClient::new(ivr_llm::LlmClientConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            api_key: String::new(),
        });
        let current = menu(&[('1', "sales"), ('2', "support")]);
        let previous = vec![menu(&[('2', "support"), ('1', "sales")])];
        let v = classify_loop(&client, "gpt-4o-mini", 0.2, 64, "Press 1 for sales", &current, &previous).await;
        assert!(!v.value);
    }
}
