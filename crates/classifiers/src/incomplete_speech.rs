//! Incomplete-speech classification: did the ASR transcript end mid-phrase,
//! meaning the next turn's transcript should be merged onto it rather than
//! treated standalone.

use ivr_llm::LlmClient;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;

use crate::Verdict;

fn trailing_conjunction() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(and|or|for|to|press|option)\s*$").expect("static pattern compiles")
    })
}

/// Cheap, LLM-free incomplete-speech check: no terminal punctuation and a
/// dangling continuation word at the end. Used by the orchestrator's
/// pre-LLM heuristic step, which must not spend a classifier call just to
/// decide whether to wait for more speech.
pub fn looks_incomplete_heuristic(utterance: &str) -> bool {
    let trimmed = utterance.trim();
    if trimmed.is_empty() {
        return true;
    }
    let has_terminal_punctuation = trimmed.ends_with(['.', '?', '!']);
    !has_terminal_punctuation && trailing_conjunction().is_match(trimmed)
}

#[derive(Debug, Deserialize)]
struct IncompleteSpeechResponse {
    incomplete: bool,
    confidence: f32,
}

pub async fn classify_incomplete_speech(
    client: &LlmClient,
    model: &str,
    temperature: f32,
    max_tokens: usize,
    utterance: &str,
) -> Verdict {
    let schema = json!({
        "type": "object",
        "properties": {
            "incomplete": {"type": "boolean"},
            "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
        },
        "required": ["incomplete", "confidence"],
        "additionalProperties": false
    });

    let system = "You decide whether an ASR transcript of an IVR prompt was cut off mid-phrase \
        (e.g. ends on a dangling word like \"and\", \"for\", or an unfinished menu option) \
        versus a complete thought, even if short.";

    match client
        .analyze::<IncompleteSpeechResponse>(system, utterance, &schema, model, temperature, max_tokens)
        .await
    {
        Ok(resp) => Verdict::new(resp.incomplete, resp.confidence),
        Err(err) => {
            tracing::warn!(error = %err, "incomplete-speech LLM call failed, using heuristic fallback");
            metrics::counter!("classifier_llm_fallback_total", "classifier" => "incomplete_speech").increment(1);
            let looks_cut_off = utterance.trim().is_empty() || trailing_conjunction().is_match(utterance);
            Verdict::heuristic(looks_cut_off)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_conjunction_looks_incomplete() {
        assert!(trailing_conjunction().is_match("Press 1 for sales or"));
    }

    #[test]
    fn complete_sentence_does_not_match() {
        assert!(!trailing_conjunction().is_match("Press 1 for sales."));
    }

    #[test]
    fn heuristic_flags_dangling_continuation_word() {
        assert!(looks_incomplete_heuristic("Thank you for calling, this call may be"));
    }

    #[test]
    fn heuristic_accepts_short_complete_menu_line_without_terminal_punctuation() {
        // Complete menu lines aren't incomplete just for lacking punctuation (§4.2).
        assert!(!looks_incomplete_heuristic("Press 1 for sales, press 2 for support"));
    }

    #[test]
    fn heuristic_flags_empty_utterance() {
        assert!(looks_incomplete_heuristic("   "));
    }
}
