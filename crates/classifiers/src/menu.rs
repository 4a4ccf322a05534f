//! Menu detection and extraction: is this utterance an IVR menu, and if so
//! what options does it advertise.

use ivr_core::{MenuOption, MenuSet};
use ivr_llm::LlmClient;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;

use crate::Verdict;

fn press_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)press\s+(\d|\*|#|zero|one|two|three|four|five|six|seven|eight|nine)\s+(?:for|to)\s+([^,.;]+)")
            .expect("static pattern compiles")
    })
}

fn word_to_digit(word: &str) -> Option<char> {
    Some(match word.to_lowercase().as_str() {
        "zero" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        s if s.len() == 1 => s.chars().next()?,
        _ => return None,
    })
}

/// Heuristic fallback extraction used both standalone (on LLM failure) and
/// to sanity-check the LLM's own output.
pub fn extract_menu_heuristic(utterance: &str) -> MenuSet {
    let mut options = MenuSet::new();
    for caps in press_pattern().captures_iter(utterance) {
        let Some(digit) = word_to_digit(&caps[1]) else {
            continue;
        };
        let label = caps[2].trim();
        if label.is_empty() {
            continue;
        }
        options.insert(MenuOption::new(digit, label));
    }
    options
}

#[derive(Debug, Deserialize)]
struct MenuDetectionResponse {
    is_menu: bool,
    confidence: f32,
}

/// Does this utterance present the caller with a set of dial choices.
pub async fn classify_menu_detection(
    client: &LlmClient,
    model: &str,
    temperature: f32,
    max_tokens: usize,
    utterance: &str,
) -> Verdict {
    let schema = json!({
        "type": "object",
        "properties": {
            "is_menu": {"type": "boolean"},
            "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0}
        },
        "required": ["is_menu", "confidence"],
        "additionalProperties": false
    });

    let system = "You classify IVR phone prompts. Decide whether the transcript presents the \
        caller with a set of options to choose from, typically via DTMF key presses.";

    match client
        .analyze::<MenuDetectionResponse>(system, utterance, &schema, model, temperature, max_tokens)
        .await
    {
        Ok(resp) => Verdict::new(resp.is_menu, resp.confidence),
        Err(err) => {
            tracing::warn!(error = %err, "menu detection LLM call failed, using heuristic fallback");
            metrics::counter!("classifier_llm_fallback_total", "classifier" => "menu_detection").increment(1);
            Verdict::heuristic(!extract_menu_heuristic(utterance).is_empty())
        }
    }
}

#[derive(Debug, Deserialize)]
struct MenuExtractionOption {
    digit: String,
    label: String,
}

#[derive(Debug, Deserialize)]
struct MenuExtractionResponse {
    options: Vec<MenuExtractionOption>,
    complete: bool,
}

/// Extract the advertised options, and whether the prompt sounded complete
/// or was cut off mid-menu.
pub async fn classify_menu_extraction(
    client: &LlmClient,
    model: &str,
    temperature: f32,
    max_tokens: usize,
    utterance: &str,
) -> (MenuSet, bool) {
    let schema = json!({
        "type": "object",
        "properties": {
            "options": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "digit": {"type": "string", "minLength": 1, "maxLength": 1},
                        "label": {"type": "string"}
                    },
                    "required": ["digit", "label"],
                    "additionalProperties": false
                }
            },
            "complete": {"type": "boolean"}
        },
        "required": ["options", "complete"],
        "additionalProperties": false
    });

    let system = "You extract IVR menu options from a phone prompt transcript. For each \
        option, give the digit to press and a short label for what it does. Set `complete` \
        to false if the transcript sounds cut off before listing all options.";

    match client
        .analyze::<MenuExtractionResponse>(system, utterance, &schema, model, temperature, max_tokens)
        .await
    {
        Ok(resp) => {
            let mut options = MenuSet::new();
            for opt in resp.options {
                if let Some(digit) = opt.digit.chars().next() {
                    options.insert(MenuOption::new(digit, opt.label));
                }
            }
            (options, resp.complete)
        }
        Err(err) => {
            tracing::warn!(error = %err, "menu extraction LLM call failed, using heuristic fallback");
            metrics::counter!("classifier_llm_fallback_total", "classifier" => "menu_extraction").increment(1);
            let options = extract_menu_heuristic(utterance);
            // A regex match list can't tell whether the utterance was cut off;
            // assume complete so the caller doesn't wait forever on a fallback.
            (options, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_press_digit_for_label() {
        let menu = extract_menu_heuristic("Press 1 for sales, press 2 for support.");
        assert_eq!(menu.len(), 2);
        assert_eq!(menu.find_by_digit('1').unwrap().label, "sales");
        assert_eq!(menu.find_by_digit('2').unwrap().label, "support");
    }

    #[test]
    fn extracts_spelled_out_digits() {
        let menu = extract_menu_heuristic("Press three to check your balance.");
        assert_eq!(menu.find_by_digit('3').unwrap().label, "check your balance");
    }

    #[test]
    fn no_matches_on_plain_speech() {
        let menu = extract_menu_heuristic("Thank you for calling, please hold.");
        assert!(menu.is_empty());
    }
}
