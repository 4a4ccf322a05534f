//! The Voice Processor: the pure, testable heart of the system (§4.5).
//!
//! `process()` fans out the classifier suite and DTMF chooser at three join
//! points and fuses their results into a single [`Decision`]. It performs no
//! state mutation and no telephony I/O — every side effect belongs to the
//! Speech Orchestrator, which owns the result.

use ivr_core::{CallConfig, ConsecutivePress, Decision, MenuSet};
use ivr_llm::LlmClient;

/// Loop-suppression threshold from §4.5 step 2c / REDESIGN FLAGS: the
/// stricter reading is adopted — suppress whenever a previous press exists
/// and loop-confidence exceeds this, regardless of whether the chooser's new
/// pick differs from the prior press.
pub const LOOP_CONFIDENCE_SUPPRESS_THRESHOLD: f32 = 0.7;
/// Consecutive-press run length that alone forces suppression.
pub const CONSECUTIVE_PRESS_SUPPRESS_COUNT: u32 = 3;

/// Classifier calls are capped at 0.3 temperature (§4.1); the processor
/// clamps whatever the resolved call config carries before calling out, so a
/// misconfigured call doesn't turn every classifier call into a hard error.
fn classifier_temperature(config: &CallConfig) -> f32 {
    config.llm_temperature.min(0.3)
}

/// Everything the Voice Processor needs for one turn. Borrowed, not owned —
/// the orchestrator supplies a view onto its call state without handing over
/// mutation rights.
pub struct ProcessContext<'a> {
    pub utterance: &'a str,
    pub previous_menus: &'a [MenuSet],
    pub partial_menu_options: &'a MenuSet,
    pub last_pressed_digit: Option<char>,
    pub consecutive_presses: &'a [ConsecutivePress],
    pub config: &'a CallConfig,
}

fn current_press_run_count(consecutive_presses: &[ConsecutivePress], digit: char) -> u32 {
    consecutive_presses
        .last()
        .filter(|p| p.digit == digit)
        .map(|p| p.count)
        .unwrap_or(0)
}

/// Run the three-join-point fan-out and assemble a [`Decision`]. No I/O side
/// effects beyond the classifier/LLM calls issued internally.
pub async fn process(client: &LlmClient, ctx: ProcessContext<'_>) -> Decision {
    let model = ctx.config.llm_model.as_str();
    let temperature = classifier_temperature(ctx.config);
    let max_tokens = ctx.config.llm_max_tokens;

    // Join point 1: termination + transfer-request + menu-detection, fanned
    // out concurrently.
    let (termination, transfer, menu_detected) = tokio::join!(
        ivr_classifiers::classify_termination(client, model, temperature, max_tokens, ctx.utterance),
        ivr_classifiers::classify_transfer_request(client, model, temperature, max_tokens, ctx.utterance),
        ivr_classifiers::classify_menu_detection(client, model, temperature, max_tokens, ctx.utterance),
    );

    let mut decision = Decision {
        should_terminate: termination.should_terminate,
        termination_reason: termination.reason,
        termination_message: termination.message,
        transfer_requested: transfer.value,
        ..Decision::default()
    };

    if !menu_detected.value {
        return decision;
    }
    decision.is_menu = true;

    // Join point 2: menu extraction, merged with whatever partial options
    // already accumulated across prior turns (first-wins, order of first
    // appearance — §8 round-trip law).
    let (extracted_options, complete) = ivr_classifiers::classify_menu_extraction(
        client,
        model,
        temperature,
        max_tokens,
        ctx.utterance,
    )
    .await;

    let mut merged = ctx.partial_menu_options.clone();
    merged.merge(&extracted_options);
    decision.menu_options = merged.clone();
    decision.menu_complete = complete;

    // Join point 3: loop detection (only meaningful once a previous menu
    // exists) and the DTMF chooser, fanned out concurrently.
    let loop_future = async {
        if ctx.previous_menus.is_empty() {
            ivr_classifiers::Verdict::new(false, 1.0)
        } else {
            ivr_classifiers::classify_loop(
                client,
                model,
                temperature,
                max_tokens,
                ctx.utterance,
                &merged,
                ctx.previous_menus,
            )
            .await
        }
    };
    let dtmf_future = async {
        ivr_dtmf::choose_digit(
            ctx.utterance,
            &merged,
            &ctx.config.call_purpose,
            &ctx.config.custom_instructions,
        )
    };
    let (loop_verdict, mut dtmf_decision) = tokio::join!(loop_future, dtmf_future);

    decision.loop_detected = loop_verdict.value;
    decision.loop_confidence = loop_verdict.confidence;

    let run_count = ctx
        .last_pressed_digit
        .map(|d| current_press_run_count(ctx.consecutive_presses, d))
        .unwrap_or(0);

    let should_prevent_dtmf = (loop_verdict.confidence > LOOP_CONFIDENCE_SUPPRESS_THRESHOLD
        && ctx.last_pressed_digit.is_some())
        || run_count >= CONSECUTIVE_PRESS_SUPPRESS_COUNT;

    if should_prevent_dtmf {
        dtmf_decision.should_press = false;
    }
    decision.should_prevent_dtmf = should_prevent_dtmf;
    decision.dtmf_decision = dtmf_decision;

    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivr_core::MenuOption;

    fn menu(opts: &[(char, &str)]) -> MenuSet {
        MenuSet::from_options(opts.iter().map(|(d, l)| MenuOption::new(*d, *l)))
    }

    #[test]
    fn merge_law_is_union_first_wins_order_of_first_appearance() {
        let partial = menu(&[('1', "sales")]);
        let extracted = menu(&[('1', "sales restated"), ('2', "support")]);
        let mut merged = partial.clone();
        merged.merge(&extracted);
        let labels: Vec<_> = merged.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["sales", "support"]);
    }

    #[test]
    fn run_count_suppression_threshold_matches_spec() {
        let presses = vec![ConsecutivePress { digit: '5', count: 3 }];
        assert!(current_press_run_count(&presses, '5') >= CONSECUTIVE_PRESS_SUPPRESS_COUNT);
        let presses = vec![ConsecutivePress { digit: '5', count: 2 }];
        assert!(current_press_run_count(&presses, '5') < CONSECUTIVE_PRESS_SUPPRESS_COUNT);
    }

    #[test]
    fn classifier_temperature_clamps_above_cap() {
        let mut config = CallConfig::default();
        config.llm_temperature = 1.0;
        assert_eq!(classifier_temperature(&config), 0.3);
    }
}
