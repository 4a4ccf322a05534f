//! The DTMF Chooser: given an utterance, the menu options it advertised, and
//! the call's purpose, decide whether to press a digit and which one (§4.3).
//!
//! Stateless and pure — no loop suppression here. That is the Voice
//! Processor's job, since it alone has access to previously seen menus and
//! consecutive-press tallies.

use std::collections::HashSet;

use ivr_core::{DtmfDecision, MenuSet};

/// Labels that signal "a human will answer if you press this", independent
/// of the exact wording the IVR uses.
const REPRESENTATIVE_SYNONYMS: &[&str] = &[
    "representative",
    "operator",
    "agent",
    "customer service",
    "customer-service",
    "support",
    "all other inquiries",
    "live person",
    "speak to someone",
];

/// Words that mark a call purpose as "get me to a human", triggering rule 3.
const REPRESENTATIVE_PURPOSE_MARKERS: &[&str] = &[
    "representative",
    "human",
    "real person",
    "live agent",
    "operator",
    "someone",
];

/// Generic catch-all option labels, tried last as rule 6.
const GENERIC_FALLBACK_LABELS: &[&str] = &[
    "other",
    "otherwise",
    "all other inquiries",
    "all other questions",
    "something else",
    "anything else",
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "to", "with", "for", "i", "want", "like", "would", "please", "my", "is",
    "am", "you", "your", "about", "of", "and", "or", "in", "on", "me",
];

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// How strongly two token sets overlap: fraction of the smaller set's words
/// found in the larger set. 0 when either side has no meaningful tokens.
fn overlap_score(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let smaller = a.len().min(b.len());
    shared as f32 / smaller as f32
}

const EXACT_MATCH_THRESHOLD: f32 = 0.5;

fn press(digit: char, label: &str, reason: impl Into<String>) -> DtmfDecision {
    DtmfDecision {
        should_press: true,
        digit: Some(digit),
        matched_option: Some(label.to_string()),
        reason: reason.into(),
    }
}

fn decline(reason: impl Into<String>) -> DtmfDecision {
    DtmfDecision {
        should_press: false,
        digit: None,
        matched_option: None,
        reason: reason.into(),
    }
}

/// Pick a digit for the current menu given the call's purpose, or decline.
/// Implements the seven-rule priority order from §4.3 exactly. Loop
/// suppression is intentionally out of scope here.
pub fn choose_digit(
    utterance: &str,
    options: &MenuSet,
    call_purpose: &str,
    custom_instructions: &str,
) -> DtmfDecision {
    // Rule 1: no options, likely a fragment.
    if options.is_empty() {
        return decline("no menu options extracted yet, likely a speech fragment");
    }

    let purpose_tokens = tokenize(call_purpose);

    // Rule 2: exact semantic match between purpose and an option.
    let mut best: Option<(&ivr_core::MenuOption, f32)> = None;
    for opt in options.iter() {
        let score = overlap_score(&purpose_tokens, &tokenize(&opt.label));
        if score >= EXACT_MATCH_THRESHOLD && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((opt, score));
        }
    }
    if let Some((opt, score)) = best {
        return press(
            opt.digit,
            &opt.label,
            format!("option \"{}\" matches call purpose (overlap {score:.2})", opt.label),
        );
    }

    // Rule 3: purpose asks for a human; match representative-adjacent labels.
    let purpose_lower = call_purpose.to_lowercase();
    let wants_representative = REPRESENTATIVE_PURPOSE_MARKERS
        .iter()
        .any(|marker| purpose_lower.contains(marker));
    if wants_representative {
        if let Some(opt) = options.iter().find(|opt| {
            REPRESENTATIVE_SYNONYMS
                .iter()
                .any(|syn| opt.label.contains(syn))
        }) {
            return press(
                opt.digit,
                &opt.label,
                "call purpose asks for a representative; option advertises one",
            );
        }
    }

    // Rule 4: continuation question ("press 1 for yes, 2 for no") — press
    // the option that continues toward the goal. Absent explicit negative
    // intent in custom_instructions, the affirmative path continues toward
    // the goal, so the "yes" option is chosen.
    let yes_opt = options.iter().find(|opt| opt.label == "yes" || opt.label.starts_with("yes "));
    let no_opt = options.iter().find(|opt| opt.label == "no" || opt.label.starts_with("no "));
    if let (Some(yes), Some(_no)) = (yes_opt, no_opt) {
        let declines_continuation = custom_instructions.to_lowercase().contains("say no");
        if !declines_continuation {
            return press(
                yes.digit,
                &yes.label,
                "continuation question; affirmative option continues toward the goal",
            );
        }
    }

    // Rule 5: purpose asks for a phone number and the menu wants digits
    // entered directly — decline, the orchestrator speaks the number aloud.
    let purpose_wants_phone_number =
        purpose_tokens.contains("phone") && purpose_tokens.contains("number");
    if purpose_wants_phone_number
        && options
            .iter()
            .any(|opt| opt.label.contains("enter") && opt.label.contains("number"))
    {
        return decline(
            "menu requests a phone number be entered; the agent will speak it instead of pressing digits",
        );
    }

    // Rule 6: generic "other / otherwise / all other questions" fallback.
    if let Some(opt) = options
        .iter()
        .find(|opt| GENERIC_FALLBACK_LABELS.iter().any(|g| opt.label.contains(g)))
    {
        return press(opt.digit, &opt.label, "no direct match; using generic fallback option");
    }

    // Rule 7: decline.
    let _ = utterance; // kept for signature symmetry / future use by callers
    decline("no option matches the call purpose")
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivr_core::MenuOption;

    fn menu(opts: &[(char, &str)]) -> MenuSet {
        MenuSet::from_options(opts.iter().map(|(d, l)| MenuOption::new(*d, *l)))
    }

    #[test]
    fn empty_menu_declines() {
        let decision = choose_digit("", &MenuSet::new(), "speak with a representative", "");
        assert!(!decision.should_press);
    }

    #[test]
    fn representative_purpose_matches_representative_option() {
        let options = menu(&[('0', "speak with a representative"), ('1', "sales")]);
        let decision = choose_digit("", &options, "speak with a representative", "");
        assert!(decision.should_press);
        assert_eq!(decision.digit, Some('0'));
    }

    #[test]
    fn generic_fallback_used_when_nothing_else_matches() {
        let options = menu(&[
            ('2', "financial estimate"),
            ('3', "prior authorization"),
            ('4', "insurance company"),
            ('5', "all other inquiries"),
        ]);
        let decision = choose_digit("", &options, "schedule an appointment", "");
        assert!(decision.should_press);
        assert_eq!(decision.digit, Some('5'));
    }

    #[test]
    fn continuation_question_presses_yes() {
        let options = menu(&[('1', "yes"), ('2', "no")]);
        let decision = choose_digit("press 1 for yes, 2 for no", &options, "schedule an appointment", "");
        assert!(decision.should_press);
        assert_eq!(decision.digit, Some('1'));
    }

    #[test]
    fn phone_number_request_declines_in_favor_of_speaking_it() {
        let options = menu(&[('1', "enter your 10 digit phone number")]);
        let decision = choose_digit("", &options, "provide my phone number for a callback", "");
        assert!(!decision.should_press);
    }

    #[test]
    fn no_match_declines() {
        let options = menu(&[('1', "sales"), ('2', "billing")]);
        let decision = choose_digit("", &options, "schedule a dentist appointment", "");
        assert!(!decision.should_press);
    }
}
