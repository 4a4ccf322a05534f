//! Per-call mutable state, owned exclusively by the Call State Store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CallConfig;
use crate::conversation::ConversationHistory;
use crate::ids::CallId;
use crate::menu::MenuSet;

/// Hard cap on `incomplete_speech_wait_count` (§5 resource limits).
pub const MAX_INCOMPLETE_SPEECH_WAITS: u8 = 2;
/// Hard cap on `consecutive_presses` length (§5 resource limits).
pub const MAX_CONSECUTIVE_PRESS_ENTRIES: usize = 5;
/// Conservative cap on `previous_menus`; the spec leaves this unbounded and
/// notes implementers may cap it (§9 open questions). See DESIGN.md.
pub const MAX_PREVIOUS_MENUS: usize = 50;

/// Tally of a run of identical digit presses, used for loop suppression rule
/// "last consecutive-press run has count >= 3 for the last-pressed digit".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsecutivePress {
    pub digit: char,
    pub count: u32,
}

/// Mutable per-call state. One entry per call-id (invariant 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallState {
    pub call_id: CallId,
    pub created_at: DateTime<Utc>,

    /// Ordered sequence of observed *complete* menus (invariant 6: never grows
    /// on incomplete fragments). Used for loop detection.
    previous_menus: Vec<MenuSet>,

    /// Options accumulated from incomplete utterances, awaiting completion.
    pub partial_menu_options: MenuSet,
    /// True when the last turn looked like a menu but was judged incomplete.
    pub awaiting_complete_menu: bool,

    /// The last processed utterance, kept for merging with a follow-up fragment.
    pub last_speech: Option<String>,
    /// True when the last utterance was judged cut off mid-phrase.
    pub awaiting_complete_speech: bool,
    /// Bounded retries for merging fragments (hard cap `MAX_INCOMPLETE_SPEECH_WAITS`).
    pub incomplete_speech_wait_count: u8,

    pub last_pressed_digit: Option<char>,
    pub last_menu_for_digit: Option<MenuSet>,
    /// Bounded sequence tallying runs of identical digits (cap `MAX_CONSECUTIVE_PRESS_ENTRIES`).
    consecutive_presses: Vec<ConsecutivePress>,

    pub awaiting_human_confirmation: bool,
    pub human_confirmed: bool,

    pub conversation_history: ConversationHistory,

    pub config: CallConfig,

    /// Supplemental fields carried from call-start, not named by the core
    /// data model but needed by the call-history sink's upsert schema.
    pub to_number: Option<String>,
    pub from_number: Option<String>,
    pub turn_count: u64,
    pub transfer_leg_call_id: Option<CallId>,
}

impl CallState {
    pub fn new(call_id: CallId, config: CallConfig) -> Self {
        Self {
            call_id,
            created_at: Utc::now(),
            previous_menus: Vec::new(),
            partial_menu_options: MenuSet::new(),
            awaiting_complete_menu: false,
            last_speech: None,
            awaiting_complete_speech: false,
            incomplete_speech_wait_count: 0,
            last_pressed_digit: None,
            last_menu_for_digit: None,
            consecutive_presses: Vec::new(),
            awaiting_human_confirmation: false,
            human_confirmed: false,
            conversation_history: ConversationHistory::new(),
            config,
            to_number: None,
            from_number: None,
            turn_count: 0,
            transfer_leg_call_id: None,
        }
    }

    pub fn previous_menus(&self) -> &[MenuSet] {
        &self.previous_menus
    }

    /// Append a complete menu to `previous_menus`, capping length (oldest evicted first).
    /// Never call this for an incomplete menu (invariant 6).
    pub fn push_previous_menu(&mut self, menu: MenuSet) {
        self.previous_menus.push(menu);
        while self.previous_menus.len() > MAX_PREVIOUS_MENUS {
            self.previous_menus.remove(0);
        }
    }

    pub fn consecutive_presses(&self) -> &[ConsecutivePress] {
        &self.consecutive_presses
    }

    /// Record a digit press, extending the current run if it matches the last
    /// entry's digit, or starting a new one. Caps the tally length.
    pub fn record_press(&mut self, digit: char) {
        match self.consecutive_presses.last_mut() {
            Some(last) if last.digit == digit => {
                last.count += 1;
            }
            _ => {
                self.consecutive_presses.push(ConsecutivePress { digit, count: 1 });
                while self.consecutive_presses.len() > MAX_CONSECUTIVE_PRESS_ENTRIES {
                    self.consecutive_presses.remove(0);
                }
            }
        }
        self.last_pressed_digit = Some(digit);
    }

    /// The run length for the currently last-pressed digit, or 0 if none.
    pub fn current_press_run_count(&self) -> u32 {
        self.consecutive_presses
            .last()
            .map(|p| p.count)
            .unwrap_or(0)
    }

    pub fn clear_partial_menu(&mut self) {
        self.partial_menu_options = MenuSet::new();
        self.awaiting_complete_menu = false;
    }

    pub fn clear_incomplete_speech(&mut self) {
        self.last_speech = None;
        self.awaiting_complete_speech = false;
        self.incomplete_speech_wait_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::MenuOption;

    fn new_state() -> CallState {
        CallState::new(CallId::new("CA123"), CallConfig::default())
    }

    #[test]
    fn record_press_extends_run_on_repeat_digit() {
        let mut state = new_state();
        state.record_press('5');
        state.record_press('5');
        state.record_press('5');
        assert_eq!(state.current_press_run_count(), 3);
        assert_eq!(state.last_pressed_digit, Some('5'));
    }

    #[test]
    fn record_press_starts_new_run_on_different_digit() {
        let mut state = new_state();
        state.record_press('5');
        state.record_press('5');
        state.record_press('1');
        assert_eq!(state.current_press_run_count(), 1);
        assert_eq!(state.consecutive_presses().len(), 2);
    }

    #[test]
    fn previous_menus_capped_at_max() {
        let mut state = new_state();
        for i in 0..(MAX_PREVIOUS_MENUS + 10) {
            let mut menu = MenuSet::new();
            menu.insert(MenuOption::new('1', format!("option {i}")));
            state.push_previous_menu(menu);
        }
        assert_eq!(state.previous_menus().len(), MAX_PREVIOUS_MENUS);
    }

    #[test]
    fn clear_partial_menu_resets_flag_and_buffer() {
        let mut state = new_state();
        state.partial_menu_options.insert(MenuOption::new('1', "sales"));
        state.awaiting_complete_menu = true;
        state.clear_partial_menu();
        assert!(!state.awaiting_complete_menu);
        assert!(state.partial_menu_options.is_empty());
    }
}
