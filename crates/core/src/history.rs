//! The call-history event stream: a small tagged union (§6 external interfaces).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::TerminationReason;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    Conversation {
        speaker: String,
        text: String,
        at: DateTime<Utc>,
    },
    Dtmf {
        digit: char,
        matched_option: Option<String>,
        at: DateTime<Utc>,
    },
    Menu {
        options: Vec<(char, String)>,
        complete: bool,
        at: DateTime<Utc>,
    },
    Transfer {
        destination: String,
        leg_call_id: Option<String>,
        at: DateTime<Utc>,
    },
    Termination {
        reason: TerminationReason,
        message: String,
        at: DateTime<Utc>,
    },
}
