//! Identifiers shared across every crate in the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for a single telephony call leg, as assigned by the carrier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CallId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for CallId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}
