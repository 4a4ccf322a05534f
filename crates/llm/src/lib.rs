//! OpenAI-compatible chat completion client used by the classifier suite.
//!
//! Every call is schema-constrained: the caller supplies a JSON schema, the
//! client asks the backend for strict structured output, validates the
//! response against the schema, and deserializes it. There is no retry and
//! no streaming — each classifier call is a single round trip bounded by a
//! hard timeout (§4.1).

pub mod client;

pub use client::{LlmClient, LlmClientConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("network error talking to the LLM backend: {0}")]
    Network(String),
    #[error("LLM request timed out")]
    Timeout,
    #[error("LLM backend returned an error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("LLM response was not valid JSON: {0}")]
    InvalidJson(String),
    #[error("LLM response did not match the requested schema: {0}")]
    SchemaMismatch(String),
    #[error("invalid LLM client configuration: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}
