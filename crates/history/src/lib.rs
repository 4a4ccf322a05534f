//! The Call History Sink: an append-only log of every call's events, kept
//! independent of the live call-state store so a call's record survives
//! after its state is evicted (§4.8).
//!
//! The orchestrator invokes every method here fire-and-forget (`tokio::spawn`,
//! result logged not awaited) — a history write must never slow down or fail
//! a turn.

pub mod memory;
#[cfg(feature = "scylla-backend")]
pub mod scylla_sink;

pub use memory::InMemoryHistorySink;
#[cfg(feature = "scylla-backend")]
pub use scylla_sink::{ScyllaConfig, ScyllaHistorySink};

use async_trait::async_trait;
use thiserror::Error;

use ivr_core::{CallId, MenuSet, Speaker, TerminationReason};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history backend error for call {call_id}: {message}")]
    Backend { call_id: CallId, message: String },
}

/// Append-only event sink, keyed by call-id. A duplicate `start_call` for a
/// call already known to the sink upserts rather than erroring — callers
/// retry call-start delivery and the sink must tolerate it.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn start_call(
        &self,
        call_id: &CallId,
        to_number: Option<String>,
        from_number: Option<String>,
    ) -> Result<(), HistoryError>;

    async fn add_conversation(
        &self,
        call_id: &CallId,
        speaker: Speaker,
        text: &str,
    ) -> Result<(), HistoryError>;

    async fn add_digit(
        &self,
        call_id: &CallId,
        digit: char,
        matched_option: Option<String>,
    ) -> Result<(), HistoryError>;

    async fn add_menu(&self, call_id: &CallId, options: &MenuSet, complete: bool) -> Result<(), HistoryError>;

    async fn add_transfer(
        &self,
        call_id: &CallId,
        destination: &str,
        leg_call_id: Option<CallId>,
    ) -> Result<(), HistoryError>;

    async fn update_transfer_success(&self, call_id: &CallId, success: bool) -> Result<(), HistoryError>;

    async fn add_termination(
        &self,
        call_id: &CallId,
        reason: TerminationReason,
        message: &str,
    ) -> Result<(), HistoryError>;

    async fn end_call(&self, call_id: &CallId) -> Result<(), HistoryError>;
}
