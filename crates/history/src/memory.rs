//! Default in-process history sink, backed by a `DashMap` so calls on
//! different shards never contend. Lost on restart, same as the call state
//! store — durable history is the `scylla-backend` feature's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use ivr_core::{CallId, HistoryEvent, MenuSet, Speaker, TerminationReason};

use crate::{HistoryError, HistorySink};

/// One call's full in-memory record: metadata plus its append-only event log.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub call_id: CallId,
    pub to_number: Option<String>,
    pub from_number: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub transfer_success: Option<bool>,
    pub events: Vec<HistoryEvent>,
}

impl CallRecord {
    fn new(call_id: CallId, to_number: Option<String>, from_number: Option<String>) -> Self {
        Self {
            call_id,
            to_number,
            from_number,
            started_at: Utc::now(),
            ended_at: None,
            transfer_success: None,
            events: Vec::new(),
        }
    }
}

#[derive(Default)]
pub struct InMemoryHistorySink {
    calls: DashMap<CallId, CallRecord>,
}

impl InMemoryHistorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/admin introspection: a snapshot of everything recorded for a
    /// call, or `None` if `start_call` was never recorded for it.
    pub fn record_for(&self, call_id: &CallId) -> Option<CallRecord> {
        self.calls.get(call_id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl HistorySink for InMemoryHistorySink {
    async fn start_call(
        &self,
        call_id: &CallId,
        to_number: Option<String>,
        from_number: Option<String>,
    ) -> Result<(), HistoryError> {
        self.calls
            .entry(call_id.clone())
            .and_modify(|record| {
                record.to_number = to_number.clone();
                record.from_number = from_number.clone();
            })
            .or_insert_with(|| CallRecord::new(call_id.clone(), to_number, from_number));
        Ok(())
    }

    async fn add_conversation(&self, call_id: &CallId, speaker: Speaker, text: &str) -> Result<(), HistoryError> {
        self.push(
            call_id,
            HistoryEvent::Conversation {
                speaker: speaker_label(speaker).to_string(),
                text: text.to_string(),
                at: Utc::now(),
            },
        )
    }

    async fn add_digit(&self, call_id: &CallId, digit: char, matched_option: Option<String>) -> Result<(), HistoryError> {
        self.push(
            call_id,
            HistoryEvent::Dtmf {
                digit,
                matched_option,
                at: Utc::now(),
            },
        )
    }

    async fn add_menu(&self, call_id: &CallId, options: &MenuSet, complete: bool) -> Result<(), HistoryError> {
        self.push(
            call_id,
            HistoryEvent::Menu {
                options: options.iter().map(|o| (o.digit, o.label.clone())).collect(),
                complete,
                at: Utc::now(),
            },
        )
    }

    async fn add_transfer(
        &self,
        call_id: &CallId,
        destination: &str,
        leg_call_id: Option<CallId>,
    ) -> Result<(), HistoryError> {
        self.push(
            call_id,
            HistoryEvent::Transfer {
                destination: destination.to_string(),
                leg_call_id: leg_call_id.map(|id| id.as_str().to_string()),
                at: Utc::now(),
            },
        )
    }

    async fn update_transfer_success(&self, call_id: &CallId, success: bool) -> Result<(), HistoryError> {
        match self.calls.get_mut(call_id) {
            Some(mut entry) => {
                entry.value_mut().transfer_success = Some(success);
                Ok(())
            }
            None => Err(HistoryError::Backend {
                call_id: call_id.clone(),
                message: "transfer status update for a call with no recorded start".to_string(),
            }),
        }
    }

    async fn add_termination(&self, call_id: &CallId, reason: TerminationReason, message: &str) -> Result<(), HistoryError> {
        self.push(
            call_id,
            HistoryEvent::Termination {
                reason,
                message: message.to_string(),
                at: Utc::now(),
            },
        )
    }

    async fn end_call(&self, call_id: &CallId) -> Result<(), HistoryError> {
        match self.calls.get_mut(call_id) {
            Some(mut entry) => {
                entry.value_mut().ended_at = Some(Utc::now());
                Ok(())
            }
            None => Err(HistoryError::Backend {
                call_id: call_id.clone(),
                message: "end_call for a call with no recorded start".to_string(),
            }),
        }
    }
}

impl InMemoryHistorySink {
    fn push(&self, call_id: &CallId, event: HistoryEvent) -> Result<(), HistoryError> {
        self.calls
            .entry(call_id.clone())
            .or_insert_with(|| CallRecord::new(call_id.clone(), None, None))
            .events
            .push(event);
        Ok(())
    }
}

fn speaker_label(speaker: Speaker) -> &'static str {
    match speaker {
        Speaker::Caller => "caller",
        Speaker::Agent => "agent",
        Speaker::System => "system",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivr_core::MenuOption;

    #[tokio::test]
    async fn start_call_is_idempotent_upsert() {
        let sink = InMemoryHistorySink::new();
        let call_id = CallId::new("CA1");
        sink.start_call(&call_id, Some("+15550100".to_string()), None).await.unwrap();
        sink.start_call(&call_id, Some("+15550199".to_string()), Some("+15550111".to_string()))
            .await
            .unwrap();

        let record = sink.record_for(&call_id).unwrap();
        assert_eq!(record.to_number, Some("+15550199".to_string()));
        assert_eq!(record.from_number, Some("+15550111".to_string()));
    }

    #[tokio::test]
    async fn events_accumulate_in_order() {
        let sink = InMemoryHistorySink::new();
        let call_id = CallId::new("CA1");
        sink.start_call(&call_id, None, None).await.unwrap();
        sink.add_conversation(&call_id, Speaker::Agent, "press 1 for sales").await.unwrap();
        let options = MenuSet::from_options([MenuOption::new('1', "sales")]);
        sink.add_menu(&call_id, &options, true).await.unwrap();
        sink.add_digit(&call_id, '1', Some("sales".to_string())).await.unwrap();

        let record = sink.record_for(&call_id).unwrap();
        assert_eq!(record.events.len(), 3);
    }

    #[tokio::test]
    async fn update_transfer_success_without_start_call_errors() {
        let sink = InMemoryHistorySink::new();
        let result = sink.update_transfer_success(&CallId::new("never-started"), true).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn end_call_records_ended_at() {
        let sink = InMemoryHistorySink::new();
        let call_id = CallId::new("CA1");
        sink.start_call(&call_id, None, None).await.unwrap();
        sink.end_call(&call_id).await.unwrap();
        assert!(sink.record_for(&call_id).unwrap().ended_at.is_some());
    }
}
