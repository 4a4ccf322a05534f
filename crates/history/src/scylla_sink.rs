//! ScyllaDB-backed history sink, feature-gated behind `scylla-backend`.
//! Grounded on the teacher's `ScyllaClient::connect`/`ensure_schema` pattern:
//! a thin session wrapper plus raw CQL schema strings, generalized from the
//! teacher's per-domain table set to one `calls` metadata table plus one
//! append-only `call_events` table.

use async_trait::async_trait;
use chrono::Utc;
use scylla::{Session, SessionBuilder};

use ivr_core::{CallId, HistoryEvent, MenuSet, Speaker, TerminationReason};

use crate::{HistoryError, HistorySink};

#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub replication_factor: u8,
}

impl Default for ScyllaConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1:9042".to_string()],
            keyspace: "ivr_agent".to_string(),
            replication_factor: 1,
        }
    }
}

pub struct ScyllaHistorySink {
    session: Session,
    keyspace: String,
}

impl ScyllaHistorySink {
    pub async fn connect(config: ScyllaConfig) -> Result<Self, HistoryError> {
        tracing::info!(hosts = ?config.hosts, keyspace = %config.keyspace, "connecting to ScyllaDB for call history");

        let session = SessionBuilder::new()
            .known_nodes(&config.hosts)
            .build()
            .await
            .map_err(|err| backend_error("<connect>", err))?;

        let sink = Self {
            session,
            keyspace: config.keyspace.clone(),
        };
        sink.ensure_schema(config.replication_factor).await?;
        Ok(sink)
    }

    async fn ensure_schema(&self, replication_factor: u8) -> Result<(), HistoryError> {
        self.run(format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
            self.keyspace, replication_factor
        ))
        .await?;

        self.run(format!(
            r#"
            CREATE TABLE IF NOT EXISTS {}.calls (
                call_id TEXT PRIMARY KEY,
                to_number TEXT,
                from_number TEXT,
                started_at TIMESTAMP,
                ended_at TIMESTAMP,
                transfer_success BOOLEAN
            )
            "#,
            self.keyspace
        ))
        .await?;

        self.run(format!(
            r#"
            CREATE TABLE IF NOT EXISTS {}.call_events (
                call_id TEXT,
                at TIMESTAMP,
                event_json TEXT,
                PRIMARY KEY ((call_id), at)
            ) WITH CLUSTERING ORDER BY (at ASC)
            "#,
            self.keyspace
        ))
        .await?;

        tracing::info!(keyspace = %self.keyspace, "call history schema ensured");
        Ok(())
    }

    async fn run(&self, query: String) -> Result<(), HistoryError> {
        self.session
            .query_unpaged(query, &[])
            .await
            .map(|_| ())
            .map_err(|err| backend_error("<schema>", err))
    }

    async fn append_event(&self, call_id: &CallId, event: HistoryEvent) -> Result<(), HistoryError> {
        let event_json = serde_json::to_string(&event)
            .map_err(|err| backend_error(call_id.as_str(), err))?;

        let query = format!(
            "INSERT INTO {}.call_events (call_id, at, event_json) VALUES (?, ?, ?)",
            self.keyspace
        );
        self.session
            .query_unpaged(query, (call_id.as_str(), Utc::now(), event_json))
            .await
            .map(|_| ())
            .map_err(|err| backend_error(call_id.as_str(), err))
    }
}

fn backend_error(call_id: &str, err: impl std::fmt::Display) -> HistoryError {
    HistoryError::Backend {
        call_id: CallId::new(call_id),
        message: err.to_string(),
    }
}

#[async_trait]
impl HistorySink for ScyllaHistorySink {
    async fn start_call(
        &self,
        call_id: &CallId,
        to_number: Option<String>,
        from_number: Option<String>,
    ) -> Result<(), HistoryError> {
        let query = format!(
            "INSERT INTO {}.calls (call_id, to_number, from_number, started_at) VALUES (?, ?, ?, ?)",
            self.keyspace
        );
        self.session
            .query_unpaged(query, (call_id.as_str(), to_number, from_number, Utc::now()))
            .await
            .map(|_| ())
            .map_err(|err| backend_error(call_id.as_str(), err))
    }

    async fn add_conversation(&self, call_id: &CallId, speaker: Speaker, text: &str) -> Result<(), HistoryError> {
        let label = match speaker {
            Speaker::Caller => "caller",
            Speaker::Agent => "agent",
            Speaker::System => "system",
        };
        self.append_event(
            call_id,
            HistoryEvent::Conversation {
                speaker: label.to_string(),
                text: text.to_string(),
                at: Utc::now(),
            },
        )
        .await
    }

    async fn add_digit(&self, call_id: &CallId, digit: char, matched_option: Option<String>) -> Result<(), HistoryError> {
        self.append_event(
            call_id,
            HistoryEvent::Dtmf {
                digit,
                matched_option,
                at: Utc::now(),
            },
        )
        .await
    }

    async fn add_menu(&self, call_id: &CallId, options: &MenuSet, complete: bool) -> Result<(), HistoryError> {
        self.append_event(
            call_id,
            HistoryEvent::Menu {
                options: options.iter().map(|o| (o.digit, o.label.clone())).collect(),
                complete,
                at: Utc::now(),
            },
        )
        .await
    }

    async fn add_transfer(
        &self,
        call_id: &CallId,
        destination: &str,
        leg_call_id: Option<CallId>,
    ) -> Result<(), HistoryError> {
        self.append_event(
            call_id,
            HistoryEvent::Transfer {
                destination: destination.to_string(),
                leg_call_id: leg_call_id.map(|id| id.as_str().to_string()),
                at: Utc::now(),
            },
        )
        .await
    }

    async fn update_transfer_success(&self, call_id: &CallId, success: bool) -> Result<(), HistoryError> {
        let query = format!(
            "UPDATE {}.calls SET transfer_success = ? WHERE call_id = ?",
            self.keyspace
        );
        self.session
            .query_unpaged(query, (success, call_id.as_str()))
            .await
            .map(|_| ())
            .map_err(|err| backend_error(call_id.as_str(), err))
    }

    async fn add_termination(&self, call_id: &CallId, reason: TerminationReason, message: &str) -> Result<(), HistoryError> {
        self.append_event(
            call_id,
            HistoryEvent::Termination {
                reason,
                message: message.to_string(),
                at: Utc::now(),
            },
        )
        .await
    }

    async fn end_call(&self, call_id: &CallId) -> Result<(), HistoryError> {
        let query = format!("UPDATE {}.calls SET ended_at = ? WHERE call_id = ?", self.keyspace);
        self.session
            .query_unpaged(query, (Utc::now(), call_id.as_str()))
            .await
            .map(|_| ())
            .map_err(|err| backend_error(call_id.as_str(), err))
    }
}
