//! The carrier-facing webhook surface (§4.7): five `/voice/*` endpoints plus
//! health, readiness, metrics, and config-reload. Every `/voice/*` handler
//! answers with HTTP 200 and a TwiML-shaped XML body no matter what goes
//! wrong internally — the carrier is never shown a non-2xx response or an
//! opaque error page mid-call.

use std::time::Duration;

use axum::extract::{Form, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use ivr_config::TurnOverride;
use ivr_core::CallId;
use ivr_orchestrator::{OrchestratorError, SpeechOrchestrator, TurnInput};
use ivr_telephony::{CallStatus, TelephonyResponse};

use crate::state::AppState;

const APOLOGY: &str = "Sorry, something went wrong on our end. Goodbye.";
const READINESS_TIMEOUT: Duration = Duration::from_secs(3);

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/voice/call-start", post(call_start))
        .route("/voice/speech-turn", post(speech_turn))
        .route("/voice/digit-turn", post(digit_turn))
        .route("/voice/call-status", post(call_status))
        .route("/voice/transfer-status", post(transfer_status))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(crate::metrics::metrics_handler))
        .route("/admin/reload-config", post(reload_config))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn xml_response(body: TelephonyResponse) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml")],
        body.render(),
    )
        .into_response()
}

/// Run a turn on a detached task so a panic inside the orchestrator (a
/// poisoned lock, an unexpected `unwrap`) surfaces as a `JoinError` instead
/// of taking the whole webhook surface down — mirroring a defensive webhook
/// handler's `catch_unwind` the way §7 describes, without fighting async's
/// `!UnwindSafe` futures.
async fn run_turn_safely(orchestrator: SpeechOrchestrator, input: TurnInput) -> TelephonyResponse {
    let call_id = input.call_id.clone();
    match tokio::spawn(async move { orchestrator.handle_turn(input).await }).await {
        Ok(Ok(response)) => response,
        Ok(Err(OrchestratorError::UnknownCall(id))) => {
            tracing::warn!(call_id = %id, "turn received for a call with no recorded call-start");
            TelephonyResponse::say_then_hangup(APOLOGY)
        }
        Ok(Err(err)) => {
            tracing::error!(call_id = %call_id, error = %err, "orchestrator returned an unexpected error");
            TelephonyResponse::say_then_hangup(APOLOGY)
        }
        Err(join_err) => {
            tracing::error!(call_id = %call_id, panicked = join_err.is_panic(), "turn task did not complete");
            TelephonyResponse::say_then_hangup(APOLOGY)
        }
    }
}

/// Mirrors the carrier's outbound-call-origination field naming (§6,
/// `CarrierClient::originate_call`'s Twilio-shaped counterpart). `call_sid`
/// is `Option` rather than required: a missing call-id is a malformed
/// request (§7), not a deserialization failure the carrier would see as a
/// raw 4xx — the handler converts it into the same apology-and-hangup reply
/// every other internal failure produces.
#[derive(Debug, Deserialize)]
struct CallStartForm {
    #[serde(rename = "CallSid", default)]
    call_sid: Option<String>,
    #[serde(rename = "To")]
    to: Option<String>,
    #[serde(rename = "From")]
    from: Option<String>,
}

async fn call_start(
    State(state): State<AppState>,
    Query(turn_override): Query<TurnOverride>,
    Form(form): Form<CallStartForm>,
) -> Response {
    let Some(call_sid) = form.call_sid.filter(|s| !s.is_empty()) else {
        tracing::warn!("call-start received with no CallSid; malformed carrier request");
        return xml_response(TelephonyResponse::say_then_hangup(APOLOGY));
    };
    let call_id = CallId::new(call_sid);
    tracing::info!(
        call_id = %call_id,
        to = %form.to.as_deref().map(ivr_core::RedactedPhone).map(|r| r.to_string()).unwrap_or_default(),
        from = %form.from.as_deref().map(ivr_core::RedactedPhone).map(|r| r.to_string()).unwrap_or_default(),
        "call started"
    );
    let response = state
        .orchestrator
        .handle_call_start(&call_id, form.to, form.from, &turn_override);
    xml_response(response)
}

#[derive(Debug, Deserialize)]
struct SpeechTurnForm {
    #[serde(rename = "CallSid", default)]
    call_sid: Option<String>,
    #[serde(rename = "SpeechResult", default)]
    speech_result: Option<String>,
}

async fn speech_turn(
    State(state): State<AppState>,
    Query(turn_override): Query<TurnOverride>,
    Form(form): Form<SpeechTurnForm>,
) -> Response {
    let Some(call_sid) = form.call_sid.filter(|s| !s.is_empty()) else {
        tracing::warn!("speech-turn received with no CallSid; malformed carrier request");
        return xml_response(TelephonyResponse::say_then_hangup(APOLOGY));
    };
    // A present-but-empty transcript is a valid value (the caller said
    // nothing intelligible); a missing field entirely is a malformed
    // request and must not be treated the same way.
    let Some(speech_result) = form.speech_result else {
        tracing::warn!("speech-turn received with no SpeechResult field; malformed carrier request");
        return xml_response(TelephonyResponse::say_then_hangup(APOLOGY));
    };
    let call_id = CallId::new(call_sid);
    tracing::debug!(
        call_id = %call_id,
        speech = %ivr_core::RedactedText(&speech_result),
        "speech turn received"
    );
    let input = TurnInput {
        call_id,
        utterance: speech_result,
        turn_override,
    };
    let response = run_turn_safely(state.orchestrator.clone(), input).await;
    xml_response(response)
}

#[derive(Debug, Deserialize)]
struct DigitTurnForm {
    #[serde(rename = "CallSid", default)]
    call_sid: Option<String>,
    #[serde(rename = "Digits", default)]
    digits: String,
}

/// `digit-turn`: records that the press was sent and returns a fresh gather
/// (§4.7) — the caller's own keypad press, not one the agent initiated, so
/// it's recorded and acknowledged without running the classifier suite.
async fn digit_turn(State(state): State<AppState>, Form(form): Form<DigitTurnForm>) -> Response {
    let Some(call_sid) = form.call_sid.filter(|s| !s.is_empty()) else {
        tracing::warn!("digit-turn received with no CallSid; malformed carrier request");
        return xml_response(TelephonyResponse::say_then_hangup(APOLOGY));
    };
    if form.digits.is_empty() {
        tracing::warn!(call_id = %call_sid, "digit-turn received with no Digits; malformed carrier request");
        return xml_response(TelephonyResponse::say_then_hangup(APOLOGY));
    }
    let call_id = CallId::new(call_sid);
    let digit = form.digits.chars().next().unwrap_or('0');
    match state.orchestrator.handle_digit_turn(&call_id, digit).await {
        Ok(response) => xml_response(response),
        Err(err) => {
            tracing::warn!(call_id = %call_id, error = %err, "digit-turn for an unrecognized call");
            xml_response(TelephonyResponse::say_then_hangup(APOLOGY))
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallStatusForm {
    #[serde(rename = "CallSid", default)]
    call_sid: Option<String>,
    #[serde(rename = "CallStatus")]
    call_status: CallStatus,
}

async fn call_status(State(state): State<AppState>, Form(form): Form<CallStatusForm>) -> StatusCode {
    // No TTS is at stake on this callback (it carries no speech to respond
    // to), so a missing call-id is simply a no-op rather than an apology —
    // §7's "never surface a non-2xx" is still satisfied either way.
    if let Some(call_sid) = form.call_sid.filter(|s| !s.is_empty()) {
        state.orchestrator.handle_call_status(&CallId::new(call_sid), form.call_status);
    } else {
        tracing::warn!("call-status received with no CallSid; ignoring");
    }
    StatusCode::OK
}

/// Twilio's own `<Dial>` status-callback field names — the transfer leg's
/// sid and status, correlated back to the primary call (§4.7, §3).
#[derive(Debug, Deserialize)]
struct TransferStatusForm {
    #[serde(rename = "CallSid", default)]
    call_sid: Option<String>,
    #[serde(rename = "DialCallSid", default)]
    dial_call_sid: Option<String>,
    #[serde(rename = "DialCallStatus")]
    dial_call_status: CallStatus,
}

async fn transfer_status(State(state): State<AppState>, Form(form): Form<TransferStatusForm>) -> StatusCode {
    let Some(call_sid) = form.call_sid.filter(|s| !s.is_empty()) else {
        tracing::warn!("transfer-status received with no CallSid; ignoring");
        return StatusCode::OK;
    };
    let call_id = CallId::new(call_sid);
    let leg_call_id = form.dial_call_sid.map(CallId::new).unwrap_or_else(|| call_id.clone());
    state
        .orchestrator
        .handle_transfer_status(&call_id, &leg_call_id, form.dial_call_status);
    StatusCode::OK
}

#[derive(Debug, serde::Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> axum::Json<HealthBody> {
    axum::Json(HealthBody {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, serde::Serialize)]
struct ReadyBody {
    ready: bool,
    llm_reachable: bool,
}

/// Readiness probes the LLM backend's base endpoint within a short timeout
/// (§4.7). A slow or unreachable backend marks the process not-ready without
/// affecting liveness — existing calls keep being served on their fallback
/// heuristics (§4.2) while the load balancer stops sending new traffic here.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, axum::Json<ReadyBody>) {
    let endpoint = state.get_settings().llm.endpoint.clone();
    let client = reqwest::Client::new();
    let llm_reachable = tokio::time::timeout(READINESS_TIMEOUT, client.get(&endpoint).send())
        .await
        .map(|result| result.is_ok())
        .unwrap_or(false);

    let body = ReadyBody {
        ready: llm_reachable,
        llm_reachable,
    };
    let status = if llm_reachable { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, axum::Json(body))
}

async fn reload_config(State(state): State<AppState>) -> StatusCode {
    match state.reload_config() {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            tracing::error!(error = %err, "config reload failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    use ivr_config::Settings;
    use ivr_history::InMemoryHistorySink;
    use ivr_telephony::{CarrierClient, TelephonyError};

    #[derive(Default)]
    struct FakeCarrier;

    #[async_trait]
    impl CarrierClient for FakeCarrier {
        async fn originate_call(&self, _to: &str, _from: &str, _webhook_url: &str) -> Result<CallId, TelephonyError> {
            Ok(CallId::new("CA-test"))
        }
        async fn send_digits(&self, _call_id: &CallId, _digits: &str) -> Result<(), TelephonyError> {
            Ok(())
        }
        async fn fetch_call_status(&self, _call_id: &CallId) -> Result<CallStatus, TelephonyError> {
            Ok(CallStatus::InProgress)
        }
    }

    fn test_state() -> AppState {
        let handle = PrometheusBuilder::new()
            .build_recorder()
            .handle();
        AppState::new(
            Settings::default(),
            Arc::new(InMemoryHistorySink::new()),
            Arc::new(FakeCarrier),
            handle,
            None,
        )
    }

    #[tokio::test]
    async fn health_check_reports_ok() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn call_start_returns_xml_gather() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/voice/call-start")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("CallSid=CA1&To=%2B15550100&From=%2B15550111"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/xml"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8(body.to_vec()).unwrap().contains("<Gather"));
    }

    #[tokio::test]
    async fn speech_turn_on_unknown_call_apologizes_and_hangs_up() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/voice/speech-turn")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("CallSid=never-started&SpeechResult=hello"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8(body.to_vec()).unwrap().contains("Hangup"));
    }

    #[tokio::test]
    async fn call_start_missing_call_sid_apologizes_with_2xx_not_a_raw_rejection() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/voice/call-start")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("To=%2B15550100"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8(body.to_vec()).unwrap().contains("Hangup"));
    }

    #[tokio::test]
    async fn speech_turn_missing_speech_result_apologizes_with_2xx_not_a_raw_rejection() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/voice/speech-turn")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("CallSid=CA1"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8(body.to_vec()).unwrap().contains("Hangup"));
    }

    #[tokio::test]
    async fn call_status_terminal_clears_state() {
        let state = test_state();
        let app = create_router(state.clone());

        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/voice/call-start")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("CallSid=CA1"))
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/voice/call-status")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("CallSid=CA1&CallStatus=completed"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.state_store.get(&CallId::new("CA1")).is_none());
    }
}
