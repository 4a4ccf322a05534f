//! `SpeechOrchestrator::handle_turn` and its sibling call-lifecycle entry
//! points, implementing the ten-step per-turn pipeline exactly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use ivr_classifiers::looks_incomplete_heuristic;
use ivr_config::{ConfigResolver, TurnOverride};
use ivr_core::call_state::MAX_INCOMPLETE_SPEECH_WAITS;
use ivr_core::{CallId, ConversationTurn, MenuSet, Speaker};
use ivr_history::HistorySink;
use ivr_llm::LlmClient;
use ivr_processor::{process, ProcessContext};
use ivr_state::{CallStateStore, StateError};
use ivr_telephony::{CallStatus, CarrierClient, TelephonyResponse};

/// A turn is abandoned rather than left to hang forever on a stuck LLM call.
/// On expiry the orchestrator degrades to a plain `gather`, per §5.
const TURN_TIMEOUT: Duration = Duration::from_secs(25);

/// Default `Gather` listen window — the carrier's own default speech-timeout
/// (§6: max time to wait for speech to *start*; recording then runs until a
/// 2-second intra-speech pause) — used whenever a response doesn't carry an
/// explicit one (e.g. degrading on timeout, or listening after a partial menu).
const DEFAULT_GATHER_TIMEOUT_SECS: u32 = 15;

/// How long the carrier should ring the transfer destination before giving up.
const DIAL_TIMEOUT_SECS: u32 = 30;

/// Webhook path the carrier should post the caller's next utterance to.
const SPEECH_TURN_ACTION: &str = "/voice/speech-turn";

/// Webhook path the carrier should post the transfer leg's status to. Kept
/// distinct from the primary call's status-callback URL (§4.6 step 7) so a
/// status update about the transfer leg is never mistaken for one about the
/// original call.
const TRANSFER_STATUS_ACTION: &str = "/voice/transfer-status";

/// Confidence floor for treating a human-confirmation answer as genuine
/// (§4.6 step 9).
const HUMAN_CONFIRMATION_THRESHOLD: f32 = 0.7;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no call state exists for call {0}; call-start was never received")]
    UnknownCall(CallId),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Input for a single caller-speech turn.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub call_id: CallId,
    pub utterance: String,
    pub turn_override: TurnOverride,
}

fn plain_gather() -> TelephonyResponse {
    TelephonyResponse::Gather {
        prompt: None,
        action: SPEECH_TURN_ACTION.to_string(),
        timeout_secs: DEFAULT_GATHER_TIMEOUT_SECS,
    }
}

/// Ties every collaborator together behind one stateful entry point. Cheap
/// to clone — every field is an `Arc`.
#[derive(Clone)]
pub struct SpeechOrchestrator {
    state: Arc<CallStateStore>,
    config_resolver: Arc<ConfigResolver>,
    llm_client: Arc<LlmClient>,
    history: Arc<dyn HistorySink>,
    carrier: Arc<dyn CarrierClient>,
}

impl SpeechOrchestrator {
    pub fn new(
        state: Arc<CallStateStore>,
        config_resolver: Arc<ConfigResolver>,
        llm_client: Arc<LlmClient>,
        history: Arc<dyn HistorySink>,
        carrier: Arc<dyn CarrierClient>,
    ) -> Self {
        Self {
            state,
            config_resolver,
            llm_client,
            history,
            carrier,
        }
    }

    /// Step 0, not part of the ten-step turn pipeline: register a new call
    /// and return the first prompt-listening response.
    pub fn handle_call_start(
        &self,
        call_id: &CallId,
        to_number: Option<String>,
        from_number: Option<String>,
        turn_override: &TurnOverride,
    ) -> TelephonyResponse {
        let config = self.config_resolver.resolve_initial(turn_override);
        self.state.get_or_create(call_id, config);
        self.state.update(call_id, |state| {
            state.to_number = to_number.clone();
            state.from_number = from_number.clone();
        });

        self.spawn_history(call_id.clone(), {
            let history = Arc::clone(&self.history);
            let call_id = call_id.clone();
            async move {
                history.start_call(&call_id, to_number, from_number).await
            }
        });

        plain_gather()
    }

    /// The ten-step pipeline (§4.6), wrapped in the hard 25-second turn
    /// timeout. Timeout is not an error: it degrades to a plain `gather`.
    pub async fn handle_turn(&self, input: TurnInput) -> Result<TelephonyResponse, OrchestratorError> {
        let started = Instant::now();
        let result = match tokio::time::timeout(TURN_TIMEOUT, self.run_turn(&input)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::warn!(call_id = %input.call_id, "turn exceeded 25s budget, degrading to plain gather");
                Ok(plain_gather())
            }
        };
        metrics::histogram!("turn_duration_seconds").record(started.elapsed().as_secs_f64());
        result
    }

    async fn run_turn(&self, input: &TurnInput) -> Result<TelephonyResponse, OrchestratorError> {
        let call_id = &input.call_id;

        // Step 1: config resolution.
        let snapshot = self
            .state
            .get(call_id)
            .ok_or_else(|| OrchestratorError::UnknownCall(call_id.clone()))?;
        let config = self.config_resolver.resolve_for_turn(&input.turn_override, &snapshot.config);

        // Step 2: incomplete-speech merge.
        let merged_utterance = if snapshot.awaiting_complete_speech {
            match &snapshot.last_speech {
                Some(prev) => format!("{prev} {}", input.utterance),
                None => input.utterance.clone(),
            }
        } else {
            input.utterance.clone()
        };

        // Step 3: cheap pre-LLM heuristic. Buffer and wait rather than spend
        // a classifier call if the fragment still looks cut off and the call
        // hasn't already waited the maximum number of times. A genuinely
        // empty utterance is never buffered this way: invariant 2 requires
        // awaiting-complete-speech to imply a non-empty last-speech, so an
        // empty merge falls through to the normal turn path instead.
        if !merged_utterance.trim().is_empty()
            && looks_incomplete_heuristic(&merged_utterance)
            && snapshot.incomplete_speech_wait_count < MAX_INCOMPLETE_SPEECH_WAITS
        {
            self.state.update_existing(call_id, |state| {
                state.last_speech = Some(merged_utterance.clone());
                state.awaiting_complete_speech = true;
                state.incomplete_speech_wait_count += 1;
            })?;
            return Ok(plain_gather());
        }

        self.state.update_existing(call_id, |state| {
            state.clear_incomplete_speech();
            state.turn_count += 1;
            state
                .conversation_history
                .push(ConversationTurn::new(Speaker::System, merged_utterance.clone()));
        })?;

        // Step 4: history log (fire-and-forget).
        self.spawn_history(call_id.clone(), {
            let history = Arc::clone(&self.history);
            let call_id = call_id.clone();
            let text = merged_utterance.clone();
            async move { history.add_conversation(&call_id, Speaker::System, &text).await }
        });

        // Step 5: voice-processor invocation.
        let previous_menus = snapshot.previous_menus().to_vec();
        let decision = process(
            &self.llm_client,
            ProcessContext {
                utterance: &merged_utterance,
                previous_menus: &previous_menus,
                partial_menu_options: &snapshot.partial_menu_options,
                last_pressed_digit: snapshot.last_pressed_digit,
                consecutive_presses: snapshot.consecutive_presses(),
                config: &config,
            },
        )
        .await;

        // Step 6: termination branch.
        if decision.should_terminate {
            self.spawn_history(call_id.clone(), {
                let history = Arc::clone(&self.history);
                let call_id = call_id.clone();
                let reason = decision.termination_reason;
                let message = decision.termination_message.clone();
                async move {
                    history.add_termination(&call_id, reason, &message).await?;
                    history.end_call(&call_id).await
                }
            });
            self.state.clear(call_id);
            return Ok(TelephonyResponse::say_then_hangup(decision.termination_message));
        }

        // Step 7: transfer branch. Invariant 3: never dial before
        // human-confirmed is true, even when the classifier re-flags a
        // transfer offer on a later turn.
        if decision.transfer_requested {
            if snapshot.human_confirmed {
                return Ok(self.dial_transfer(call_id, &config.transfer_destination));
            }
            self.state.update_existing(call_id, |state| {
                state.awaiting_human_confirmation = true;
            })?;
            return Ok(TelephonyResponse::say_then_gather(
                "Am I speaking with a real person or is this the automated system?",
                SPEECH_TURN_ACTION,
                DEFAULT_GATHER_TIMEOUT_SECS,
            ));
        }

        // Step 8 setup: if we were waiting for a partial menu to complete
        // and this turn turned out not to be a menu at all, drop the
        // accumulated buffer rather than merging it into an unrelated
        // utterance's options on some later turn.
        if snapshot.awaiting_complete_menu && !decision.is_menu {
            self.state.update_existing(call_id, |state| state.clear_partial_menu())?;
        }

        // Step 8: menu branch.
        if decision.is_menu {
            if !decision.menu_complete {
                // Already enough options accumulated for the chooser to
                // commit to a digit: act on it now rather than waiting
                // through the incomplete-speech-wait budget for a menu that
                // may never finish enumerating every option. The menu stays
                // out of `previous_menus` either way (invariant 6 / testable
                // property 6 — only extraction-complete menus are recorded).
                if decision.dtmf_decision.should_press {
                    if let Some(digit) = decision.dtmf_decision.digit {
                        self.state.update_existing(call_id, |state| {
                            state.clear_partial_menu();
                            state.record_press(digit);
                        })?;
                        self.spawn_history(call_id.clone(), {
                            let history = Arc::clone(&self.history);
                            let call_id = call_id.clone();
                            let options = decision.menu_options.clone();
                            async move { history.add_menu(&call_id, &options, false).await }
                        });
                        self.spawn_history(call_id.clone(), {
                            let history = Arc::clone(&self.history);
                            let call_id = call_id.clone();
                            let matched_option = decision.dtmf_decision.matched_option.clone();
                            async move { history.add_digit(&call_id, digit, matched_option).await }
                        });
                        if let Err(err) = self.carrier.send_digits(call_id, &digit.to_string()).await {
                            tracing::warn!(call_id = %call_id, error = %err, "failed to send DTMF digit to carrier");
                        }
                        return Ok(plain_gather());
                    }
                }

                self.state.update_existing(call_id, |state| {
                    state.partial_menu_options = decision.menu_options.clone();
                    state.awaiting_complete_menu = true;
                })?;
                return Ok(plain_gather());
            }

            self.state.update_existing(call_id, |state| {
                state.clear_partial_menu();
                state.push_previous_menu(decision.menu_options.clone());
            })?;
            self.spawn_history(call_id.clone(), {
                let history = Arc::clone(&self.history);
                let call_id = call_id.clone();
                let options = decision.menu_options.clone();
                async move { history.add_menu(&call_id, &options, true).await }
            });

            if decision.dtmf_decision.should_press {
                if let Some(digit) = decision.dtmf_decision.digit {
                    self.state.update_existing(call_id, |state| state.record_press(digit))?;
                    self.spawn_history(call_id.clone(), {
                        let history = Arc::clone(&self.history);
                        let call_id = call_id.clone();
                        let matched_option = decision.dtmf_decision.matched_option.clone();
                        async move { history.add_digit(&call_id, digit, matched_option).await }
                    });
                    if let Err(err) = self.carrier.send_digits(call_id, &digit.to_string()).await {
                        tracing::warn!(call_id = %call_id, error = %err, "failed to send DTMF digit to carrier");
                    }
                }
            }
            return Ok(plain_gather());
        }

        // Step 9: human-confirmation branch, independent of menu processing.
        if snapshot.awaiting_human_confirmation {
            let verdict = ivr_classifiers::classify_human_confirmation(
                &self.llm_client,
                &config.llm_model,
                config.llm_temperature.min(0.3),
                config.llm_max_tokens,
                &merged_utterance,
            )
            .await;

            if verdict.value && verdict.confidence > HUMAN_CONFIRMATION_THRESHOLD {
                self.state.update_existing(call_id, |state| {
                    state.awaiting_human_confirmation = false;
                    state.human_confirmed = true;
                })?;
                return Ok(self.dial_transfer(call_id, &config.transfer_destination));
            }
            return Ok(plain_gather());
        }

        // Step 10: conversational branch — nothing more specific matched and
        // no digit is about to be pressed. Generate a short AI reply in the
        // transfer-agent persona; the model is asked to answer "silent" when
        // nothing needs saying, which is the common case (§4.6 step 10).
        let reply = crate::conversational::generate_reply(
            &self.llm_client,
            &config,
            &merged_utterance,
            &snapshot.conversation_history,
        )
        .await;

        match reply {
            Some(text) => {
                self.spawn_history(call_id.clone(), {
                    let history = Arc::clone(&self.history);
                    let call_id = call_id.clone();
                    let text = text.clone();
                    async move { history.add_conversation(&call_id, Speaker::Agent, &text).await }
                });
                Ok(TelephonyResponse::say_then_gather(text, SPEECH_TURN_ACTION, DEFAULT_GATHER_TIMEOUT_SECS))
            }
            None => Ok(plain_gather()),
        }
    }

    /// Record an inbound DTMF digit from the carrier (rather than a press we
    /// ourselves initiated) and keep listening.
    pub async fn handle_digit_turn(&self, call_id: &CallId, digit: char) -> Result<TelephonyResponse, OrchestratorError> {
        self.state.update_existing(call_id, |state| state.record_press(digit))?;
        self.spawn_history(call_id.clone(), {
            let history = Arc::clone(&self.history);
            let call_id = call_id.clone();
            async move { history.add_digit(&call_id, digit, None).await }
        });
        Ok(plain_gather())
    }

    /// A carrier call-status callback. Terminal statuses evict the call's
    /// state; non-terminal statuses are a no-op (invariant 4: safe to call
    /// on a call already cleared).
    pub fn handle_call_status(&self, call_id: &CallId, status: CallStatus) {
        if is_terminal(&status) {
            self.spawn_history(call_id.clone(), {
                let history = Arc::clone(&self.history);
                let call_id = call_id.clone();
                async move { history.end_call(&call_id).await }
            });
            self.state.clear(call_id);
        }
    }

    /// A carrier transfer-leg-status callback, correlated via
    /// `transfer_leg_call_id` so it still resolves after the primary call's
    /// entry has already been cleared.
    pub fn handle_transfer_status(&self, call_id: &CallId, leg_call_id: &CallId, status: CallStatus) {
        self.state.update(call_id, |state| {
            state.transfer_leg_call_id = Some(leg_call_id.clone());
        });

        if is_terminal(&status) {
            let success = matches!(status, CallStatus::Completed);
            self.spawn_history(call_id.clone(), {
                let history = Arc::clone(&self.history);
                let call_id = call_id.clone();
                async move { history.update_transfer_success(&call_id, success).await }
            });
        }
    }

    /// Warm-transfer handoff, reachable only once `human_confirmed` is true
    /// (invariant 3). Records the transfer in history and returns the
    /// say-then-dial response; the transfer leg's own outcome arrives later
    /// via [`Self::handle_transfer_status`] on a distinct callback URL.
    fn dial_transfer(&self, call_id: &CallId, destination: &str) -> TelephonyResponse {
        self.spawn_history(call_id.clone(), {
            let history = Arc::clone(&self.history);
            let call_id = call_id.clone();
            let destination = destination.to_string();
            async move { history.add_transfer(&call_id, &destination, None).await }
        });
        self.state.clear(call_id);
        TelephonyResponse::say_then_dial(
            "Hold on, please.",
            destination,
            TRANSFER_STATUS_ACTION,
            DIAL_TIMEOUT_SECS,
        )
    }

    fn spawn_history<F>(&self, call_id: CallId, future: F)
    where
        F: std::future::Future<Output = Result<(), ivr_history::HistoryError>> + Send + 'static,
    {
        tokio::spawn(async move {
            if let Err(err) = future.await {
                tracing::warn!(call_id = %call_id, error = %err, "history write failed");
            }
        });
    }
}

fn is_terminal(status: &CallStatus) -> bool {
    matches!(
        status,
        CallStatus::Completed | CallStatus::Busy | CallStatus::Failed | CallStatus::NoAnswer | CallStatus::Canceled
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use parking_lot::{Mutex, RwLock};

    use ivr_config::Settings;
    use ivr_history::InMemoryHistorySink;
    use ivr_llm::{LlmClient, LlmClientConfig};
    use ivr_telephony::TelephonyError;

    /// Never actually reaches the network: connection to a closed loopback
    /// port fails immediately, so every classifier call here exercises its
    /// heuristic fallback deterministically.
    fn unreachable_llm_client() -> Arc<LlmClient> {
        Arc::new(LlmClient::new(LlmClientConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            api_key: String::new(),
        }))
    }

    #[derive(Default)]
    struct FakeCarrier {
        sent_digits: Mutex<Vec<(CallId, String)>>,
    }

    #[async_trait]
    impl CarrierClient for FakeCarrier {
        async fn originate_call(&self, _to: &str, _from: &str, _webhook_url: &str) -> Result<CallId, TelephonyError> {
            Ok(CallId::new("CA-originated"))
        }

        async fn send_digits(&self, call_id: &CallId, digits: &str) -> Result<(), TelephonyError> {
            self.sent_digits.lock().push((call_id.clone(), digits.to_string()));
            Ok(())
        }

        async fn fetch_call_status(&self, _call_id: &CallId) -> Result<CallStatus, TelephonyError> {
            Ok(CallStatus::InProgress)
        }
    }

    struct Harness {
        orchestrator: SpeechOrchestrator,
        history: Arc<InMemoryHistorySink>,
        carrier: Arc<FakeCarrier>,
    }

    fn harness() -> Harness {
        let state = Arc::new(CallStateStore::new());
        let config_resolver = Arc::new(ConfigResolver::new(Arc::new(RwLock::new(Settings::default()))));
        let llm_client = unreachable_llm_client();
        let history = Arc::new(InMemoryHistorySink::new());
        let carrier = Arc::new(FakeCarrier::default());

        let orchestrator = SpeechOrchestrator::new(
            state,
            config_resolver,
            llm_client,
            history.clone(),
            carrier.clone(),
        );

        Harness {
            orchestrator,
            history,
            carrier,
        }
    }

    fn turn(call_id: &CallId, utterance: &str) -> TurnInput {
        TurnInput {
            call_id: call_id.clone(),
            utterance: utterance.to_string(),
            turn_override: TurnOverride::default(),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn call_start_registers_state_and_logs_history() {
        let h = harness();
        let call_id = CallId::new("CA1");
        h.orchestrator.handle_call_start(
            &call_id,
            Some("+15550100".to_string()),
            Some("+15550111".to_string()),
            &TurnOverride::default(),
        );
        settle().await;

        let record = h.history.record_for(&call_id).expect("start_call recorded");
        assert_eq!(record.to_number, Some("+15550100".to_string()));
    }

    #[tokio::test]
    async fn termination_branch_hangs_up_and_clears_state() {
        let h = harness();
        let call_id = CallId::new("CA1");
        h.orchestrator.handle_call_start(&call_id, None, None, &TurnOverride::default());
        settle().await;

        let response = h
            .orchestrator
            .handle_turn(turn(&call_id, "Please leave a message after the tone."))
            .await
            .unwrap();

        assert_eq!(
            response,
            TelephonyResponse::say_then_hangup("Detected voicemail greeting")
        );
        settle().await;
        let record = h.history.record_for(&call_id).expect("record survives state eviction");
        assert!(record.ended_at.is_some());
    }

    #[tokio::test]
    async fn transfer_branch_asks_for_human_confirmation_before_dialing() {
        let h = harness();
        let call_id = CallId::new("CA1");
        h.orchestrator.handle_call_start(&call_id, None, None, &TurnOverride::default());
        settle().await;

        let over = TurnOverride {
            transfer_destination: Some("+15559999".to_string()),
            ..Default::default()
        };
        let input = TurnInput {
            call_id: call_id.clone(),
            utterance: "I'm transferring you now to a representative.".to_string(),
            turn_override: over,
        };
        let response = h.orchestrator.handle_turn(input).await.unwrap();

        assert_eq!(
            response,
            TelephonyResponse::say_then_gather(
                "Am I speaking with a real person or is this the automated system?",
                "/voice/speech-turn",
                15
            )
        );
        // Invariant 3: no dial has happened yet.
        assert!(h.carrier.sent_digits.lock().is_empty());
    }

    #[tokio::test]
    async fn already_confirmed_human_transfer_dials_destination() {
        // Simulates a call where step 9 already set `human_confirmed` on an
        // earlier turn (which requires a working LLM to clear the >0.7
        // confidence gate — exercised here by setting the flag directly,
        // since the classifier's LLM-failure fallback always returns
        // not-confirmed and could never set it).
        let h = harness();
        let call_id = CallId::new("CA1");
        h.orchestrator.handle_call_start(&call_id, None, None, &TurnOverride::default());
        h.orchestrator.state.update(&call_id, |state| state.human_confirmed = true);
        settle().await;

        let over = TurnOverride {
            transfer_destination: Some("+15559999".to_string()),
            ..Default::default()
        };
        let response = h
            .orchestrator
            .handle_turn(TurnInput {
                call_id: call_id.clone(),
                utterance: "I'm transferring you now to a representative.".to_string(),
                turn_override: over,
            })
            .await
            .unwrap();

        assert_eq!(
            response,
            TelephonyResponse::say_then_dial("Hold on, please.", "+15559999", "/voice/transfer-status", 30)
        );
        settle().await;
        // Invariant 4: the state entry may be cleared after a successful dial.
        assert!(h.orchestrator.state.get(&call_id).is_none());
    }

    #[tokio::test]
    async fn low_confidence_heuristic_answer_does_not_confirm_human() {
        // The LLM-failure fallback always defaults to not-confirmed (§7), so
        // a transcript that merely *looks* human-shaped must not clear the
        // spec's >0.7 confirmation gate while the LLM is unreachable.
        let h = harness();
        let call_id = CallId::new("CA1");
        h.orchestrator.handle_call_start(&call_id, None, None, &TurnOverride::default());
        settle().await;

        h.orchestrator
            .handle_turn(turn(&call_id, "Please hold while we connect you to an agent."))
            .await
            .unwrap();

        let response = h
            .orchestrator
            .handle_turn(turn(&call_id, "Hi, this is Sarah, how can I help you?"))
            .await
            .unwrap();

        assert_eq!(response, plain_gather());
        let snapshot = h.orchestrator.state.get(&call_id).unwrap();
        assert!(!snapshot.human_confirmed);
    }

    #[tokio::test]
    async fn menu_branch_presses_representative_adjacent_option() {
        let h = harness();
        let call_id = CallId::new("CA1");
        h.orchestrator.handle_call_start(&call_id, None, None, &TurnOverride::default());
        settle().await;

        let response = h
            .orchestrator
            .handle_turn(turn(&call_id, "Press 1 for sales, press 2 for support."))
            .await
            .unwrap();

        assert_eq!(response, plain_gather());
        settle().await;
        let sent = h.carrier.sent_digits.lock();
        assert_eq!(sent.as_slice(), &[(call_id.clone(), "2".to_string())]);
    }

    #[tokio::test]
    async fn conversational_branch_falls_back_to_plain_gather_on_unreachable_llm() {
        // No menu, no transfer, no termination, no pending confirmation —
        // falls through to step 10's reply generation, which degrades to
        // silence (and therefore a plain gather) when the LLM is unreachable.
        let h = harness();
        let call_id = CallId::new("CA1");
        h.orchestrator.handle_call_start(&call_id, None, None, &TurnOverride::default());
        settle().await;

        let response = h
            .orchestrator
            .handle_turn(turn(&call_id, "Hi, thanks for calling, how can I help you today?"))
            .await
            .unwrap();

        assert_eq!(response, plain_gather());
    }

    #[tokio::test]
    async fn incomplete_speech_is_buffered_rather_than_processed() {
        let h = harness();
        let call_id = CallId::new("CA1");
        h.orchestrator.handle_call_start(&call_id, None, None, &TurnOverride::default());
        settle().await;

        let response = h.orchestrator.handle_turn(turn(&call_id, "Press 1 for sales or")).await.unwrap();
        assert_eq!(response, plain_gather());

        // No classifier call happened yet, so nothing was sent to the carrier.
        assert!(h.carrier.sent_digits.lock().is_empty());
    }

    #[tokio::test]
    async fn empty_utterance_does_not_enter_incomplete_speech_buffering() {
        let h = harness();
        let call_id = CallId::new("CA1");
        h.orchestrator.handle_call_start(&call_id, None, None, &TurnOverride::default());
        settle().await;

        h.orchestrator.handle_turn(turn(&call_id, "")).await.unwrap();

        // Invariant 2: awaiting-complete-speech implies a non-empty last-speech.
        // An empty utterance must fall through to the normal turn path rather
        // than set `last_speech = Some("")` with the flag raised.
        let snapshot = h.orchestrator.state.get(&call_id).unwrap();
        assert!(!snapshot.awaiting_complete_speech);
    }

    #[tokio::test]
    async fn digit_turn_records_press_without_running_classifiers() {
        let h = harness();
        let call_id = CallId::new("CA1");
        h.orchestrator.handle_call_start(&call_id, None, None, &TurnOverride::default());
        settle().await;

        let response = h.orchestrator.handle_digit_turn(&call_id, '5').await.unwrap();
        assert_eq!(response, plain_gather());
        settle().await;

        let record = h.history.record_for(&call_id).unwrap();
        assert_eq!(record.events.len(), 1);
    }

    #[tokio::test]
    async fn call_status_callback_evicts_state_only_on_terminal_status() {
        let h = harness();
        let call_id = CallId::new("CA1");
        h.orchestrator.handle_call_start(&call_id, None, None, &TurnOverride::default());
        settle().await;

        h.orchestrator.handle_call_status(&call_id, CallStatus::Ringing);
        assert!(h.orchestrator.state.get(&call_id).is_some());

        h.orchestrator.handle_call_status(&call_id, CallStatus::Completed);
        assert!(h.orchestrator.state.get(&call_id).is_none());
    }

    #[tokio::test]
    async fn handle_turn_on_unknown_call_errors() {
        let h = harness();
        let response = h.orchestrator.handle_turn(turn(&CallId::new("never-started"), "hello")).await;
        assert!(matches!(response, Err(OrchestratorError::UnknownCall(_))));
    }
}
