//! Application state: the composition root tying every collaborator crate
//! together behind one `Clone`-able handle, the way the teacher's `AppState`
//! wires its own collaborators (§4.6, §4.9).

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;

use ivr_config::{load_settings, ConfigResolver, Settings};
use ivr_history::HistorySink;
use ivr_llm::{LlmClient, LlmClientConfig};
use ivr_orchestrator::SpeechOrchestrator;
use ivr_state::CallStateStore;
use ivr_telephony::{CarrierClient, CarrierClientConfig, HttpCarrierClient};

use crate::ServerError;

/// Shared across every handler; cheap to clone, every field is an `Arc` (or
/// the orchestrator, which is itself `Arc`-backed internally).
#[derive(Clone)]
pub struct AppState {
    /// Hot-reloadable via `/admin/reload-config`, wrapped in `parking_lot::RwLock`
    /// exactly as the teacher wraps its own settings (§4.9).
    pub settings: Arc<RwLock<Settings>>,
    pub state_store: Arc<CallStateStore>,
    pub history: Arc<dyn HistorySink>,
    pub llm_client: Arc<LlmClient>,
    pub orchestrator: SpeechOrchestrator,
    pub metrics_handle: PrometheusHandle,
    env: Option<String>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        history: Arc<dyn HistorySink>,
        carrier: Arc<dyn CarrierClient>,
        metrics_handle: PrometheusHandle,
        env: Option<String>,
    ) -> Self {
        let llm_client = Arc::new(LlmClient::new(LlmClientConfig {
            endpoint: settings.llm.endpoint.clone(),
            api_key: settings.llm.api_key.clone(),
        }));
        let settings = Arc::new(RwLock::new(settings));
        let config_resolver = Arc::new(ConfigResolver::new(settings.clone()));
        let state_store = Arc::new(CallStateStore::new());

        let orchestrator = SpeechOrchestrator::new(
            state_store.clone(),
            config_resolver,
            llm_client.clone(),
            history.clone(),
            carrier,
        );

        Self {
            settings,
            state_store,
            history,
            llm_client,
            orchestrator,
            metrics_handle,
            env,
        }
    }

    /// Build the default carrier client from the process settings' LLM/carrier
    /// configuration. Call sites that need a fake carrier (tests) construct
    /// `AppState::new` directly with their own `Arc<dyn CarrierClient>`.
    pub fn with_default_carrier(
        settings: Settings,
        carrier_config: CarrierClientConfig,
        history: Arc<dyn HistorySink>,
        metrics_handle: PrometheusHandle,
        env: Option<String>,
    ) -> Self {
        let carrier: Arc<dyn CarrierClient> = Arc::new(HttpCarrierClient::new(carrier_config));
        Self::new(settings, history, carrier, metrics_handle, env)
    }

    /// Re-read layered settings from disk/environment without a restart
    /// (`POST /admin/reload-config`). Only the persisted-settings layer is
    /// replaced; in-flight call state and the LLM/history/carrier clients
    /// already constructed from the old settings are left untouched — a
    /// reload changes config resolution for subsequent turns, not live
    /// collaborators.
    pub fn reload_config(&self) -> Result<(), ServerError> {
        let new_settings = load_settings(self.env.as_deref())?;
        *self.settings.write() = new_settings;
        tracing::info!("configuration reloaded");
        Ok(())
    }

    pub fn get_settings(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.settings.read()
    }
}
