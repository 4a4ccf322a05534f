//! The Config Resolver: merges per-turn overrides, per-call state, persisted
//! settings, and process environment, highest wins (§4.9).

use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::Arc;

use ivr_core::CallConfig;

use crate::settings::Settings;

/// Per-turn override, typically decoded from query parameters on the
/// call-start webhook. Any field left `None` falls through to the next layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TurnOverride {
    pub transfer_destination: Option<String>,
    pub call_purpose: Option<String>,
    pub custom_instructions: Option<String>,
    pub user_contact: Option<String>,
    pub tts_voice: Option<String>,
    pub tts_language: Option<String>,
    pub llm_model: Option<String>,
    pub llm_temperature: Option<f32>,
    pub llm_max_tokens: Option<usize>,
}

/// Resolves a `CallConfig` from the four layers named in §4.9:
/// per-turn override -> per-call state (already-resolved config from call
/// start) -> persisted `Settings` -> process environment defaults baked
/// into `Settings`'s own `Default` impl.
pub struct ConfigResolver {
    settings: Arc<RwLock<Settings>>,
}

impl ConfigResolver {
    pub fn new(settings: Arc<RwLock<Settings>>) -> Self {
        Self { settings }
    }

    /// Resolve config at call-start, before any per-call state exists.
    pub fn resolve_initial(&self, turn_override: &TurnOverride) -> CallConfig {
        let defaults = self.settings.read().call_defaults.clone();
        merge(turn_override, None, &defaults)
    }

    /// Resolve config for a subsequent turn, given the config captured in the
    /// call's state at call-start.
    pub fn resolve_for_turn(
        &self,
        turn_override: &TurnOverride,
        call_state_config: &CallConfig,
    ) -> CallConfig {
        let defaults = self.settings.read().call_defaults.clone();
        merge(turn_override, Some(call_state_config), &defaults)
    }
}

fn merge(
    turn_override: &TurnOverride,
    call_state_config: Option<&CallConfig>,
    defaults: &crate::settings::CallDefaults,
) -> CallConfig {
    let base = call_state_config.cloned().unwrap_or_else(|| CallConfig {
        transfer_destination: defaults.transfer_destination.clone(),
        call_purpose: defaults.call_purpose.clone(),
        custom_instructions: defaults.custom_instructions.clone(),
        user_contact: defaults.user_contact.clone(),
        tts_voice: defaults.tts_voice.clone(),
        tts_language: defaults.tts_language.clone(),
        llm_model: defaults.llm_model.clone(),
        llm_temperature: defaults.llm_temperature,
        llm_max_tokens: defaults.llm_max_tokens,
    });

    CallConfig {
        transfer_destination: turn_override
            .transfer_destination
            .clone()
            .unwrap_or(base.transfer_destination),
        call_purpose: turn_override.call_purpose.clone().unwrap_or(base.call_purpose),
        custom_instructions: turn_override
            .custom_instructions
            .clone()
            .unwrap_or(base.custom_instructions),
        user_contact: turn_override.user_contact.clone().or(base.user_contact),
        tts_voice: turn_override.tts_voice.clone().unwrap_or(base.tts_voice),
        tts_language: turn_override.tts_language.clone().unwrap_or(base.tts_language),
        llm_model: turn_override.llm_model.clone().unwrap_or(base.llm_model),
        llm_temperature: turn_override.llm_temperature.unwrap_or(base.llm_temperature),
        llm_max_tokens: turn_override.llm_max_tokens.unwrap_or(base.llm_max_tokens),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_override_wins_over_persisted_defaults() {
        let settings = Arc::new(RwLock::new(Settings::default()));
        let resolver = ConfigResolver::new(settings);
        let over = TurnOverride {
            call_purpose: Some("schedule an appointment".to_string()),
            ..Default::default()
        };
        let resolved = resolver.resolve_initial(&over);
        assert_eq!(resolved.call_purpose, "schedule an appointment");
    }

    #[test]
    fn call_state_config_wins_over_persisted_defaults_when_no_override() {
        let settings = Arc::new(RwLock::new(Settings::default()));
        let resolver = ConfigResolver::new(settings);
        let mut captured = CallConfig::default();
        captured.call_purpose = "captured at call start".to_string();
        let resolved = resolver.resolve_for_turn(&TurnOverride::default(), &captured);
        assert_eq!(resolved.call_purpose, "captured at call start");
    }

    #[test]
    fn falls_back_to_persisted_defaults_when_nothing_else_set() {
        let settings = Arc::new(RwLock::new(Settings::default()));
        let resolver = ConfigResolver::new(settings);
        let resolved = resolver.resolve_initial(&TurnOverride::default());
        assert_eq!(resolved.call_purpose, "speak with a representative");
    }
}
