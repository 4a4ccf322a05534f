//! Prometheus exposition for turn latency and classifier-fallback counts
//! (§4.7, §9). A thin wrapper around `metrics-exporter-prometheus` — the
//! orchestrator records `turn_duration_seconds` and each classifier records
//! `classifier_llm_fallback_total` (labeled `classifier`) through the global
//! `metrics` facade; this module only owns the recorder and renders its
//! scrape output.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder. Must be called exactly once,
/// before any `metrics::counter!`/`histogram!` call site runs.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("prometheus recorder installs exactly once at startup")
}

pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<crate::state::AppState>,
) -> String {
    state.metrics_handle.render()
}
