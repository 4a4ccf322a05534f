//! Process entry point: load settings, initialize tracing and metrics, wire
//! collaborators into `AppState`, serve the webhook surface with graceful
//! shutdown (§4.7, §9) — mirroring the teacher's `server/src/main.rs` boot
//! sequence.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use ivr_config::{load_settings, Settings};
use ivr_history::InMemoryHistorySink;
use ivr_server::{create_router, init_metrics, AppState};
use ivr_telephony::{CarrierClient, CarrierClientConfig, HttpCarrierClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("IVR_AGENT_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => {
            // Tracing isn't initialized yet; eprintln is the only option here.
            eprintln!("loaded configuration (env: {})", env.as_deref().unwrap_or("default"));
            settings
        }
        Err(err) => {
            eprintln!("warning: failed to load config: {err}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&settings);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting ivr-server");
    tracing::info!(environment = ?settings.environment, "configuration loaded");

    let metrics_handle = init_metrics();
    tracing::info!("initialized Prometheus metrics at /metrics");

    let history: Arc<dyn ivr_history::HistorySink> = Arc::new(InMemoryHistorySink::new());

    let carrier_config = CarrierClientConfig {
        base_url: std::env::var("CARRIER_BASE_URL").unwrap_or_else(|_| "https://carrier.example.com".to_string()),
        account_id: std::env::var("CARRIER_ACCOUNT_ID").unwrap_or_default(),
        auth_token: std::env::var("CARRIER_AUTH_TOKEN").unwrap_or_default(),
    };
    let carrier: Arc<dyn CarrierClient> = Arc::new(HttpCarrierClient::new(carrier_config));

    let port = settings.server.port;
    let state = AppState::new(settings, history, carrier, metrics_handle, env);

    state.state_store.spawn_sweep();
    tracing::info!("call state TTL sweep task started");

    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("ivr_agent={},tower_http=debug", settings.observability.log_level).into()
    });

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
}
