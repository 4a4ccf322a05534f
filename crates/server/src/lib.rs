//! IVR navigation agent webhook surface.
//!
//! Exposes the carrier-facing `/voice/*` endpoints plus the ambient
//! operational surface (health, readiness, metrics, config reload) every
//! service in this position carries.

pub mod http;
pub mod metrics;
pub mod state;

pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;

use thiserror::Error;

/// Errors surfaced by the HTTP layer itself, distinct from
/// `ivr_orchestrator::OrchestratorError` (which a handler always converts to
/// a safe `TelephonyResponse` rather than propagating).
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("config error: {0}")]
    Config(#[from] ivr_config::ConfigError),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Config(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
