//! The carrier collaborator: origination, mid-call DTMF injection, and call
//! status lookup against a generic REST telephony API (form-encoded body,
//! HTTP Basic auth), matching the shape of Twilio's outbound-call API
//! without binding to a specific vendor SDK crate (§4.10).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use ivr_core::CallId;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum TelephonyError {
    #[error("network error talking to the carrier: {0}")]
    Network(String),
    #[error("carrier API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("telephony client misconfigured: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for TelephonyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Current status of a call leg, as reported by the carrier's status
/// callback/poll API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Queued,
    Ringing,
    InProgress,
    Completed,
    Busy,
    Failed,
    NoAnswer,
    Canceled,
}

/// Everything the orchestrator needs from the telephony carrier: placing a
/// new outbound leg, injecting touch-tones into an in-progress call, and
/// polling a leg's current status.
#[async_trait]
pub trait CarrierClient: Send + Sync {
    async fn originate_call(&self, to: &str, from: &str, webhook_url: &str) -> Result<CallId, TelephonyError>;
    async fn send_digits(&self, call_id: &CallId, digits: &str) -> Result<(), TelephonyError>;
    async fn fetch_call_status(&self, call_id: &CallId) -> Result<CallStatus, TelephonyError>;
}

#[derive(Debug, Clone)]
pub struct CarrierClientConfig {
    pub base_url: String,
    pub account_id: String,
    pub auth_token: String,
}

/// `reqwest`-backed implementation of [`CarrierClient`] against a generic
/// REST telephony API. Stateless beyond its HTTP client and credentials —
/// safe to share behind an `Arc`.
pub struct HttpCarrierClient {
    http: reqwest::Client,
    base_url: String,
    account_id: String,
    auth_token: String,
}

impl HttpCarrierClient {
    pub fn new(config: CarrierClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with static configuration");

        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            account_id: config.account_id,
            auth_token: config.auth_token,
        }
    }

    fn calls_url(&self) -> String {
        format!("{}/Accounts/{}/Calls.json", self.base_url, self.account_id)
    }

    fn call_url(&self, call_id: &CallId) -> String {
        format!(
            "{}/Accounts/{}/Calls/{}.json",
            self.base_url,
            self.account_id,
            call_id.as_str()
        )
    }
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
}

#[derive(Debug, Deserialize)]
struct CallStatusResource {
    status: CallStatus,
}

#[async_trait]
impl CarrierClient for HttpCarrierClient {
    async fn originate_call(&self, to: &str, from: &str, webhook_url: &str) -> Result<CallId, TelephonyError> {
        if to.is_empty() || from.is_empty() {
            return Err(TelephonyError::Configuration(
                "originate_call requires both `to` and `from` numbers".to_string(),
            ));
        }

        let response = self
            .http
            .post(self.calls_url())
            .basic_auth(&self.account_id, Some(&self.auth_token))
            .form(&[("To", to), ("From", from), ("Url", webhook_url)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let resource: CallResource = response.json().await?;
        Ok(CallId::new(resource.sid))
    }

    async fn send_digits(&self, call_id: &CallId, digits: &str) -> Result<(), TelephonyError> {
        let response = self
            .http
            .post(self.call_url(call_id))
            .basic_auth(&self.account_id, Some(&self.auth_token))
            .form(&[("Digits", digits)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(())
    }

    async fn fetch_call_status(&self, call_id: &CallId) -> Result<CallStatus, TelephonyError> {
        let response = self
            .http
            .get(self.call_url(call_id))
            .basic_auth(&self.account_id, Some(&self.auth_token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let resource: CallStatusResource = response.json().await?;
        Ok(resource.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_url_joins_base_and_account() {
        let client = HttpCarrierClient::new(CarrierClientConfig {
            base_url: "https://carrier.example.com/2010-04-01/".to_string(),
            account_id: "AC123".to_string(),
            auth_token: "secret".to_string(),
        });
        assert_eq!(
            client.calls_url(),
            "https://carrier.example.com/2010-04-01/Accounts/AC123/Calls.json"
        );
    }

    #[tokio::test]
    async fn originate_call_rejects_missing_numbers() {
        let client = HttpCarrierClient::new(CarrierClientConfig {
            base_url: "https://carrier.example.com".to_string(),
            account_id: "AC123".to_string(),
            auth_token: "secret".to_string(),
        });
        let result = client.originate_call("", "+15550100", "https://example.com/voice/call-start").await;
        assert!(matches!(result, Err(TelephonyError::Configuration(_))));
    }
}
