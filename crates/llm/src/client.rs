//! Schema-enforced OpenAI-compatible chat completion client (§4.1).

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::LlmError;

/// Classifiers are never allowed to push the model toward creative,
/// high-variance completions — the DTMF Chooser and downstream state
/// transitions depend on stable classification.
const CLASSIFIER_MAX_TEMPERATURE: f32 = 0.3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub endpoint: String,
    pub api_key: String,
}

/// A single schema-constrained chat completion client. Stateless beyond its
/// HTTP client and connection settings — safe to share behind an `Arc`.
pub struct LlmClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl LlmClient {
    pub fn new(config: LlmClientConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client builds with static configuration");

        Self {
            http,
            endpoint: config.endpoint,
            api_key: config.api_key,
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }

    /// Run a single schema-constrained completion and deserialize the
    /// result into `T`. `schema` must be a valid JSON Schema object; the
    /// model is asked for strict structured output matching it, and the
    /// response is independently validated before deserialization so a
    /// backend that ignores `response_format` can't smuggle malformed data
    /// past the classifier suite. Classifier calls are capped at
    /// [`CLASSIFIER_MAX_TEMPERATURE`]; see [`Self::generate_reply`] for the
    /// one non-classifier caller allowed to exceed it.
    pub async fn analyze<T: DeserializeOwned>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &Value,
        model: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<T, LlmError> {
        if temperature > CLASSIFIER_MAX_TEMPERATURE {
            return Err(LlmError::Configuration(format!(
                "classifier temperature {temperature} exceeds cap of {CLASSIFIER_MAX_TEMPERATURE}"
            )));
        }
        self.analyze_uncapped(system_prompt, user_prompt, schema, model, temperature, max_tokens)
            .await
    }

    /// Generate the Speech Orchestrator's short conversational reply
    /// (§4.6 step 10). Not a classifier call, so it is exempt from
    /// [`CLASSIFIER_MAX_TEMPERATURE`] and may use the call's full configured
    /// temperature. Still schema-constrained, to the single field `reply`,
    /// so the same validation path applies to every LLM round trip.
    pub async fn generate_reply(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<String, LlmError> {
        let schema = serde_json::json!({
            "type": "object",
            "properties": { "reply": { "type": "string" } },
            "required": ["reply"],
            "additionalProperties": false,
        });
        let parsed: ReplyEnvelope = self
            .analyze_uncapped(system_prompt, user_prompt, &schema, model, temperature, max_tokens)
            .await?;
        Ok(parsed.reply)
    }

    async fn analyze_uncapped<T: DeserializeOwned>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &Value,
        model: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<T, LlmError> {
        let validator = jsonschema::JSONSchema::compile(schema)
            .map_err(|e| LlmError::Configuration(format!("invalid output schema: {e}")))?;

        let request = OpenAIChatRequest {
            model: model.to_string(),
            messages: vec![
                OpenAIMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                OpenAIMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            temperature,
            max_tokens,
            response_format: ResponseFormat {
                kind: "json_schema".to_string(),
                json_schema: JsonSchemaSpec {
                    name: "classification".to_string(),
                    strict: true,
                    schema: schema.clone(),
                },
            },
        };

        let mut builder = self.http.post(self.chat_url()).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: OpenAIChatResponse = response.json().await?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::InvalidJson("response had no choices".to_string()))?;

        let value: Value = serde_json::from_str(&content)
            .map_err(|e| LlmError::InvalidJson(e.to_string()))?;

        let errors: Vec<String> = validator
            .validate(&value)
            .map(|_| Vec::new())
            .unwrap_or_else(|errs| errs.map(|e| e.to_string()).collect());
        if !errors.is_empty() {
            return Err(LlmError::SchemaMismatch(errors.join("; ")));
        }

        serde_json::from_value(value).map_err(|e| LlmError::InvalidJson(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ReplyEnvelope {
    reply: String,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct JsonSchemaSpec {
    name: String,
    strict: bool,
    schema: Value,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
    json_schema: JsonSchemaSpec,
}

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    max_tokens: usize,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_url_joins_endpoint_without_double_slash() {
        let client = LlmClient::new(LlmClientConfig {
            endpoint: "https://api.openai.com/v1/".to_string(),
            api_key: String::new(),
        });
        assert_eq!(client.chat_url(), "https://api.openai.com/v1/chat/completions");
    }

    #[tokio::test]
    async fn temperature_above_classifier_cap_is_rejected_before_any_request() {
        let client = LlmClient::new(LlmClientConfig {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
        });
        let schema = serde_json::json!({"type": "object"});
        let result: Result<Value, _> = client
            .analyze("system", "user", &schema, "gpt-4o-mini", 0.9, 64)
            .await;
        assert!(matches!(result, Err(LlmError::Configuration(_))));
    }

    #[tokio::test]
    async fn generate_reply_is_exempt_from_the_classifier_temperature_cap() {
        // Points at a closed loopback port so the call fails on connect
        // rather than actually round-tripping; a `Configuration` error here
        // would mean the temperature cap rejected the call before it ever
        // tried the network, which is the one failure mode this test rules out.
        let client = LlmClient::new(LlmClientConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            api_key: String::new(),
        });
        let result = client.generate_reply("system", "user", "gpt-4o-mini", 0.9, 64).await;
        assert!(!matches!(result, Err(LlmError::Configuration(_))));
    }
}
