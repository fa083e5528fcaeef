//! OpenAI-compatible chat completions transport

use super::TransportSetupError;
use crate::config::FileTransportConfig;
use async_trait::async_trait;
use planner_application::{PlanningTransport, RequestParams, TransportError};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Instructions sent as the system message of every planning call.
pub const PLANNING_SYSTEM_PROMPT: &str = r#"You turn a goal for an autonomous agent into a short ordered plan.
Reply with JSON only, in a ```json fence:
{"reasoning": "<one sentence>", "tasks": [{"kind": "<verb>", "parameters": {...}}]}
Use concrete task kinds such as move, mine, gather, craft, build, place, attack, follow, wait."#;

/// Plans via `POST {endpoint}/chat/completions`.
pub struct HttpChatTransport {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpChatTransport {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, TransportSetupError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportSetupError::Client(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Build from the `[transport]` section, reading the key from the
    /// configured environment variable.
    pub fn from_config(config: &FileTransportConfig) -> Result<Self, TransportSetupError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| TransportSetupError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(
            config.endpoint.clone(),
            api_key,
            Duration::from_secs(config.connect_timeout_secs),
        )
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }
}

impl std::fmt::Debug for HttpChatTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChatTransport")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

fn request_body(text: &str, params: &RequestParams) -> serde_json::Value {
    json!({
        "model": params.model,
        "temperature": params.temperature,
        "max_tokens": params.max_tokens,
        "messages": [
            { "role": "system", "content": PLANNING_SYSTEM_PROMPT },
            { "role": "user", "content": text },
        ],
    })
}

fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

fn extract_content(body: &str) -> Result<String, TransportError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| TransportError::InvalidResponse(format!("Failed to parse response: {e}")))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| TransportError::InvalidResponse("response has no message content".into()))
}

#[async_trait]
impl PlanningTransport for HttpChatTransport {
    fn target(&self) -> &str {
        &self.endpoint
    }

    async fn call(
        &self,
        text: &str,
        params: &RequestParams,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        debug!("POST {} (model: {}, timeout: {:?})", self.url(), params.model, timeout);

        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(&request_body(text, params))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        let retry_after = parse_retry_after(
            response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
        );
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connection(e.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(TransportError::from_status(
                status.as_u16(),
                error_message(&body),
                retry_after,
            ));
        }

        extract_content(&body)
    }
}
