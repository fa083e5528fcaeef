//! `[transport]` and `[logging]` sections.

use planner_application::RequestParams;
use serde::{Deserialize, Serialize};

/// Which remote the planner talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// OpenAI-compatible chat completions endpoint
    #[default]
    Http,
    /// In-process planner, no network
    Loopback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTransportConfig {
    pub kind: TransportKind,
    /// Base URL; `/chat/completions` is appended
    pub endpoint: String,
    /// Environment variable holding the bearer token
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub connect_timeout_secs: u64,
    /// Simulated latency of the loopback transport
    pub loopback_latency_ms: u64,
}

impl Default for FileTransportConfig {
    fn default() -> Self {
        let params = RequestParams::default();
        Self {
            kind: TransportKind::Http,
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: params.model,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            connect_timeout_secs: 10,
            loopback_latency_ms: 400,
        }
    }
}

impl FileTransportConfig {
    pub fn request_params(&self) -> RequestParams {
        RequestParams::default()
            .with_model(self.model.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// JSONL file receiving state transitions and plan completions
    pub event_log: Option<String>,
    /// Diagnostic log file (in addition to stderr)
    pub log_file: Option<String>,
}
