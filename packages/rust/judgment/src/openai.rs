//! OpenAI-compatible chat completions client (OpenRouter by default).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use bitfunnel_shared::{FunnelError, JudgmentConfig, Result, read_api_key};

use crate::client::{JudgmentClient, JudgmentReply, JudgmentRequest};

/// User-Agent string for judgment requests.
const USER_AGENT: &str = concat!("bitfunnel/", env!("CARGO_PKG_VERSION"));

/// Judgment client speaking the `/chat/completions` protocol.
pub struct ChatCompletionsClient {
    base_url: String,
    api_key: String,
    default_model: String,
    client: Client,
}

impl ChatCompletionsClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FunnelError::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            client,
        })
    }

    /// Build from the `[judgment]` config section, reading the key from its env var.
    pub fn from_config(config: &JudgmentConfig) -> Result<Self> {
        let api_key = read_api_key(&config.api_key_env, "Judgment service")?;
        Self::new(
            &config.base_url,
            api_key,
            &config.default_model,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl JudgmentClient for ChatCompletionsClient {
    async fn submit(&self, request: &JudgmentRequest) -> Result<JudgmentReply> {
        let url = format!("{}/chat/completions", self.base_url);
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let system = format!("{}\n\n{}", request.system, request.shape.instruction());
        let body = json!({
            "model": model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": request.prompt },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| FunnelError::transport(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let preview: String = error_text.chars().take(200).collect();
            return Err(FunnelError::transport(format!(
                "{url}: HTTP {status}: {preview}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FunnelError::parse(format!("invalid completion payload: {e}")))?;

        let text = payload
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FunnelError::parse("completion response missing content"))?
            .to_string();

        let reply = JudgmentReply {
            text,
            model: payload
                .get("model")
                .and_then(|v| v.as_str())
                .unwrap_or(model.as_str())
                .to_string(),
            tokens_in: payload
                .pointer("/usage/prompt_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            tokens_out: payload
                .pointer("/usage/completion_tokens")
                .and_then(|v| v.as_u64())
                .unwrap_or(0),
            latency_ms: start.elapsed().as_millis() as u64,
            cached: false,
        };

        debug!(
            model = %reply.model,
            tokens_in = reply.tokens_in,
            tokens_out = reply.tokens_out,
            latency_ms = reply.latency_ms,
            "judgment reply received"
        );

        Ok(reply)
    }

    fn provider_name(&self) -> &'static str {
        "chat-completions"
    }
}
