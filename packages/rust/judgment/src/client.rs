//! The judgment capability: text prompt in, free-text verdict out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use bitfunnel_shared::{FunnelError, Result, StageSettings};

use crate::parser::extract_structured;

/// The structured value a caller expects back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    Object,
    Array,
}

impl ResponseShape {
    /// Instruction appended to the system message.
    pub fn instruction(&self) -> &'static str {
        match self {
            Self::Object => "Respond with a single JSON object and nothing else.",
            Self::Array => "Respond with a single JSON array and nothing else.",
        }
    }

    /// Whether `value` has this shape.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

/// One call to the judgment service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgmentRequest {
    /// Role instruction for the judgment.
    pub system: String,
    pub prompt: String,
    pub shape: ResponseShape,
    /// Overrides the client's default model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Whether a cache may answer this request from an earlier reply.
    #[serde(skip)]
    pub cacheable: bool,
}

impl JudgmentRequest {
    /// Build a request using a stage's sampling settings.
    pub fn new(
        system: impl Into<String>,
        prompt: impl Into<String>,
        shape: ResponseShape,
        settings: &StageSettings,
    ) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            shape,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            cacheable: true,
        }
    }

    /// Require a fresh reply even when an identical request was answered before.
    pub fn uncached(mut self) -> Self {
        self.cacheable = false;
        self
    }
}

/// Raw reply from the judgment service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgmentReply {
    pub text: String,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub latency_ms: u64,
    /// Served from the in-memory cache.
    #[serde(default)]
    pub cached: bool,
}

/// Text-in, structured-out oracle used by every stage.
#[async_trait]
pub trait JudgmentClient: Send + Sync {
    /// Submit a prompt. Fails with [`FunnelError::Transport`] when the call
    /// does not complete.
    async fn submit(&self, request: &JudgmentRequest) -> Result<JudgmentReply>;

    fn provider_name(&self) -> &'static str;
}

/// Submit a request and extract the structured value from the reply.
///
/// Fails with [`FunnelError::Parse`] when the reply holds no parseable value
/// or the value does not have the requested shape.
pub async fn submit_structured(
    client: &dyn JudgmentClient,
    request: &JudgmentRequest,
) -> Result<Value> {
    let reply = client.submit(request).await?;
    let preview = || reply.text.chars().take(200).collect::<String>();
    let value = extract_structured(&reply.text).ok_or_else(|| {
        FunnelError::parse(format!("no structured value in reply: {}", preview()))
    })?;
    if !request.shape.matches(&value) {
        return Err(FunnelError::parse(format!(
            "expected a JSON {:?}, got: {}",
            request.shape,
            preview()
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedReply(&'static str);

    #[async_trait]
    impl JudgmentClient for FixedReply {
        async fn submit(&self, _request: &JudgmentRequest) -> Result<JudgmentReply> {
            Ok(JudgmentReply {
                text: self.0.to_string(),
                model: "fixed".into(),
                tokens_in: 0,
                tokens_out: 0,
                latency_ms: 0,
                cached: false,
            })
        }

        fn provider_name(&self) -> &'static str {
            "fixed"
        }
    }

    fn request() -> JudgmentRequest {
        JudgmentRequest::new(
            "judge",
            "score this",
            ResponseShape::Object,
            &StageSettings {
                model: Some("m".into()),
                temperature: 0.3,
                max_tokens: 100,
            },
        )
    }

    #[test]
    fn request_takes_stage_settings() {
        let req = request();
        assert_eq!(req.model.as_deref(), Some("m"));
        assert_eq!(req.max_tokens, 100);
        assert!(req.cacheable);
        assert!(!req.uncached().cacheable);
    }

    #[test]
    fn shape_matching() {
        assert!(ResponseShape::Array.matches(&serde_json::json!([1])));
        assert!(!ResponseShape::Array.matches(&serde_json::json!({"a": 1})));
        assert!(ResponseShape::Object.instruction().contains("object"));
    }

    #[tokio::test]
    async fn structured_submit_extracts_value() {
        let client = FixedReply("Sure! {\"score\": 7}");
        let value = submit_structured(&client, &request()).await.unwrap();
        assert_eq!(value["score"], 7);
    }

    #[tokio::test]
    async fn structured_submit_reports_parse_error() {
        let client = FixedReply("I cannot help with that.");
        let err = submit_structured(&client, &request()).await.unwrap_err();
        assert!(matches!(err, FunnelError::Parse { .. }));
    }

    #[tokio::test]
    async fn structured_submit_rejects_wrong_shape() {
        let client = FixedReply("[{\"score\": 7}]");
        let err = submit_structured(&client, &request()).await.unwrap_err();
        assert!(err.to_string().contains("expected a JSON Object"));
    }
}
