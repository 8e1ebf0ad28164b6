//! Pre-screening: a cheap pass/fail gate run before any expensive work.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, instrument, warn};

use bitfunnel_judgment::{JudgmentClient, JudgmentRequest, ResponseShape, submit_structured};
use bitfunnel_shared::{
    Candidate, FunnelError, Recommendation, ScreeningMode, ScreeningVerdict, StageSettings,
};

use crate::prompts;

/// What screening sees of one candidate.
#[derive(Debug, Clone)]
pub struct ScreeningInput {
    pub candidate: Candidate,
    /// Content excerpt. Ignored in items-only mode.
    pub content_sample: Option<String>,
    pub item_sample: Vec<String>,
}

/// Judgment-backed screening gate.
pub struct PreScreeningStage {
    client: Arc<dyn JudgmentClient>,
    mode: ScreeningMode,
    settings: StageSettings,
}

impl PreScreeningStage {
    pub fn new(client: Arc<dyn JudgmentClient>, mode: ScreeningMode, settings: StageSettings) -> Self {
        Self {
            client,
            mode,
            settings,
        }
    }

    pub fn mode(&self) -> ScreeningMode {
        self.mode
    }

    /// Screen one candidate. Never fails: a transport or parse failure is a
    /// rejected verdict with score 0.
    #[instrument(skip_all, fields(candidate = %candidate.id))]
    pub async fn screen(
        &self,
        candidate: &Candidate,
        content_sample: Option<&str>,
        item_sample: &[String],
        threshold: f64,
    ) -> ScreeningVerdict {
        let prompt = match self.mode {
            ScreeningMode::ContentAware => prompts::screening_content_aware(
                candidate,
                content_sample.unwrap_or("(no transcript available)"),
                item_sample,
            ),
            ScreeningMode::ItemsOnly => prompts::screening_items_only(candidate, item_sample),
        };
        let request = JudgmentRequest::new(
            prompts::SCREENING_SYSTEM,
            prompt,
            ResponseShape::Object,
            &self.settings,
        );

        let verdict = match submit_structured(self.client.as_ref(), &request).await {
            Ok(value) => self.verdict_from(&value, threshold),
            Err(e) => ScreeningVerdict::rejected(e.to_string()),
        };

        if verdict.passed {
            info!(title = %candidate.title, score = verdict.score, "screening passed");
        } else {
            warn!(title = %candidate.title, score = verdict.score, reason = %verdict.reason, "screening rejected");
        }
        verdict
    }

    /// Screen every input and keep the passing candidates with their
    /// verdicts, in input order.
    #[instrument(skip_all, fields(candidates = inputs.len(), threshold = threshold))]
    pub async fn screen_all(
        &self,
        inputs: &[ScreeningInput],
        threshold: f64,
    ) -> Vec<(Candidate, ScreeningVerdict)> {
        let mut passed = Vec::new();
        for input in inputs {
            let verdict = self
                .screen(
                    &input.candidate,
                    input.content_sample.as_deref(),
                    &input.item_sample,
                    threshold,
                )
                .await;
            if verdict.passed {
                passed.push((input.candidate.clone(), verdict));
            }
        }

        info!(passed = passed.len(), total = inputs.len(), "screening complete");
        passed
    }

    fn verdict_from(&self, value: &Value, threshold: f64) -> ScreeningVerdict {
        let Some(object) = value.as_object() else {
            return ScreeningVerdict::rejected(
                FunnelError::parse("screening reply is not an object").to_string(),
            );
        };

        let score = object.get("score").and_then(as_score).unwrap_or(0.0);
        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let (recommendation, passed) = match self.mode {
            ScreeningMode::ContentAware => {
                let recommendation = match object.get("recommendation").and_then(Value::as_str) {
                    Some(r) if r.trim().eq_ignore_ascii_case("continue") => Recommendation::Continue,
                    _ => Recommendation::Skip,
                };
                let passed = score >= threshold && recommendation == Recommendation::Continue;
                (recommendation, passed)
            }
            ScreeningMode::ItemsOnly => {
                let recommended = object
                    .get("recommended")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let recommendation = if recommended {
                    Recommendation::Continue
                } else {
                    Recommendation::Skip
                };
                (recommendation, recommended && score >= threshold)
            }
        };

        ScreeningVerdict {
            passed,
            score,
            reason: text("reason"),
            recommendation,
            expected_content: text("expected_content"),
        }
    }
}

/// A score given as a number or a numeric string, clamped to `[0, 10]`.
pub(crate) fn as_score(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    score.is_finite().then(|| score.clamp(0.0, 10.0))
}
