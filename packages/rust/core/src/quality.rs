//! Quality gate: one holistic verdict per artifact version.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use bitfunnel_judgment::{JudgmentClient, JudgmentRequest, ResponseShape, submit_structured};
use bitfunnel_shared::{FunnelError, GenerationArtifact, QualityVerdict, Result, StageSettings};

use crate::prompts;
use crate::screening::as_score;

pub struct QualityGateStage {
    client: Arc<dyn JudgmentClient>,
    settings: StageSettings,
}

impl QualityGateStage {
    pub fn new(client: Arc<dyn JudgmentClient>, settings: StageSettings) -> Self {
        Self { client, settings }
    }

    /// Evaluate the whole artifact.
    ///
    /// `passed` is the judgment's own flag. `threshold` is supplied to the
    /// judgment as the bar and is not re-checked against `total_score`.
    #[instrument(skip_all, fields(bits = artifact.len(), threshold = threshold))]
    pub async fn evaluate(&self, artifact: &GenerationArtifact, threshold: f64) -> QualityVerdict {
        let verdict = match self.try_evaluate(artifact, threshold).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(error = %e, "evaluation failed");
                return QualityVerdict::evaluation_error();
            }
        };

        if verdict.passed {
            info!(score = verdict.total_score, "quality gate passed");
        } else {
            warn!(score = verdict.total_score, "quality gate failed");
        }
        for improvement in &verdict.improvements {
            debug!(%improvement, "suggested improvement");
        }
        verdict
    }

    async fn try_evaluate(
        &self,
        artifact: &GenerationArtifact,
        threshold: f64,
    ) -> Result<QualityVerdict> {
        let artifact_json = serde_json::to_string_pretty(artifact)
            .map_err(|e| FunnelError::validation(format!("artifact not serializable: {e}")))?;

        let request = JudgmentRequest::new(
            prompts::QUALITY_SYSTEM,
            prompts::quality(&artifact_json, threshold),
            ResponseShape::Object,
            &self.settings,
        )
        .uncached();
        let value = submit_structured(self.client.as_ref(), &request).await?;
        let object = value
            .as_object()
            .ok_or_else(|| FunnelError::parse("quality reply is not an object"))?;

        let strings = |key: &str| -> Vec<String> {
            object
                .get(key)
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default()
        };

        let individual_scores: BTreeMap<String, f64> = object
            .get("individual_scores")
            .and_then(Value::as_object)
            .map(|scores| {
                scores
                    .iter()
                    .filter_map(|(name, score)| Some((name.clone(), as_score(score)?)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(QualityVerdict {
            passed: object.get("passed").and_then(Value::as_bool).unwrap_or(false),
            total_score: object.get("total_score").and_then(as_score).unwrap_or(0.0),
            individual_scores,
            improvements: strings("improvements"),
            feedback: object
                .get("feedback")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            strengths: strings("strengths"),
        })
    }
}
