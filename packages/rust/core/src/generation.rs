//! Generation: turn full content and reduced items into bits.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use bitfunnel_judgment::{JudgmentClient, JudgmentRequest, ResponseShape, submit_structured};
use bitfunnel_shared::{
    Bit, Candidate, FunnelError, GenerationArtifact, RelatedMoment, Result, StageSettings,
};

use crate::prompts;
use crate::screening::as_score;

/// Bit as the judgment writes it. Lenient where the model tends to drift.
#[derive(Debug, Deserialize)]
struct RawBit {
    source_item: String,
    #[serde(default)]
    category_tag: String,
    #[serde(default)]
    exploit_point: String,
    #[serde(default)]
    retort_example: String,
    #[serde(default)]
    related_moment: Option<RawMoment>,
}

#[derive(Debug, Deserialize)]
struct RawMoment {
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    relevance: Value,
}

impl RawBit {
    fn into_bit(self) -> Option<Bit> {
        let source_item = self.source_item.trim().to_string();
        if source_item.is_empty() {
            return None;
        }
        let related_moment = self
            .related_moment
            .filter(|m| !m.timestamp.trim().is_empty())
            .map(|m| RelatedMoment {
                timestamp: m.timestamp.trim().to_string(),
                description: m.description,
                relevance: as_score(&m.relevance).map_or(0, |s| s.round() as u8),
            });

        Some(Bit {
            source_item,
            category_tag: self.category_tag,
            exploit_point: self.exploit_point,
            retort_example: self.retort_example,
            related_moment,
        })
    }
}

/// Cut `text` to at most `budget` characters.
pub(crate) fn truncate_chars(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

pub struct GenerationStage {
    client: Arc<dyn JudgmentClient>,
    settings: StageSettings,
    content_char_budget: usize,
}

impl GenerationStage {
    pub fn new(
        client: Arc<dyn JudgmentClient>,
        settings: StageSettings,
        content_char_budget: usize,
    ) -> Self {
        Self {
            client,
            settings,
            content_char_budget,
        }
    }

    /// Generate an artifact. Non-empty `feedback` is appended as a
    /// refinement directive. Any failure yields an empty artifact.
    #[instrument(skip_all, fields(candidate = %candidate.id, items = items.len(), refining = feedback.is_some()))]
    pub async fn generate(
        &self,
        candidate: &Candidate,
        full_content: &str,
        items: &[String],
        feedback: Option<&str>,
    ) -> GenerationArtifact {
        match self.try_generate(candidate, full_content, items, feedback).await {
            Ok(bits) => {
                info!(bits = bits.len(), "generation complete");
                bits
            }
            Err(e) => {
                error!(error = %e, "generation failed");
                Vec::new()
            }
        }
    }

    async fn try_generate(
        &self,
        candidate: &Candidate,
        full_content: &str,
        items: &[String],
        feedback: Option<&str>,
    ) -> Result<GenerationArtifact> {
        let content = truncate_chars(full_content, self.content_char_budget);
        let mut prompt = prompts::generation(candidate, content, items);
        if let Some(feedback) = feedback.map(str::trim).filter(|f| !f.is_empty()) {
            prompt.push_str(&prompts::refinement(feedback));
        }

        // Retries with empty feedback resend the same prompt.
        let request = JudgmentRequest::new(
            prompts::GENERATION_SYSTEM,
            prompt,
            ResponseShape::Array,
            &self.settings,
        )
        .uncached();
        let value = submit_structured(self.client.as_ref(), &request).await?;

        let Value::Array(entries) = value else {
            return Err(FunnelError::parse("generation reply is not an array"));
        };

        let total = entries.len();
        let bits: Vec<Bit> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<RawBit>(entry) {
                Ok(raw) => raw.into_bit(),
                Err(e) => {
                    debug!(error = %e, "dropping malformed bit");
                    None
                }
            })
            .collect();

        if bits.len() < total {
            debug!(kept = bits.len(), total, "some bits were malformed");
        }
        Ok(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedJudgment, candidate, items};
    use bitfunnel_shared::PipelineConfig;

    const TWO_BITS: &str = r#"Here you go:
```json
[
  {
    "source_item": "comment 0",
    "category_tag": "overgeneralization",
    "exploit_point": "one clip, whole population",
    "retort_example": "you watched one car",
    "related_moment": {"timestamp": "0:32", "description": "the turn", "relevance": 14}
  },
  {
    "source_item": "comment 1",
    "category_tag": "hindsight",
    "exploit_point": "easy to say afterwards",
    "retort_example": "and you saw it coming?",
    "related_moment": {"timestamp": "", "description": "", "relevance": 0}
  }
]
```"#;

    fn stage(client: Arc<ScriptedJudgment>, budget: usize) -> GenerationStage {
        GenerationStage::new(client, PipelineConfig::default().generation, budget)
    }

    #[tokio::test]
    async fn parses_bits_and_clamps_relevance() {
        let client = ScriptedJudgment::replying(TWO_BITS);
        let bits = stage(client, 15_000)
            .generate(&candidate("a"), "[0:00] hello", &items(2), None)
            .await;
        assert_eq!(bits.len(), 2);
        let moment = bits[0].related_moment.as_ref().unwrap();
        assert_eq!(moment.timestamp, "0:32");
        assert_eq!(moment.relevance, 10);
        assert!(bits[1].related_moment.is_none());
    }

    #[tokio::test]
    async fn non_array_reply_is_empty() {
        let client = ScriptedJudgment::replying(r#"{"bits": []}"#);
        let bits = stage(client, 100)
            .generate(&candidate("a"), "content", &items(2), None)
            .await;
        assert!(bits.is_empty());
    }

    #[tokio::test]
    async fn failure_is_empty() {
        let bits = stage(ScriptedJudgment::failing(), 100)
            .generate(&candidate("a"), "content", &items(2), None)
            .await;
        assert!(bits.is_empty());

        let bits = stage(ScriptedJudgment::replying("sorry, no"), 100)
            .generate(&candidate("a"), "content", &items(2), None)
            .await;
        assert!(bits.is_empty());
    }

    #[tokio::test]
    async fn malformed_entries_are_dropped() {
        let client = ScriptedJudgment::replying(
            r#"[{"source_item": "kept", "category_tag": "t"}, {"category_tag": "no source"}, 42]"#,
        );
        let bits = stage(client, 100)
            .generate(&candidate("a"), "content", &items(1), None)
            .await;
        assert_eq!(bits.len(), 1);
        assert_eq!(bits[0].source_item, "kept");
    }

    #[tokio::test]
    async fn content_is_cut_to_budget() {
        let client = ScriptedJudgment::replying("[]");
        let content = format!("{}TAIL", "あ".repeat(20));
        stage(client.clone(), 20)
            .generate(&candidate("a"), &content, &items(1), None)
            .await;
        let prompt = &client.calls()[0].prompt;
        assert!(prompt.contains(&"あ".repeat(20)));
        assert!(!prompt.contains("TAIL"));
    }

    #[tokio::test]
    async fn feedback_is_appended_only_when_present() {
        let client = ScriptedJudgment::replying("[]");
        let stage = stage(client.clone(), 100);
        stage
            .generate(&candidate("a"), "content", &items(1), Some("sharper punchlines"))
            .await;
        stage
            .generate(&candidate("a"), "content", &items(1), Some("   "))
            .await;

        let calls = client.calls();
        assert!(calls[0].prompt.contains("sharper punchlines"));
        assert!(calls[0].prompt.contains("previous attempt"));
        assert!(!calls[1].prompt.contains("previous attempt"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
