//! Volume reduction: bound a raw item pool before generation.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use bitfunnel_judgment::{JudgmentClient, JudgmentRequest, ResponseShape, submit_structured};
use bitfunnel_shared::{FunnelError, Result, StageSettings};

use crate::prompts;

pub struct VolumeReductionStage {
    client: Arc<dyn JudgmentClient>,
    settings: StageSettings,
}

impl VolumeReductionStage {
    pub fn new(client: Arc<dyn JudgmentClient>, settings: StageSettings) -> Self {
        Self { client, settings }
    }

    /// Reduce `items` to at most `target` entries.
    ///
    /// Pools already within `target` are returned unchanged without a
    /// judgment call. Any failure falls back to the first `target` items.
    #[instrument(skip_all, fields(items = items.len(), target = target))]
    pub async fn reduce(&self, items: Vec<String>, target: usize) -> Vec<String> {
        if items.len() <= target {
            debug!("pool within target, skipping reduction");
            return items;
        }

        match self.select(&items, target).await {
            Ok(selected) => {
                info!(selected = selected.len(), "reduction complete");
                selected
            }
            Err(e) => {
                warn!(error = %e, "reduction failed, keeping leading items");
                let mut items = items;
                items.truncate(target);
                items
            }
        }
    }

    async fn select(&self, items: &[String], target: usize) -> Result<Vec<String>> {
        let request = JudgmentRequest::new(
            prompts::REDUCTION_SYSTEM,
            prompts::reduction(items, target),
            ResponseShape::Object,
            &self.settings,
        );
        let value = submit_structured(self.client.as_ref(), &request).await?;

        let selected = value
            .get("selected_items")
            .and_then(Value::as_array)
            .ok_or_else(|| FunnelError::parse("reply has no selected_items array"))?;

        let mut selected: Vec<String> = selected
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        if selected.is_empty() {
            return Err(FunnelError::EmptyResult("no items selected".into()));
        }
        selected.truncate(target);
        Ok(selected)
    }
}
