//! Judgment-backed search term planning.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument, warn};

use bitfunnel_judgment::{JudgmentClient, JudgmentRequest, ResponseShape, submit_structured};
use bitfunnel_shared::{Result, StageSettings, TermPlanner};

use crate::prompts;

/// Asks the judgment service for search queries.
pub struct QueryPlanner {
    client: Arc<dyn JudgmentClient>,
    settings: StageSettings,
}

impl QueryPlanner {
    pub fn new(client: Arc<dyn JudgmentClient>, settings: StageSettings) -> Self {
        Self { client, settings }
    }
}

#[async_trait]
impl TermPlanner for QueryPlanner {
    /// Unique, trimmed terms in reply order. A failed call plans nothing.
    #[instrument(skip_all)]
    async fn plan(&self, query: &str) -> Result<Vec<String>> {
        let request = JudgmentRequest::new(
            prompts::PLANNING_SYSTEM,
            prompts::planning(query),
            ResponseShape::Object,
            &self.settings,
        );

        let value = match submit_structured(self.client.as_ref(), &request).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "query planning failed");
                return Ok(Vec::new());
            }
        };

        let mut seen = HashSet::new();
        let terms: Vec<String> = value
            .get("search_queries")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|t| !t.is_empty() && seen.insert(t.to_string()))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        info!(terms = terms.len(), "search terms planned");
        Ok(terms)
    }
}
