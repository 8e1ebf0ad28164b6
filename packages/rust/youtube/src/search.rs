//! Candidate discovery through the Data API `search` listing.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument, warn};

use bitfunnel_shared::{Candidate, ContentDiscoveryProvider, Result};

use crate::{YouTubeProvider, watch_url};

/// Data API hard cap on `maxResults` for `search`.
const MAX_RESULTS_CAP: usize = 50;

impl YouTubeProvider {
    /// Search one term and map the hits to candidates.
    pub async fn search_term(&self, term: &str, max_results: usize) -> Result<Vec<Candidate>> {
        let params = [
            ("part", "snippet".to_string()),
            ("q", term.to_string()),
            ("type", "video".to_string()),
            ("videoLicense", self.license.clone()),
            ("maxResults", max_results.clamp(1, MAX_RESULTS_CAP).to_string()),
            ("order", "relevance".to_string()),
            ("relevanceLanguage", self.relevance_language.clone()),
        ];

        let body = self.get_resource("search", &params).await?;
        let candidates: Vec<Candidate> = body
            .get("items")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(candidate_from_item).collect())
            .unwrap_or_default();

        info!(term, found = candidates.len(), "search complete");
        Ok(candidates)
    }
}

fn candidate_from_item(item: &Value) -> Option<Candidate> {
    let id = item.pointer("/id/videoId")?.as_str()?;
    let snippet = item.get("snippet")?;
    let text = |key: &str| {
        snippet
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Some(Candidate {
        id: id.to_string(),
        title: text("title"),
        description: text("description"),
        channel: text("channelTitle"),
        url: watch_url(id),
    })
}

#[async_trait]
impl ContentDiscoveryProvider for YouTubeProvider {
    #[instrument(skip_all, fields(terms = terms.len(), per_term = per_term))]
    async fn discover(&self, terms: &[String], per_term: usize) -> Result<Vec<Candidate>> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for term in terms {
            match self.search_term(term, per_term).await {
                Ok(found) => {
                    for candidate in found.into_iter().take(per_term) {
                        if seen.insert(candidate.id.clone()) {
                            candidates.push(candidate);
                        }
                    }
                }
                Err(e) => warn!(term = %term, error = %e, "search failed, skipping term"),
            }
        }

        info!(unique = candidates.len(), "discovery complete");
        Ok(candidates)
    }
}
