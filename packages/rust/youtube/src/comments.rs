//! Raw item retrieval through `commentThreads`.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument, warn};

use bitfunnel_shared::{Candidate, ItemOrder, ItemRetrievalProvider, Result};

use crate::YouTubeProvider;

/// Data API hard cap on `maxResults` for `commentThreads`.
const PAGE_SIZE: usize = 100;

#[async_trait]
impl ItemRetrievalProvider for YouTubeProvider {
    /// Pages through top-level comments until `max_items` or the last page.
    /// A failing page keeps what was already fetched; a failing first page
    /// is an error.
    #[instrument(skip_all, fields(candidate = %candidate.id, max_items = max_items))]
    async fn fetch_items(
        &self,
        candidate: &Candidate,
        max_items: usize,
        order: ItemOrder,
    ) -> Result<Vec<String>> {
        let mut items: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;

        while items.len() < max_items {
            let mut params = vec![
                ("part", "snippet".to_string()),
                ("videoId", candidate.id.clone()),
                ("maxResults", PAGE_SIZE.min(max_items - items.len()).to_string()),
                ("order", order.as_str().to_string()),
                ("textFormat", "plainText".to_string()),
            ];
            if let Some(token) = &page_token {
                params.push(("pageToken", token.clone()));
            }

            let body = match self.get_resource("commentThreads", &params).await {
                Ok(body) => body,
                Err(e) if items.is_empty() => return Err(e),
                Err(e) => {
                    warn!(error = %e, fetched = items.len(), "comment page failed, keeping partial pool");
                    break;
                }
            };

            let page = body
                .get("items")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            items.extend(page.iter().filter_map(comment_text));

            page_token = body
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(String::from);
            if page_token.is_none() || page.is_empty() {
                break;
            }
        }

        items.truncate(max_items);
        info!(fetched = items.len(), "comments fetched");
        Ok(items)
    }
}

fn comment_text(thread: &Value) -> Option<String> {
    thread
        .pointer("/snippet/topLevelComment/snippet/textDisplay")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(String::from)
}
