//! YouTube-backed collaborators for the funnel.
//!
//! [`YouTubeProvider`] implements three capability traits against public
//! YouTube endpoints:
//! - discovery via the Data API v3 `search` listing (licence-filtered)
//! - item retrieval via `commentThreads`, paged up to the requested volume
//! - content retrieval via the timed-text caption endpoint

mod captions;
mod comments;
mod search;

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use bitfunnel_shared::{FunnelError, Result, YouTubeConfig, read_api_key};

pub use captions::{CaptionSegment, format_timestamp, parse_timedtext};

/// Default timeout in seconds for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("bitfunnel/", env!("CARGO_PKG_VERSION"));

/// Canonical watch URL for a video id.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

/// Discovery, item and content provider backed by YouTube.
pub struct YouTubeProvider {
    client: Client,
    api_key: String,
    api_base: String,
    timedtext_base: String,
    license: String,
    relevance_language: String,
    caption_languages: Vec<String>,
}

impl YouTubeProvider {
    /// Create a provider from the `[youtube]` section and an explicit key.
    pub fn new(config: &YouTubeConfig, api_key: impl Into<String>) -> Result<Self> {
        for base in [&config.api_base, &config.timedtext_base] {
            Url::parse(base)
                .map_err(|e| FunnelError::validation(format!("invalid base URL '{base}': {e}")))?;
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| FunnelError::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            timedtext_base: config.timedtext_base.clone(),
            license: config.license.clone(),
            relevance_language: config.relevance_language.clone(),
            caption_languages: config.caption_languages.clone(),
        })
    }

    /// Create a provider reading the key from `config.api_key_env`.
    pub fn from_config(config: &YouTubeConfig) -> Result<Self> {
        let api_key = read_api_key(&config.api_key_env, "YouTube")?;
        Self::new(config, api_key)
    }

    /// GET a Data API resource and decode its JSON body.
    async fn get_resource(&self, resource: &str, params: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/{resource}", self.api_base);
        debug!(%url, "youtube api request");

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| FunnelError::transport(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            return Err(FunnelError::transport(format!(
                "{url}: HTTP {status}: {preview}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| FunnelError::parse(format!("{url}: invalid JSON body: {e}")))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use wiremock::MockServer;

    pub(crate) fn provider(server: &MockServer) -> YouTubeProvider {
        let config = YouTubeConfig {
            api_base: server.uri(),
            timedtext_base: format!("{}/api/timedtext", server.uri()),
            ..Default::default()
        };
        YouTubeProvider::new(&config, "yt-key").expect("provider")
    }

    pub(crate) fn candidate(id: &str) -> bitfunnel_shared::Candidate {
        bitfunnel_shared::Candidate {
            id: id.into(),
            title: format!("video {id}"),
            description: String::new(),
            channel: "channel".into(),
            url: watch_url(id),
        }
    }
}
