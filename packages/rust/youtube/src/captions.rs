//! Content retrieval through timed-text captions.
//!
//! The endpoint answers with a small XML document:
//! `<transcript><text start="0.5" dur="2.1">line</text>...</transcript>`,
//! or an empty body when no track exists for the language.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, instrument};

use bitfunnel_shared::{Candidate, ContentRetrievalProvider, FunnelError, Result};

use crate::YouTubeProvider;

/// One caption line.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionSegment {
    /// Start offset in seconds.
    pub start: f64,
    pub text: String,
}

/// Matches one `<text start=".." ...>body</text>` element.
static TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<text\b[^>]*?\bstart="([0-9.]+)"[^>]*>(.*?)</text>"#).expect("text regex")
});

/// Matches numeric character references (`&#39;`, `&#x27;`).
static NUMERIC_ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("numeric entity regex")
});

/// Render seconds as `m:ss`.
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn decode_entities(text: &str) -> String {
    let numeric = NUMERIC_ENTITY_RE.replace_all(text, |caps: &regex::Captures<'_>| {
        let code = &caps[1];
        let parsed = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        parsed
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    numeric
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Parse a timed-text document into segments, dropping blank lines.
pub fn parse_timedtext(xml: &str) -> Vec<CaptionSegment> {
    TEXT_RE
        .captures_iter(xml)
        .filter_map(|caps| {
            let start = caps[1].parse::<f64>().ok()?;
            let text = decode_entities(&caps[2]).replace('\n', " ");
            let text = text.trim();
            (!text.is_empty()).then(|| CaptionSegment {
                start,
                text: text.to_string(),
            })
        })
        .collect()
}

impl YouTubeProvider {
    /// Captions in the first configured language that has any.
    pub async fn fetch_captions(&self, video_id: &str) -> Result<Vec<CaptionSegment>> {
        for lang in &self.caption_languages {
            let response = self
                .client
                .get(&self.timedtext_base)
                .query(&[("v", video_id), ("lang", lang.as_str())])
                .send()
                .await
                .map_err(|e| FunnelError::transport(format!("timedtext {video_id}: {e}")))?;

            if !response.status().is_success() {
                debug!(video_id, lang = %lang, status = %response.status(), "no caption track");
                continue;
            }

            let body = response
                .text()
                .await
                .map_err(|e| FunnelError::transport(format!("timedtext {video_id}: {e}")))?;

            let segments = parse_timedtext(&body);
            if !segments.is_empty() {
                info!(video_id, lang = %lang, segments = segments.len(), "captions fetched");
                return Ok(segments);
            }
        }

        Ok(Vec::new())
    }
}

#[async_trait]
impl ContentRetrievalProvider for YouTubeProvider {
    /// `[m:ss] text` lines covering the whole video.
    #[instrument(skip_all, fields(candidate = %candidate.id))]
    async fn full_content(&self, candidate: &Candidate) -> Result<Option<String>> {
        let segments = self.fetch_captions(&candidate.id).await?;
        if segments.is_empty() {
            return Ok(None);
        }

        let lines: Vec<String> = segments
            .iter()
            .map(|s| format!("[{}] {}", format_timestamp(s.start), s.text))
            .collect();
        Ok(Some(lines.join("\n")))
    }

    /// Plain text of the segments starting within the first `max_secs` seconds.
    #[instrument(skip_all, fields(candidate = %candidate.id, max_secs = max_secs))]
    async fn content_sample(&self, candidate: &Candidate, max_secs: u32) -> Result<Option<String>> {
        let segments = self.fetch_captions(&candidate.id).await?;
        let texts: Vec<&str> = segments
            .iter()
            .take_while(|s| s.start <= f64::from(max_secs))
            .map(|s| s.text.as_str())
            .collect();

        if texts.is_empty() {
            return Ok(None);
        }
        Ok(Some(texts.join(" ")))
    }
}
