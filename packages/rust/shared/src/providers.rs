//! Capability traits for the collaborators the funnel depends on.
//!
//! The core never talks to a content platform directly. Discovery, content
//! and item retrieval, term planning and persistence are injected behind
//! these traits so runs can be wired to real services or to in-memory
//! fixtures.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Candidate, ItemOrder, ProcessingRecord};

/// Turns a free-text request into search terms.
#[async_trait]
pub trait TermPlanner: Send + Sync {
    /// An empty list means nothing could be planned.
    async fn plan(&self, query: &str) -> Result<Vec<String>>;
}

/// Supplies candidates for search terms.
#[async_trait]
pub trait ContentDiscoveryProvider: Send + Sync {
    /// Candidates for all `terms`, at most `per_term` each, deduplicated,
    /// in first-seen order.
    async fn discover(&self, terms: &[String], per_term: usize) -> Result<Vec<Candidate>>;
}

/// Supplies the content (e.g. a transcript) of a candidate.
#[async_trait]
pub trait ContentRetrievalProvider: Send + Sync {
    /// Full content; `None` when the candidate has none.
    async fn full_content(&self, candidate: &Candidate) -> Result<Option<String>>;

    /// Excerpt covering roughly the first `max_secs` seconds.
    async fn content_sample(&self, candidate: &Candidate, max_secs: u32) -> Result<Option<String>>;
}

/// Supplies the raw item pool (e.g. comments) of a candidate.
#[async_trait]
pub trait ItemRetrievalProvider: Send + Sync {
    async fn fetch_items(
        &self,
        candidate: &Candidate,
        max_items: usize,
        order: ItemOrder,
    ) -> Result<Vec<String>>;
}

/// Durable storage for a run's final records.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Store `records` in order. Returns a human-readable location.
    async fn persist(&self, records: &[ProcessingRecord]) -> Result<String>;
}
