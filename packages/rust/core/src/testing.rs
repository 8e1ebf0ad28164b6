//! Deterministic collaborators for stage and orchestrator tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use bitfunnel_judgment::{JudgmentClient, JudgmentReply, JudgmentRequest};
use bitfunnel_shared::{
    Candidate, ContentDiscoveryProvider, ContentRetrievalProvider, FunnelError, ItemOrder,
    ItemRetrievalProvider, ProcessingRecord, Result, TermPlanner,
};

type Script = dyn Fn(&JudgmentRequest, usize) -> Result<String> + Send + Sync;

/// Judgment stub answering from a closure. The closure receives the request
/// and how many earlier calls carried the same system message.
pub(crate) struct ScriptedJudgment {
    script: Box<Script>,
    calls: Mutex<Vec<JudgmentRequest>>,
}

impl ScriptedJudgment {
    pub(crate) fn new(
        script: impl Fn(&JudgmentRequest, usize) -> Result<String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn replying(text: &'static str) -> Arc<Self> {
        Self::new(move |_, _| Ok(text.to_string()))
    }

    pub(crate) fn failing() -> Arc<Self> {
        Self::new(|_, _| Err(FunnelError::transport("connection refused")))
    }

    pub(crate) fn calls(&self) -> Vec<JudgmentRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls made with `system` as the system message.
    pub(crate) fn calls_for(&self, system: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.system == system)
            .count()
    }
}

#[async_trait]
impl JudgmentClient for ScriptedJudgment {
    async fn submit(&self, request: &JudgmentRequest) -> Result<JudgmentReply> {
        let nth = {
            let mut calls = self.calls.lock().unwrap();
            let nth = calls.iter().filter(|r| r.system == request.system).count();
            calls.push(request.clone());
            nth
        };
        let text = (self.script)(request, nth)?;
        Ok(JudgmentReply {
            text,
            model: "scripted".into(),
            tokens_in: 0,
            tokens_out: 0,
            latency_ms: 0,
            cached: false,
        })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

pub(crate) fn candidate(id: &str) -> Candidate {
    Candidate {
        id: id.into(),
        title: format!("video {id}"),
        description: format!("description of {id}"),
        channel: "channel".into(),
        url: format!("https://www.youtube.com/watch?v={id}"),
    }
}

pub(crate) fn items(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("comment {i}")).collect()
}

/// In-memory planner, discovery, content and item source.
#[derive(Default)]
pub(crate) struct FixtureSource {
    pub(crate) terms: Vec<String>,
    pub(crate) candidates: Vec<Candidate>,
    pub(crate) content: HashMap<String, String>,
    pub(crate) items: HashMap<String, Vec<String>>,
    /// Candidate ids whose retrieval fails with a transport error.
    pub(crate) broken: Vec<String>,
    /// Candidate ids with a content sample but no full content.
    pub(crate) sample_only: Vec<String>,
}

impl FixtureSource {
    /// One term, every candidate with content and `n_items` comments.
    pub(crate) fn with_candidates(ids: &[&str], n_items: usize) -> Self {
        let candidates: Vec<Candidate> = ids.iter().map(|id| candidate(id)).collect();
        let content = ids
            .iter()
            .map(|id| (id.to_string(), format!("[0:00] opening of {id}")))
            .collect();
        let items = ids.iter().map(|id| (id.to_string(), self::items(n_items))).collect();
        Self {
            terms: vec!["term".into()],
            candidates,
            content,
            items,
            ..Default::default()
        }
    }

    fn check(&self, candidate: &Candidate) -> Result<()> {
        if self.broken.contains(&candidate.id) {
            return Err(FunnelError::transport(format!("{} unavailable", candidate.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl TermPlanner for FixtureSource {
    async fn plan(&self, _query: &str) -> Result<Vec<String>> {
        Ok(self.terms.clone())
    }
}

#[async_trait]
impl ContentDiscoveryProvider for FixtureSource {
    async fn discover(&self, _terms: &[String], _per_term: usize) -> Result<Vec<Candidate>> {
        Ok(self.candidates.clone())
    }
}

#[async_trait]
impl ContentRetrievalProvider for FixtureSource {
    async fn full_content(&self, candidate: &Candidate) -> Result<Option<String>> {
        self.check(candidate)?;
        if self.sample_only.contains(&candidate.id) {
            return Ok(None);
        }
        Ok(self.content.get(&candidate.id).cloned())
    }

    async fn content_sample(&self, candidate: &Candidate, _max_secs: u32) -> Result<Option<String>> {
        self.check(candidate)?;
        Ok(self.content.get(&candidate.id).cloned())
    }
}

#[async_trait]
impl ItemRetrievalProvider for FixtureSource {
    async fn fetch_items(
        &self,
        candidate: &Candidate,
        max_items: usize,
        _order: ItemOrder,
    ) -> Result<Vec<String>> {
        self.check(candidate)?;
        let mut items = self.items.get(&candidate.id).cloned().unwrap_or_default();
        items.truncate(max_items);
        Ok(items)
    }
}

/// Sink that keeps persisted batches in memory.
#[derive(Default)]
pub(crate) struct MemorySink {
    pub(crate) batches: Mutex<Vec<Vec<ProcessingRecord>>>,
}

#[async_trait]
impl bitfunnel_shared::PersistenceSink for MemorySink {
    async fn persist(&self, records: &[ProcessingRecord]) -> Result<String> {
        self.batches.lock().unwrap().push(records.to_vec());
        Ok("memory".into())
    }
}
