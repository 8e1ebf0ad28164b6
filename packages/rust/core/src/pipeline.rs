//! End-to-end funnel: query → terms → candidates → screening → analysis → records.
//!
//! Each screened-in candidate runs the refinement loop independently:
//!
//! ```text
//! fetch content + items → reduce → generate ⇄ evaluate → ACCEPTED | DEGRADED | FAILED
//! ```
//!
//! Generation that yields nothing drops the candidate (FAILED, no record).
//! A failed quality gate feeds its feedback into the next attempt until
//! `max_retry` attempts were made; the last artifact is then kept as a
//! DEGRADED record.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use bitfunnel_judgment::JudgmentClient;
use bitfunnel_shared::{
    Candidate, ContentDiscoveryProvider, ContentRetrievalProvider, FunnelError, ItemOrder,
    ItemRetrievalProvider, PersistenceSink, PipelineConfig, ProcessingRecord, Result, RunId,
    ScreeningMode, ScreeningVerdict, TermPlanner,
};

use crate::generation::GenerationStage;
use crate::progress::{PipelineProgress, SilentProgress};
use crate::quality::QualityGateStage;
use crate::reduction::VolumeReductionStage;
use crate::screening::{PreScreeningStage, ScreeningInput};

/// Stand-in content for items-only runs on candidates without any.
const NO_CONTENT: &str = "(no transcript available)";

/// External collaborators a run depends on.
pub struct Collaborators {
    pub planner: Arc<dyn TermPlanner>,
    pub discovery: Arc<dyn ContentDiscoveryProvider>,
    pub content: Arc<dyn ContentRetrievalProvider>,
    pub items: Arc<dyn ItemRetrievalProvider>,
    /// Receives the records of runs that produced any.
    pub sink: Option<Arc<dyn PersistenceSink>>,
}

/// Result of one run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub query: String,
    pub terms: Vec<String>,
    /// Unique candidates returned by discovery.
    pub discovered: usize,
    /// Candidates that passed screening.
    pub screened_in: usize,
    /// Screened-in candidates that produced no record.
    pub dropped: usize,
    /// ACCEPTED and DEGRADED records, in candidate order.
    pub records: Vec<ProcessingRecord>,
    /// Sink location, when records were persisted.
    pub saved_to: Option<String>,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn degraded_count(&self) -> usize {
        self.records.iter().filter(|r| r.degraded).count()
    }
}

/// Per-candidate half of the funnel. Shared across analysis tasks.
struct CandidateAnalyzer {
    content: Arc<dyn ContentRetrievalProvider>,
    items: Arc<dyn ItemRetrievalProvider>,
    mode: ScreeningMode,
    reduction: VolumeReductionStage,
    generation: GenerationStage,
    quality: QualityGateStage,
    max_items: usize,
    reduction_target: usize,
    quality_threshold: f64,
    max_retry: u32,
}

impl CandidateAnalyzer {
    #[instrument(skip_all, fields(candidate = %candidate.id))]
    async fn analyze(
        &self,
        candidate: Candidate,
        verdict: ScreeningVerdict,
        progress: &dyn PipelineProgress,
    ) -> Option<ProcessingRecord> {
        let content = match self.content.full_content(&candidate).await {
            Ok(Some(content)) => content,
            Ok(None) if self.mode == ScreeningMode::ItemsOnly => {
                warn!("no full content, generating from items alone");
                NO_CONTENT.to_string()
            }
            Ok(None) => {
                warn!("no full content, dropping candidate");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "content retrieval failed, dropping candidate");
                return None;
            }
        };

        let pool = match self
            .items
            .fetch_items(&candidate, self.max_items, ItemOrder::Relevance)
            .await
        {
            Ok(pool) if !pool.is_empty() => pool,
            Ok(_) => {
                warn!("no items, dropping candidate");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "item retrieval failed, dropping candidate");
                return None;
            }
        };

        let reduced = self.reduction.reduce(pool, self.reduction_target).await;
        self.refine(candidate, verdict, &content, &reduced, progress)
            .await
    }

    /// The generate ⇄ evaluate loop, bounded by `max_retry` attempts.
    async fn refine(
        &self,
        candidate: Candidate,
        screening_verdict: ScreeningVerdict,
        content: &str,
        items: &[String],
        progress: &dyn PipelineProgress,
    ) -> Option<ProcessingRecord> {
        let mut attempt: u32 = 1;
        let mut feedback: Option<String> = None;

        loop {
            progress.attempt(&candidate, attempt, self.max_retry);

            let artifact = self
                .generation
                .generate(&candidate, content, items, feedback.as_deref())
                .await;
            if artifact.is_empty() {
                warn!(attempt, "generation produced nothing, candidate failed");
                return None;
            }

            let quality = self.quality.evaluate(&artifact, self.quality_threshold).await;
            let exhausted = attempt >= self.max_retry;

            if quality.passed || exhausted {
                let degraded = !quality.passed;
                if degraded {
                    warn!(attempt, score = quality.total_score, "retry budget exhausted, keeping last artifact");
                } else {
                    info!(attempt, score = quality.total_score, "artifact accepted");
                }
                return Some(ProcessingRecord {
                    candidate,
                    screening_verdict,
                    final_artifact: artifact,
                    final_quality_verdict: quality,
                    attempt_count: attempt,
                    degraded,
                    processed_at: chrono::Utc::now(),
                });
            }

            info!(attempt, score = quality.total_score, "quality gate failed, refining");
            feedback = Some(quality.feedback);
            attempt += 1;
        }
    }
}

/// Drives a whole run against injected collaborators.
pub struct Orchestrator {
    config: PipelineConfig,
    planner: Arc<dyn TermPlanner>,
    discovery: Arc<dyn ContentDiscoveryProvider>,
    content: Arc<dyn ContentRetrievalProvider>,
    items: Arc<dyn ItemRetrievalProvider>,
    sink: Option<Arc<dyn PersistenceSink>>,
    screening: PreScreeningStage,
    analyzer: Arc<CandidateAnalyzer>,
    progress: Arc<dyn PipelineProgress>,
}

impl Orchestrator {
    /// Build an orchestrator. Fails when `config` does not validate.
    pub fn new(
        config: PipelineConfig,
        client: Arc<dyn JudgmentClient>,
        collaborators: Collaborators,
    ) -> Result<Self> {
        config.validate()?;

        let screening = PreScreeningStage::new(
            client.clone(),
            config.screening_mode,
            config.screening.clone(),
        );
        let analyzer = CandidateAnalyzer {
            content: collaborators.content.clone(),
            items: collaborators.items.clone(),
            mode: config.screening_mode,
            reduction: VolumeReductionStage::new(client.clone(), config.reduction.clone()),
            generation: GenerationStage::new(
                client.clone(),
                config.generation.clone(),
                config.content_char_budget,
            ),
            quality: QualityGateStage::new(client, config.quality.clone()),
            max_items: config.max_items_per_candidate,
            reduction_target: config.reduction_target,
            quality_threshold: config.quality_threshold,
            max_retry: config.max_retry,
        };

        Ok(Self {
            config,
            planner: collaborators.planner,
            discovery: collaborators.discovery,
            content: collaborators.content,
            items: collaborators.items,
            sink: collaborators.sink,
            screening,
            analyzer: Arc::new(analyzer),
            progress: Arc::new(SilentProgress),
        })
    }

    /// Report progress to `progress` instead of discarding it.
    pub fn with_progress(mut self, progress: Arc<dyn PipelineProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the funnel for a free-text query.
    ///
    /// Fails with [`FunnelError::NoSearchTerms`] or
    /// [`FunnelError::NoCandidates`] when planning or discovery come back
    /// empty. A run where nothing survives is `Ok` with no records.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn run(&self, query: &str) -> Result<RunOutcome> {
        let start = Instant::now();
        let run_id = RunId::new();
        info!(%run_id, "starting funnel run");

        // --- Phase 1: Terms ---
        self.progress.phase("Planning search terms");
        let terms = self.planner.plan(query).await?;
        if terms.is_empty() {
            return Err(FunnelError::NoSearchTerms);
        }
        info!(terms = ?terms, "search terms ready");

        // --- Phase 2: Discovery ---
        self.progress.phase("Discovering candidates");
        let candidates = self
            .discovery
            .discover(&terms, self.config.max_candidates_per_term)
            .await?;
        if candidates.is_empty() {
            return Err(FunnelError::NoCandidates);
        }
        let discovered = candidates.len();

        // --- Phase 3: Screening ---
        self.progress.phase("Screening candidates");
        let inputs = self.screening_inputs(candidates).await;
        let screened = self
            .screening
            .screen_all(&inputs, self.config.screening_threshold)
            .await;
        self.progress.screened(screened.len(), discovered);
        let screened_in = screened.len();

        // --- Phase 4: Analysis ---
        self.progress.phase("Analysing candidates");
        let records = self.analyze_all(screened).await;
        let dropped = screened_in - records.len();

        // --- Phase 5: Persistence ---
        let saved_to = match &self.sink {
            Some(sink) if !records.is_empty() => {
                self.progress.phase("Saving results");
                match sink.persist(&records).await {
                    Ok(location) => Some(location),
                    Err(e) => {
                        error!(error = %e, "failed to persist results");
                        None
                    }
                }
            }
            _ => None,
        };

        let outcome = RunOutcome {
            run_id,
            query: query.to_string(),
            terms,
            discovered,
            screened_in,
            dropped,
            records,
            saved_to,
            elapsed: start.elapsed(),
        };

        info!(
            run_id = %outcome.run_id,
            discovered,
            screened_in,
            records = outcome.records.len(),
            degraded = outcome.degraded_count(),
            dropped,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "funnel run complete"
        );

        self.progress.done(&outcome);
        Ok(outcome)
    }

    /// Gather the cheap screening samples. Candidates without items, or
    /// without a content sample in content-aware mode, are skipped.
    async fn screening_inputs(&self, candidates: Vec<Candidate>) -> Vec<ScreeningInput> {
        let mut inputs = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let item_sample = match self
                .items
                .fetch_items(
                    &candidate,
                    self.config.screening_sample_size,
                    ItemOrder::Relevance,
                )
                .await
            {
                Ok(sample) if !sample.is_empty() => sample,
                Ok(_) => {
                    warn!(candidate = %candidate.id, "no items, skipping screening");
                    continue;
                }
                Err(e) => {
                    warn!(candidate = %candidate.id, error = %e, "item sample failed, skipping");
                    continue;
                }
            };

            let content_sample = match self.screening.mode() {
                ScreeningMode::ItemsOnly => None,
                ScreeningMode::ContentAware => match self
                    .content
                    .content_sample(&candidate, self.config.screening_content_secs)
                    .await
                {
                    Ok(Some(sample)) => Some(sample),
                    Ok(None) => {
                        warn!(candidate = %candidate.id, "no content sample, skipping screening");
                        continue;
                    }
                    Err(e) => {
                        warn!(candidate = %candidate.id, error = %e, "content sample failed, skipping");
                        continue;
                    }
                },
            };

            inputs.push(ScreeningInput {
                candidate,
                content_sample,
                item_sample,
            });
        }

        inputs
    }

    /// Analyse screened-in candidates, at most `analysis_concurrency` at a
    /// time. Records come back in candidate order.
    async fn analyze_all(
        &self,
        screened: Vec<(Candidate, ScreeningVerdict)>,
    ) -> Vec<ProcessingRecord> {
        let semaphore = Arc::new(Semaphore::new(self.config.analysis_concurrency));
        let mut handles = Vec::with_capacity(screened.len());

        for (candidate, verdict) in screened {
            let sem = semaphore.clone();
            let analyzer = self.analyzer.clone();
            let progress = self.progress.clone();

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return None;
                };
                let record = analyzer
                    .analyze(candidate.clone(), verdict, progress.as_ref())
                    .await;
                progress.candidate_finished(&candidate, record.as_ref());
                record
            }));
        }

        let mut records = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(record) => records.extend(record),
                Err(e) => error!(error = %e, "analysis task panicked"),
            }
        }
        records
    }
}
