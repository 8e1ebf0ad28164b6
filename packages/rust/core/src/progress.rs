//! Progress reporting hooks for long-running funnel runs.

use bitfunnel_shared::{Candidate, ProcessingRecord};

use crate::pipeline::RunOutcome;

/// Progress callback for reporting pipeline status.
pub trait PipelineProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once screening has judged every candidate.
    fn screened(&self, passed: usize, total: usize);
    /// Called before each generation attempt.
    fn attempt(&self, candidate: &Candidate, attempt: u32, max_retry: u32);
    /// Called when a candidate leaves the retry loop. `None` means it was dropped.
    fn candidate_finished(&self, candidate: &Candidate, record: Option<&ProcessingRecord>);
    /// Called when the run completes.
    fn done(&self, outcome: &RunOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl PipelineProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn screened(&self, _passed: usize, _total: usize) {}
    fn attempt(&self, _candidate: &Candidate, _attempt: u32, _max_retry: u32) {}
    fn candidate_finished(&self, _candidate: &Candidate, _record: Option<&ProcessingRecord>) {}
    fn done(&self, _outcome: &RunOutcome) {}
}
