//! Core domain types flowing through the funnel.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// A discovered content item eligible for the funnel. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Provider-specific identifier (e.g. a YouTube video id).
    pub id: String,
    pub title: String,
    /// Descriptive text supplied by the source.
    #[serde(default)]
    pub description: String,
    /// Channel or source label.
    #[serde(default)]
    pub channel: String,
    /// Canonical locator (watch URL).
    pub url: String,
}

/// Ordering mode requested from an item provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOrder {
    /// Newest first.
    Time,
    /// Provider's relevance ranking.
    #[default]
    Relevance,
}

impl ItemOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Relevance => "relevance",
        }
    }
}

// ---------------------------------------------------------------------------
// Screening
// ---------------------------------------------------------------------------

/// The judgment's advice on whether a candidate is worth the expensive stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Continue,
    #[default]
    Skip,
}

/// Outcome of pre-screening one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningVerdict {
    pub passed: bool,
    /// Score in `[0, 10]`.
    pub score: f64,
    pub reason: String,
    pub recommendation: Recommendation,
    /// The kind of material the judgment expects the candidate to yield.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expected_content: String,
}

impl ScreeningVerdict {
    /// A failed screen, equivalent to a zero score.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            score: 0.0,
            reason: reason.into(),
            recommendation: Recommendation::Skip,
            expected_content: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Generation artifact
// ---------------------------------------------------------------------------

/// The moment in the content a bit refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedMoment {
    /// `m:ss` style position within the content.
    pub timestamp: String,
    pub description: String,
    /// Relevance in `[0, 10]`.
    pub relevance: u8,
}

/// One structured unit of the generation artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bit {
    /// The raw item the bit is built on.
    pub source_item: String,
    pub category_tag: String,
    pub exploit_point: String,
    pub retort_example: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_moment: Option<RelatedMoment>,
}

/// Ordered bits produced by one generation attempt.
pub type GenerationArtifact = Vec<Bit>;

// ---------------------------------------------------------------------------
// Quality
// ---------------------------------------------------------------------------

/// Holistic evaluation of one artifact version.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub passed: bool,
    /// Aggregate score in `[0, 10]`.
    pub total_score: f64,
    #[serde(default)]
    pub individual_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub improvements: Vec<String>,
    /// Corrective directive for the next generation attempt.
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub strengths: Vec<String>,
}

impl QualityVerdict {
    /// The verdict used when evaluation itself failed.
    pub fn evaluation_error() -> Self {
        Self {
            passed: false,
            total_score: 0.0,
            improvements: vec!["evaluation error".into()],
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessingRecord
// ---------------------------------------------------------------------------

/// Terminal result for one candidate that reached ACCEPTED or DEGRADED.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub candidate: Candidate,
    pub screening_verdict: ScreeningVerdict,
    pub final_artifact: GenerationArtifact,
    pub final_quality_verdict: QualityVerdict,
    /// Number of generation attempts made (1-based).
    pub attempt_count: u32,
    /// True when the retry budget ran out without passing the quality gate.
    pub degraded: bool,
    pub processed_at: DateTime<Utc>,
}
