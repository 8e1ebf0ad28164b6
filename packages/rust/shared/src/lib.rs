//! Shared types, error model, configuration and provider traits for bitfunnel.
//!
//! This crate is the foundation depended on by all other bitfunnel crates.
//! It provides:
//! - [`FunnelError`] — the unified error type
//! - Domain types ([`Candidate`], [`ScreeningVerdict`], [`Bit`], [`QualityVerdict`],
//!   [`ProcessingRecord`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)
//! - Capability traits for external collaborators ([`providers`])

pub mod config;
pub mod error;
pub mod providers;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, JudgmentConfig, OutputConfig, PipelineConfig, PipelineSection, ScreeningMode,
    StageSettings, YouTubeConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, read_api_key, validate_api_keys,
};
pub use error::{FunnelError, Result};
pub use providers::{
    ContentDiscoveryProvider, ContentRetrievalProvider, ItemRetrievalProvider, PersistenceSink,
    TermPlanner,
};
pub use types::{
    Bit, Candidate, GenerationArtifact, ItemOrder, ProcessingRecord, QualityVerdict,
    Recommendation, RelatedMoment, RunId, ScreeningVerdict,
};
