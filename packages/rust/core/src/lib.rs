//! Funnel stages and run orchestration for bitfunnel.
//!
//! This crate ties the judgment service and the content collaborators
//! together: pre-screening, volume reduction, generation and the quality
//! gate, driven per candidate by the [`Orchestrator`]'s refinement loop.

pub mod export;
pub mod generation;
pub mod pipeline;
pub mod planner;
pub mod progress;
pub mod prompts;
pub mod quality;
pub mod reduction;
pub mod screening;

#[cfg(test)]
mod testing;

pub use export::JsonFileSink;
pub use generation::GenerationStage;
pub use pipeline::{Collaborators, Orchestrator, RunOutcome};
pub use planner::QueryPlanner;
pub use progress::{PipelineProgress, SilentProgress};
pub use quality::QualityGateStage;
pub use reduction::VolumeReductionStage;
pub use screening::{PreScreeningStage, ScreeningInput};
