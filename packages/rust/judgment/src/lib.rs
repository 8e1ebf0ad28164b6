//! Judgment service capability for bitfunnel.
//!
//! This crate provides:
//! - [`JudgmentClient`] — the single-method seam every stage depends on
//! - [`ChatCompletionsClient`] — an OpenAI-compatible HTTP implementation
//! - [`extract_structured`] — tolerant JSON extraction from free-text replies
//! - [`CachedJudgment`] — an in-memory decorator keyed by prompt hash

pub mod cache;
pub mod client;
pub mod openai;
pub mod parser;

pub use cache::{CacheStats, CachedJudgment};
pub use client::{JudgmentClient, JudgmentReply, JudgmentRequest, ResponseShape, submit_structured};
pub use openai::ChatCompletionsClient;
pub use parser::extract_structured;
