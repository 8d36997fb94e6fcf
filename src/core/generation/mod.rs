//! Generation Pipeline
//!
//! Turns adventure parameters into scaffolds, scene expansions,
//! refinements and movement regenerations.
//!
//! - [`GenerationOrchestrator`] - the façade callers use
//! - [`PromptAssembler`] - frame-aware prompt construction
//! - [`TemperaturePolicy`] - the one temperature table
//! - [`ContentRetriever`] - seam for tier-filtered content search
//! - [`DecodeResponse`] - typed decoding of raw completions
//!
//! ```text
//! caller -> orchestrator -> governor -> ledger.consume -> cache.lookup
//!                                                           | miss
//!                          retriever -> assembler -> client -> decode -> cache.store
//! ```

mod error;
mod orchestrator;
mod parse;
mod prompts;
mod retrieval;
mod temperature;
mod types;

pub use error::{GenerationError, GenerationResult, UpstreamFailure};
pub use orchestrator::{GenerationOrchestrator, GenerationOutput, DEFAULT_RETRIEVAL_LIMIT};
pub use parse::{decode_json, extract_json, DecodeResponse, ParseError};
pub use prompts::{frame_template, normalize_frame, AssembledPrompt, FrameTemplate, PromptAssembler};
pub use retrieval::{select_candidates, ContentKind, ContentRetriever, RetrievalError, RetrievalQuery, RetrievedContent};
pub use temperature::{ContentCategory, TemperaturePolicy};
pub use types::{
    Difficulty, Generated, GenerationRequest, Movement, MovementRegenerationParams, MovementScaffoldResult, Party,
    RefinementParams, RefinementResult, ScaffoldDraft, ScaffoldParams, ScaffoldResult, SceneExpansion,
    SceneExpansionParams, SceneSummary, SceneType, Tier, MAX_PARTY_LEVEL, MAX_PARTY_SIZE,
};

#[cfg(test)]
pub use retrieval::MockContentRetriever;
