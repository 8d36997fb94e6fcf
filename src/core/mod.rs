pub mod logging;
pub mod llm;

// Generation pipeline: prompts, temperature policy, orchestration
pub mod generation;

// Metered and limited resources owned outside the orchestrator
pub mod cache;
pub mod credits;
pub mod regeneration;
