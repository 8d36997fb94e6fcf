/// Adventure Forge - generation core for TTRPG adventure building
///
/// Prompt assembly, response caching, credit metering and regeneration
/// limits for LLM-backed adventure scaffolds, scene expansions and
/// refinements.

pub mod config;
pub mod core;
pub mod database;

#[cfg(test)]
mod tests;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
