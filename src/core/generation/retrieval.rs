//! Content retrieval seam
//!
//! Scene expansions are grounded in tier-appropriate adversaries,
//! environments and loot fetched from an external vector search. Only the
//! contract lives here; ranking belongs to the search service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::{SceneType, Tier};

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Content search unavailable: {0}")]
    Unavailable(String),

    #[error("Content search failed: {0}")]
    Search(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Adversary,
    Environment,
    Loot,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [ContentKind::Adversary, ContentKind::Environment, ContentKind::Loot];

    pub fn heading(&self) -> &'static str {
        match self {
            ContentKind::Adversary => "Adversaries",
            ContentKind::Environment => "Environments",
            ContentKind::Loot => "Loot",
        }
    }
}

/// What to search for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub frame: String,
    pub scene_type: SceneType,
    /// Free text to match against, usually the scene description
    pub text: String,
    /// Results must be at or below this tier
    pub tier: Tier,
    /// Maximum candidates per kind
    pub limit: usize,
}

/// One ranked candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContent {
    pub kind: ContentKind,
    pub name: String,
    pub tier: Tier,
    pub summary: String,
    pub score: f32,
}

/// Ranked content search
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentRetriever: Send + Sync {
    async fn retrieve(&self, query: RetrievalQuery) -> Result<Vec<RetrievedContent>, RetrievalError>;
}

/// Drop candidates above the query tier and keep the best `limit` per kind,
/// highest score first. Guards against retrievers that ignore the filters.
pub fn select_candidates(query: &RetrievalQuery, mut candidates: Vec<RetrievedContent>) -> Vec<RetrievedContent> {
    candidates.retain(|c| c.tier <= query.tier);
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut selected = Vec::new();
    for kind in ContentKind::ALL {
        selected.extend(
            candidates
                .iter()
                .filter(|c| c.kind == kind)
                .take(query.limit)
                .cloned(),
        );
    }
    selected
}
