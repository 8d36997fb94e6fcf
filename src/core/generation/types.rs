//! Generation request and result types

use serde::{Deserialize, Serialize};

use crate::core::credits::OperationKind;
use crate::core::regeneration::RegenerationUsage;

// ============================================================================
// Shared Parameters
// ============================================================================

pub const MAX_PARTY_SIZE: u8 = 8;
pub const MAX_PARTY_LEVEL: u8 = 10;

/// Kind of beat a scene or movement represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneType {
    Combat,
    Exploration,
    Social,
    Puzzle,
}

impl SceneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneType::Combat => "combat",
            SceneType::Exploration => "exploration",
            SceneType::Social => "social",
            SceneType::Puzzle => "puzzle",
        }
    }
}

impl std::fmt::Display for SceneType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Standard,
    Hard,
    Deadly,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Standard => "standard",
            Difficulty::Hard => "hard",
            Difficulty::Deadly => "deadly",
        }
    }
}

/// Power band derived from party level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tier(pub u8);

impl Tier {
    /// 1 -> 1, 2..=4 -> 2, 5..=7 -> 3, 8 and up -> 4
    pub fn from_level(level: u8) -> Self {
        match level {
            0 | 1 => Tier(1),
            2..=4 => Tier(2),
            5..=7 => Tier(3),
            _ => Tier(4),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Party composition used by every prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Party {
    pub size: u8,
    pub level: u8,
}

impl Party {
    pub fn new(size: u8, level: u8) -> Self {
        Self { size, level }
    }

    pub fn tier(&self) -> Tier {
        Tier::from_level(self.level)
    }

    fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_PARTY_SIZE).contains(&self.size) {
            return Err(format!("party size must be between 1 and {MAX_PARTY_SIZE}, got {}", self.size));
        }
        if !(1..=MAX_PARTY_LEVEL).contains(&self.level) {
            return Err(format!("party level must be between 1 and {MAX_PARTY_LEVEL}, got {}", self.level));
        }
        Ok(())
    }
}

/// One scene or movement as it appears in a scaffold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneSummary {
    pub id: String,
    pub title: String,
    pub scene_type: SceneType,
    pub description: String,
}

impl SceneSummary {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        scene_type: SceneType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            scene_type,
            description: description.into(),
        }
    }

    fn validate(&self, field: &str) -> Result<(), String> {
        require(&self.id, &format!("{field}.id"))?;
        require(&self.title, &format!("{field}.title"))
    }
}

fn require(value: &str, field: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} must not be empty"))
    } else {
        Ok(())
    }
}

// ============================================================================
// Request Parameters
// ============================================================================

/// Initial scaffold generation, or a full scaffold regeneration when
/// `adventure_id` names an existing adventure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaffoldParams {
    pub user_id: String,
    #[serde(default)]
    pub adventure_id: Option<String>,
    pub frame: String,
    pub focus: String,
    pub party: Party,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub stakes: String,
}

impl ScaffoldParams {
    pub fn validate(&self) -> Result<(), String> {
        require(&self.user_id, "user_id")?;
        require(&self.frame, "frame")?;
        require(&self.focus, "focus")?;
        if let Some(id) = &self.adventure_id {
            require(id, "adventure_id")?;
        }
        self.party.validate()
    }
}

/// Full content for one scene of an existing scaffold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneExpansionParams {
    pub user_id: String,
    pub adventure_id: String,
    pub frame: String,
    pub party: Party,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub scene: SceneSummary,
    #[serde(default)]
    pub previous_scene: Option<SceneSummary>,
    #[serde(default)]
    pub next_scene: Option<SceneSummary>,
    /// Re-expanding a scene that was expanded before; draws on the
    /// expansion budget
    #[serde(default)]
    pub regenerate: bool,
}

impl SceneExpansionParams {
    pub fn validate(&self) -> Result<(), String> {
        require(&self.user_id, "user_id")?;
        require(&self.adventure_id, "adventure_id")?;
        require(&self.frame, "frame")?;
        self.party.validate()?;
        self.scene.validate("scene")
    }
}

/// Instruction-driven rewrite of expanded scene content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementParams {
    pub user_id: String,
    pub adventure_id: String,
    pub frame: String,
    pub scene: SceneSummary,
    pub current_content: String,
    pub instruction: String,
    #[serde(default)]
    pub previous_scene: Option<SceneSummary>,
    #[serde(default)]
    pub next_scene: Option<SceneSummary>,
}

impl RefinementParams {
    pub fn validate(&self) -> Result<(), String> {
        require(&self.user_id, "user_id")?;
        require(&self.adventure_id, "adventure_id")?;
        require(&self.frame, "frame")?;
        self.scene.validate("scene")?;
        require(&self.current_content, "current_content")?;
        require(&self.instruction, "instruction")
    }
}

/// Replace one movement of a scaffold, keeping the locked ones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRegenerationParams {
    pub user_id: String,
    pub adventure_id: String,
    pub frame: String,
    pub focus: String,
    pub party: Party,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub stakes: String,
    pub movement: SceneSummary,
    #[serde(default)]
    pub locked_movements: Vec<SceneSummary>,
}

impl MovementRegenerationParams {
    pub fn validate(&self) -> Result<(), String> {
        require(&self.user_id, "user_id")?;
        require(&self.adventure_id, "adventure_id")?;
        require(&self.frame, "frame")?;
        require(&self.focus, "focus")?;
        self.party.validate()?;
        self.movement.validate("movement")?;
        for (i, locked) in self.locked_movements.iter().enumerate() {
            locked.validate(&format!("locked_movements[{i}]"))?;
        }
        Ok(())
    }
}

/// A generation request of any kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationRequest {
    Scaffold(ScaffoldParams),
    SceneExpansion(SceneExpansionParams),
    Refinement(RefinementParams),
    MovementRegeneration(MovementRegenerationParams),
}

impl GenerationRequest {
    pub fn operation(&self) -> OperationKind {
        match self {
            GenerationRequest::Scaffold(_) => OperationKind::Scaffold,
            GenerationRequest::SceneExpansion(_) => OperationKind::SceneExpansion,
            GenerationRequest::Refinement(_) => OperationKind::Refinement,
            GenerationRequest::MovementRegeneration(_) => OperationKind::MovementRegeneration,
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            GenerationRequest::Scaffold(p) => &p.user_id,
            GenerationRequest::SceneExpansion(p) => &p.user_id,
            GenerationRequest::Refinement(p) => &p.user_id,
            GenerationRequest::MovementRegeneration(p) => &p.user_id,
        }
    }

    /// Existing adventure targeted by the request; `None` for a new scaffold.
    pub fn adventure_id(&self) -> Option<&str> {
        match self {
            GenerationRequest::Scaffold(p) => p.adventure_id.as_deref(),
            GenerationRequest::SceneExpansion(p) => Some(&p.adventure_id),
            GenerationRequest::Refinement(p) => Some(&p.adventure_id),
            GenerationRequest::MovementRegeneration(p) => Some(&p.adventure_id),
        }
    }

    pub fn frame(&self) -> &str {
        match self {
            GenerationRequest::Scaffold(p) => &p.frame,
            GenerationRequest::SceneExpansion(p) => &p.frame,
            GenerationRequest::Refinement(p) => &p.frame,
            GenerationRequest::MovementRegeneration(p) => &p.frame,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            GenerationRequest::Scaffold(p) => p.validate(),
            GenerationRequest::SceneExpansion(p) => p.validate(),
            GenerationRequest::Refinement(p) => p.validate(),
            GenerationRequest::MovementRegeneration(p) => p.validate(),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// One movement as returned by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub title: String,
    pub scene_type: SceneType,
    pub description: String,
}

/// Adventure outline as returned by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaffoldDraft {
    pub title: String,
    pub description: String,
    pub movements: Vec<Movement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaffoldResult {
    pub adventure_id: String,
    pub scaffold: ScaffoldDraft,
    /// Present when this call was a regeneration
    pub regeneration: Option<RegenerationUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementScaffoldResult {
    pub adventure_id: String,
    /// Id of the movement being replaced
    pub movement_id: String,
    pub movement: Movement,
    pub regeneration: RegenerationUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneExpansion {
    pub adventure_id: String,
    pub scene_id: String,
    pub content: String,
    pub regeneration: Option<RegenerationUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementResult {
    pub adventure_id: String,
    pub scene_id: String,
    pub content: String,
    pub regeneration: RegenerationUsage,
}

/// Envelope returned by every orchestrator operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generated<T> {
    pub output: T,
    /// Served from the response cache; still billed
    pub cache_hit: bool,
    pub credits_remaining: i64,
}

impl<T> Generated<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Generated<U> {
        Generated {
            output: f(self.output),
            cache_hit: self.cache_hit,
            credits_remaining: self.credits_remaining,
        }
    }
}
