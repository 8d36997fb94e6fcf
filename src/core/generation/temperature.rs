//! Temperature Policy
//!
//! The single table of sampling temperatures. Every prompt resolves its
//! temperature here by content category; no call site carries its own
//! constant.

use serde::{Deserialize, Serialize};

use super::types::SceneType;

/// Content categories with a distinct sampling temperature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    /// Adventure outlines and movement scaffolds
    ScaffoldGeneration,
    CombatEncounters,
    NpcDialogue,
    /// Exploration and puzzle narration
    Descriptions,
    /// Stat blocks, DCs and other rules text
    MechanicalElements,
}

impl ContentCategory {
    /// Parse a category label. Returns `None` for labels outside the table.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "scaffold" | "scaffold_generation" => Some(Self::ScaffoldGeneration),
            "combat" | "combat_encounters" => Some(Self::CombatEncounters),
            "social" | "npc_dialogue" => Some(Self::NpcDialogue),
            "exploration" | "puzzle" | "descriptions" => Some(Self::Descriptions),
            "mechanics" | "mechanical_elements" => Some(Self::MechanicalElements),
            _ => None,
        }
    }
}

impl From<SceneType> for ContentCategory {
    fn from(scene_type: SceneType) -> Self {
        match scene_type {
            SceneType::Combat => ContentCategory::CombatEncounters,
            SceneType::Social => ContentCategory::NpcDialogue,
            SceneType::Exploration | SceneType::Puzzle => ContentCategory::Descriptions,
        }
    }
}

/// Category to temperature mapping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperaturePolicy {
    pub scaffold_generation: f32,
    pub combat_encounters: f32,
    pub npc_dialogue: f32,
    pub descriptions: f32,
    pub mechanical_elements: f32,
}

impl Default for TemperaturePolicy {
    fn default() -> Self {
        Self {
            scaffold_generation: 0.75,
            combat_encounters: 0.5,
            npc_dialogue: 0.9,
            descriptions: 0.8,
            mechanical_elements: 0.3,
        }
    }
}

impl TemperaturePolicy {
    pub fn temperature_for(&self, category: ContentCategory) -> f32 {
        match category {
            ContentCategory::ScaffoldGeneration => self.scaffold_generation,
            ContentCategory::CombatEncounters => self.combat_encounters,
            ContentCategory::NpcDialogue => self.npc_dialogue,
            ContentCategory::Descriptions => self.descriptions,
            ContentCategory::MechanicalElements => self.mechanical_elements,
        }
    }

    /// Temperature for a free-form category label. Unrecognized labels use
    /// the scaffold temperature.
    pub fn temperature_for_label(&self, label: &str) -> f32 {
        match ContentCategory::from_label(label) {
            Some(category) => self.temperature_for(category),
            None => self.scaffold_generation,
        }
    }

    pub fn temperature_for_scene(&self, scene_type: SceneType) -> f32 {
        self.temperature_for(scene_type.into())
    }
}
