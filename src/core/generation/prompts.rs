//! Prompt Assembly
//!
//! System prompts come from a frame + content-type table: each known frame
//! adds theming for outline work and for scene work on top of the generic
//! instructions for the content type. Unknown frames get the generic
//! instructions alone. User prompts are rendered from `{{name}}` templates.

use std::collections::HashMap;

use super::retrieval::{ContentKind, RetrievedContent};
use super::temperature::{ContentCategory, TemperaturePolicy};
use super::types::{GenerationRequest, Party, SceneSummary};
use crate::core::credits::OperationKind;
use crate::core::llm::{CompletionRequest, ResponseFormat};

// ============================================================================
// Frame Table
// ============================================================================

/// Theming for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTemplate {
    /// Normalized key, see [`normalize_frame`]
    pub key: &'static str,
    pub name: &'static str,
    /// Added to scaffold and movement prompts
    pub outline_theme: &'static str,
    /// Added to expansion and refinement prompts
    pub scene_theme: &'static str,
}

const FRAMES: &[FrameTemplate] = &[
    FrameTemplate {
        key: "witherwild",
        name: "The Witherwild",
        outline_theme: "The Witherwild is a continent overrun by a hostile, fast-growing wilderness. \
            Adventures revolve around reclaiming ground from the blight, protecting the last settlements \
            and uncovering what woke the wild. Favor journeys, shrinking safe havens and choices about \
            what to save.",
        scene_theme: "Describe overgrowth, rot and predatory plant life. Adversaries are often corrupted \
            beasts, thorned fey and desperate settlers. Loot leans toward living seeds, sap-bound relics \
            and salvaged tools.",
    },
    FrameTemplate {
        key: "age-of-umbra",
        name: "Age of Umbra",
        outline_theme: "Age of Umbra is a world after the fall of the gods, ruled by shadow and the \
            undying. Adventures are about survival, small acts of defiance and bargains with things that \
            should not be trusted. Keep hope scarce and costly.",
        scene_theme: "Use dim light, cold and silence. Adversaries include shades, hollowed knights and \
            cultists of the dark. Loot is rare, worn and often cursed.",
    },
    FrameTemplate {
        key: "five-banners-burning",
        name: "Five Banners Burning",
        outline_theme: "Five Banners Burning is a continent torn between five warring nations. \
            Adventures center on shifting loyalties, espionage, sieges and the people caught between \
            armies. Every faction should want something from the party.",
        scene_theme: "Show banners, supply lines, war camps and burned villages. Adversaries are soldiers, \
            spies and war machines. Loot includes orders, insignia and military gear.",
    },
];

/// Canonical key for a frame name: lowercase, leading "the" dropped,
/// non-alphanumeric runs collapsed to `-`.
pub fn normalize_frame(frame: &str) -> String {
    let lower = frame.trim().to_lowercase();
    let lower = lower.strip_prefix("the ").unwrap_or(&lower);

    let mut key = String::with_capacity(lower.len());
    for ch in lower.chars() {
        if ch.is_alphanumeric() {
            key.push(ch);
        } else if !key.is_empty() && !key.ends_with('-') {
            key.push('-');
        }
    }
    key.trim_end_matches('-').to_string()
}

pub fn frame_template(frame: &str) -> Option<&'static FrameTemplate> {
    let key = normalize_frame(frame);
    FRAMES.iter().find(|f| f.key == key)
}

// ============================================================================
// Generic Templates
// ============================================================================

const SCAFFOLD_SYSTEM: &str = "You are an expert Daggerheart game master who designs one-shot adventures. \
Produce an adventure outline: a title, a short pitch, and 3 to 5 movements that build toward a climax. \
Each movement has a title, a scene_type (one of combat, exploration, social, puzzle) and a two to four \
sentence description.";

const MOVEMENT_SYSTEM: &str = "You are an expert Daggerheart game master revising an adventure outline. \
Write one replacement movement that fits between the movements the user keeps. It needs a title, a \
scene_type (one of combat, exploration, social, puzzle) and a two to four sentence description.";

const EXPANSION_SYSTEM: &str = "You are an expert Daggerheart game master. Expand the outlined scene into \
table-ready content: read-aloud narration, the NPCs present with motives, adversaries with tactics, the \
environment and its features, and any loot. Keep continuity with the neighboring scenes. Answer in \
Markdown.";

const REFINEMENT_SYSTEM: &str = "You are an expert Daggerheart game master and editor. Rewrite the scene \
content according to the instruction. Change only what the instruction asks for and keep everything else, \
including names and continuity with the neighboring scenes. Answer with the full revised content in \
Markdown.";

const SCAFFOLD_FORMAT: &str = r#"Respond with a single JSON object and nothing else:
{"title": string, "description": string, "movements": [{"title": string, "scene_type": "combat"|"exploration"|"social"|"puzzle", "description": string}]}"#;

const MOVEMENT_FORMAT: &str = r#"Respond with a single JSON object and nothing else:
{"title": string, "scene_type": "combat"|"exploration"|"social"|"puzzle", "description": string}"#;

const SCAFFOLD_USER: &str = "Frame: {{frame}}
Focus: {{focus}}
Party: {{party}}
Difficulty: {{difficulty}}
Stakes: {{stakes}}";

const MOVEMENT_USER: &str = "Frame: {{frame}}
Focus: {{focus}}
Party: {{party}}
Difficulty: {{difficulty}}
Stakes: {{stakes}}

Movement to replace:
{{target}}

Movements to keep unchanged:
{{locked}}";

const EXPANSION_USER: &str = "Frame: {{frame}}
Party: {{party}}
Difficulty: {{difficulty}}

Scene to expand:
{{target}}
{{siblings}}{{retrieved}}";

const REFINEMENT_USER: &str = "Frame: {{frame}}

Scene:
{{target}}
{{siblings}}
Current content:
{{current_content}}

Instruction: {{instruction}}";

/// Single pass over the template: each `{{name}}` found in the template is
/// replaced with its value, unknown ones are dropped. Substituted values are
/// copied verbatim and never rescanned.
fn render(template: &str, variables: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        if let Some(value) = variables.get(&after[..end]) {
            out.push_str(value);
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

// ============================================================================
// Assembler
// ============================================================================

/// Output of [`PromptAssembler::build_prompt`]
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub response_format: ResponseFormat,
}

impl AssembledPrompt {
    pub fn into_request(self, max_tokens: Option<u32>) -> CompletionRequest {
        let request = CompletionRequest::new(self.system_prompt, self.user_prompt, self.temperature, self.response_format);
        match max_tokens {
            Some(max) => request.with_max_tokens(max),
            None => request,
        }
    }
}

/// Builds prompts. Pure: no I/O, no failure on valid requests.
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    policy: TemperaturePolicy,
}

impl PromptAssembler {
    pub fn new(policy: TemperaturePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TemperaturePolicy {
        &self.policy
    }

    /// Frame display name, falling back to the caller's spelling.
    fn frame_name(frame: &str) -> String {
        frame_template(frame)
            .map(|f| f.name.to_string())
            .unwrap_or_else(|| frame.trim().to_string())
    }

    pub fn system_prompt(&self, operation: OperationKind, frame: &str) -> String {
        let (base, format) = match operation {
            OperationKind::Scaffold => (SCAFFOLD_SYSTEM, Some(SCAFFOLD_FORMAT)),
            OperationKind::MovementRegeneration => (MOVEMENT_SYSTEM, Some(MOVEMENT_FORMAT)),
            OperationKind::SceneExpansion => (EXPANSION_SYSTEM, None),
            OperationKind::Refinement => (REFINEMENT_SYSTEM, None),
        };

        let mut prompt = base.to_string();
        if let Some(template) = frame_template(frame) {
            let theme = match operation {
                OperationKind::Scaffold | OperationKind::MovementRegeneration => template.outline_theme,
                OperationKind::SceneExpansion | OperationKind::Refinement => template.scene_theme,
            };
            prompt.push_str("\n\nSetting: ");
            prompt.push_str(template.name);
            prompt.push_str(". ");
            prompt.push_str(theme);
        }
        if let Some(format) = format {
            prompt.push_str("\n\n");
            prompt.push_str(format);
        }
        prompt
    }

    /// Assemble system prompt, user prompt and temperature for `request`.
    /// `retrieved` is only used by scene expansions.
    pub fn build_prompt(&self, request: &GenerationRequest, retrieved: &[RetrievedContent]) -> AssembledPrompt {
        let operation = request.operation();
        let system_prompt = self.system_prompt(operation, request.frame());
        let mut vars: HashMap<&str, String> = HashMap::new();
        vars.insert("frame", Self::frame_name(request.frame()));

        let (template, temperature, response_format) = match request {
            GenerationRequest::Scaffold(p) => {
                vars.insert("focus", p.focus.clone());
                vars.insert("party", describe_party(&p.party));
                vars.insert("difficulty", p.difficulty.as_str().to_string());
                vars.insert("stakes", p.stakes.clone());
                (
                    SCAFFOLD_USER,
                    self.policy.temperature_for(ContentCategory::ScaffoldGeneration),
                    ResponseFormat::Json,
                )
            }
            GenerationRequest::MovementRegeneration(p) => {
                vars.insert("focus", p.focus.clone());
                vars.insert("party", describe_party(&p.party));
                vars.insert("difficulty", p.difficulty.as_str().to_string());
                vars.insert("stakes", p.stakes.clone());
                vars.insert("target", describe_scene(&p.movement));
                let locked = if p.locked_movements.is_empty() {
                    "(none)".to_string()
                } else {
                    p.locked_movements.iter().map(describe_scene).collect::<Vec<_>>().join("\n")
                };
                vars.insert("locked", locked);
                (
                    MOVEMENT_USER,
                    self.policy.temperature_for(ContentCategory::ScaffoldGeneration),
                    ResponseFormat::Json,
                )
            }
            GenerationRequest::SceneExpansion(p) => {
                vars.insert("party", describe_party(&p.party));
                vars.insert("difficulty", p.difficulty.as_str().to_string());
                vars.insert("target", describe_scene(&p.scene));
                vars.insert("siblings", describe_siblings(p.previous_scene.as_ref(), p.next_scene.as_ref()));
                vars.insert("retrieved", describe_retrieved(retrieved));
                (
                    EXPANSION_USER,
                    self.policy.temperature_for_scene(p.scene.scene_type),
                    ResponseFormat::Text,
                )
            }
            GenerationRequest::Refinement(p) => {
                vars.insert("target", describe_scene(&p.scene));
                vars.insert("siblings", describe_siblings(p.previous_scene.as_ref(), p.next_scene.as_ref()));
                vars.insert("current_content", p.current_content.trim().to_string());
                vars.insert("instruction", p.instruction.trim().to_string());
                (
                    REFINEMENT_USER,
                    self.policy.temperature_for_scene(p.scene.scene_type),
                    ResponseFormat::Text,
                )
            }
        };

        AssembledPrompt {
            system_prompt,
            user_prompt: render(template, &vars),
            temperature,
            response_format,
        }
    }
}

fn describe_party(party: &Party) -> String {
    format!("{} characters, level {} (tier {})", party.size, party.level, party.tier())
}

fn describe_scene(scene: &SceneSummary) -> String {
    format!("- {} [{}]: {}", scene.title, scene.scene_type, scene.description.trim())
}

fn describe_siblings(previous: Option<&SceneSummary>, next: Option<&SceneSummary>) -> String {
    let mut out = String::new();
    if let Some(previous) = previous {
        out.push_str("\nPrevious scene:\n");
        out.push_str(&describe_scene(previous));
        out.push('\n');
    }
    if let Some(next) = next {
        out.push_str("\nNext scene:\n");
        out.push_str(&describe_scene(next));
        out.push('\n');
    }
    out
}

fn describe_retrieved(retrieved: &[RetrievedContent]) -> String {
    if retrieved.is_empty() {
        return String::new();
    }

    let mut out = String::from("\nDraw on these where they fit:\n");
    for kind in ContentKind::ALL {
        let items: Vec<_> = retrieved.iter().filter(|c| c.kind == kind).collect();
        if items.is_empty() {
            continue;
        }
        out.push_str(kind.heading());
        out.push_str(":\n");
        for item in items {
            out.push_str(&format!("- {} (tier {}): {}\n", item.name, item.tier, item.summary));
        }
    }
    out
}
