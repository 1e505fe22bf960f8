//! Compiling a round into a generation request.

use crate::block::response_schema;
use crate::persona::{PersonaProfile, WorldView};
use crate::scene::SceneType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// User turn sent when the director gives no command.
pub const DEFAULT_USER_CONTENT: &str = "Generate the next simulation block.";

/// Response MIME type for every request.
pub const JSON_MIME_TYPE: &str = gemini::JSON_MIME_TYPE;

/// Knobs for the closing directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Let the backend move the story along on its own when the command is thin.
    pub autonomous: bool,
    /// Language the narrative is written in.
    pub language: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            autonomous: true,
            language: "Traditional Chinese (Taiwan)".to_string(),
        }
    }
}

/// What gets sent to the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub system_instruction: String,
    pub user_content: String,
    pub response_mime_type: String,
    pub response_schema: Value,
}

impl GenerationRequest {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Builds system instructions from the world view and settings it was made with.
#[derive(Debug, Clone, Default)]
pub struct InstructionCompiler {
    world_view: WorldView,
    settings: GenerationSettings,
}

impl InstructionCompiler {
    pub fn new(world_view: WorldView, settings: GenerationSettings) -> Self {
        Self {
            world_view,
            settings,
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Assemble the request for one round.
    ///
    /// Only `personas` are described to the backend, so the caller controls
    /// prompt size through persona selection.
    pub fn compile(
        &self,
        scene: SceneType,
        sub_scene: &str,
        command: &str,
        personas: &[&PersonaProfile],
        relationship_digest: &str,
    ) -> GenerationRequest {
        let profiles = personas
            .iter()
            .map(|p| format!("{}: {} Speech: {}", p.id, p.traits, p.speech))
            .collect::<Vec<_>>()
            .join("\n");

        let scene_block = scene_instruction(scene, sub_scene).unwrap_or_default();

        let autonomy = if self.settings.autonomous {
            "AUTONOMOUS MODE: Progress the narrative naturally even if the command is brief.\n"
        } else {
            ""
        };

        let system_instruction = format!(
            r#"You are the 'BLUR GOD VIEW' Engine.
Worldview: {concept}.
Music style: {music_style}

## Profiles
{profiles}

## Current Relationships
{relationship_digest}

## Current Setting
{scene}
{scene_block}
{autonomy}Language: {language}."#,
            concept = self.world_view.concept,
            music_style = self.world_view.music_style,
            scene = scene.as_str(),
            language = self.settings.language,
        );

        let user_content = if command.trim().is_empty() {
            DEFAULT_USER_CONTENT.to_string()
        } else {
            command.to_string()
        };

        GenerationRequest {
            model: None,
            system_instruction,
            user_content,
            response_mime_type: JSON_MIME_TYPE.to_string(),
            response_schema: response_schema(),
        }
    }
}

/// The scene-specific block, if the scene has one.
fn scene_instruction(scene: SceneType, sub_scene: &str) -> Option<String> {
    let named = |fallback: Option<&'static str>| {
        if sub_scene.is_empty() {
            fallback.unwrap_or_default().to_string()
        } else {
            sub_scene.to_string()
        }
    };

    let block = match scene {
        SceneType::Stage => format!(
            r#"SCENE: MUSIC SHOW [{show}].
MANDATORY: Generate exactly 4 events in chronological order, one per phase, with content.stage_phase set to the bracketed label:
1. [待機室]: Interaction in the waiting room, makeup check.
2. [上台前]: Nerves, team chant, final mic check.
3. [舞台表演]: PERFORMANCE. Fill 'outfit', 'lighting', 'camera' (moves like Crane/Zoom) and 'choreography', and include 2 Killing Parts.
4. [下台後]: Exhaustion, group hug, staff feedback.
Keep the hosts' private lives out of it. Use show-style MC dialogue."#,
            show = named(scene.default_sub_scene()),
        ),
        SceneType::Variety => format!(
            r#"SCENE: VARIETY SHOW [{show}].
Give each member a variety persona (e.g. black hole, tsukkomi, energy saver).
Include 3 killing parts.
Use 'detail' for editing captions in brackets, like [字幕: 這是什麼靈魂畫作?]."#,
            show = named(scene.default_sub_scene()),
        ),
        SceneType::Forum => format!(
            r#"SCENE: FAN FORUM. Board: {board}.
Create one thread with a 'title', an anonymous author ID and a body.
Include 3-12 'replies', each written as one of: Rational, Shipper, Mom-fan, Hater, Passerby.
Set each reply's 'type' to fan, hater, neutral, shipper or mom_fan.
Reflect the current vibe and recent stage events."#,
            board = named(scene.default_sub_scene()),
        ),
        SceneType::Company => r#"SCENE: SM-style entertainment company. Area: hallway, manager's desk or meeting room.
Use generic staff roles (A&R, manager, room chief).
Show the workplace hierarchy and the pressure it puts on the members."#
            .to_string(),
        SceneType::GroupChat | SceneType::Dm => r#"SCENE: MOBILE MESSAGING.
STRICT RULE: Dialogue ONLY. Do not describe physical actions or inner thoughts.
Only pure text messages."#
            .to_string(),
        _ => return None,
    };

    Some(block)
}
