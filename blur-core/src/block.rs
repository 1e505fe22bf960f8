//! Simulation blocks: the structured story beats returned by the backend.
//!
//! The wire shape is a flat object of optional strings shared by every
//! scene. Internally each event's content is one variant of [`EventContent`],
//! chosen from the event type (and, for generic event types, from the fields
//! present), and written back out in the flat shape.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Errors from turning a backend body into a [`SimulationBlock`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("response is not valid JSON: {0}")]
    Parse(String),

    #[error("response violates the simulation schema: {0}")]
    Schema(String),
}

/// One generation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationBlock {
    pub session_id: String,
    pub scene: SceneDescriptor,
    pub events: Vec<SimulationEvent>,
}

impl SimulationBlock {
    /// Parse and validate a backend body.
    ///
    /// A Markdown code fence around the JSON is tolerated. Bodies that are
    /// not JSON fail with [`BlockError::Parse`]; JSON missing any required
    /// field fails with [`BlockError::Schema`].
    pub fn from_response(body: &str) -> Result<Self, BlockError> {
        let json = extract_json(body);
        let value: Value =
            serde_json::from_str(json).map_err(|e| BlockError::Parse(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| BlockError::Schema(e.to_string()))
    }

    /// Stage phases of the block's events, in order, for events that carry one.
    pub fn stage_phases(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match &event.content {
                EventContent::Stage(stage) => stage.phase.as_deref(),
                _ => None,
            })
            .collect()
    }
}

/// Where the block takes place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDescriptor {
    pub scene_id: String,
    pub scene_type: String,
    pub location_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_scene: Option<String>,
}

/// One atomic narrative beat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEvent", into = "RawEvent")]
pub struct SimulationEvent {
    pub event_id: String,
    pub ts: String,
    pub event_type: EventType,
    pub participants: Vec<String>,
    pub content: EventContent,
}

impl SimulationEvent {
    /// Whoever speaks in this beat, if anyone.
    pub fn speaker(&self) -> Option<&str> {
        self.content.base().speaker.as_deref()
    }
}

/// Kinds of narrative beat.
///
/// Values outside the known set are kept verbatim in [`EventType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    Message,
    Action,
    StageMoment,
    VarietyBeat,
    SceneChange,
    SystemNote,
    ForumPost,
    ForumReply,
    Other(String),
}

impl EventType {
    pub fn parse(value: &str) -> Self {
        match value {
            "message" => EventType::Message,
            "action" => EventType::Action,
            "stage_moment" => EventType::StageMoment,
            "variety_beat" => EventType::VarietyBeat,
            "scene_change" => EventType::SceneChange,
            "system_note" => EventType::SystemNote,
            "forum_post" => EventType::ForumPost,
            "forum_reply" => EventType::ForumReply,
            other => EventType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventType::Message => "message",
            EventType::Action => "action",
            EventType::StageMoment => "stage_moment",
            EventType::VarietyBeat => "variety_beat",
            EventType::SceneChange => "scene_change",
            EventType::SystemNote => "system_note",
            EventType::ForumPost => "forum_post",
            EventType::ForumReply => "forum_reply",
            EventType::Other(other) => other,
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        EventType::parse(&value)
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four phases of a music-show stage, in broadcast order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StagePhase {
    WaitingRoom,
    BeforeStage,
    Performance,
    AfterStage,
}

impl StagePhase {
    pub const ORDER: [StagePhase; 4] = [
        StagePhase::WaitingRoom,
        StagePhase::BeforeStage,
        StagePhase::Performance,
        StagePhase::AfterStage,
    ];

    /// The label used on the wire and in instructions.
    pub fn label(&self) -> &'static str {
        match self {
            StagePhase::WaitingRoom => "待機室",
            StagePhase::BeforeStage => "上台前",
            StagePhase::Performance => "舞台表演",
            StagePhase::AfterStage => "下台後",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        Self::ORDER.into_iter().find(|phase| phase.label() == label.trim())
    }
}

/// Who a forum reply is written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyPersona {
    Fan,
    Hater,
    Neutral,
    Shipper,
    MomFan,
}

impl ReplyPersona {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "fan" => Some(ReplyPersona::Fan),
            "hater" => Some(ReplyPersona::Hater),
            "neutral" => Some(ReplyPersona::Neutral),
            "shipper" => Some(ReplyPersona::Shipper),
            "mom_fan" => Some(ReplyPersona::MomFan),
            _ => None,
        }
    }
}

/// A reply under a forum thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ForumReply {
    pub fn persona(&self) -> Option<ReplyPersona> {
        self.kind.as_deref().and_then(ReplyPersona::parse)
    }
}

/// Fields every content variant shares.
///
/// `extras` holds content fields the variant has no slot for (a `detail` on
/// a stage beat, a `mood`, anything unknown). They are written back out
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Utterance {
    pub speaker: Option<String>,
    pub text: Option<String>,
    pub action: Option<String>,
    pub extras: Map<String, Value>,
}

/// A performance beat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageContent {
    pub base: Utterance,
    pub phase: Option<String>,
    pub outfit: Option<String>,
    pub lighting: Option<String>,
    pub camera: Option<String>,
    pub choreography: Option<String>,
}

impl StageContent {
    pub fn stage_phase(&self) -> Option<StagePhase> {
        self.phase.as_deref().and_then(StagePhase::parse)
    }
}

/// A variety-show beat; `caption` holds the bracketed editing caption.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarietyContent {
    pub base: Utterance,
    pub persona: Option<String>,
    pub caption: Option<String>,
}

/// A company beat; `note` is the workplace aside.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkplaceContent {
    pub base: Utterance,
    pub note: Option<String>,
}

/// A forum thread or reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForumContent {
    pub base: Utterance,
    pub title: Option<String>,
    pub board: Option<String>,
    pub replies: Vec<ForumReply>,
}

/// Scene-specific payload of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventContent {
    Dialogue(Utterance),
    Stage(StageContent),
    Variety(VarietyContent),
    Workplace(WorkplaceContent),
    Forum(ForumContent),
}

impl EventContent {
    pub fn base(&self) -> &Utterance {
        match self {
            EventContent::Dialogue(base) => base,
            EventContent::Stage(stage) => &stage.base,
            EventContent::Variety(variety) => &variety.base,
            EventContent::Workplace(workplace) => &workplace.base,
            EventContent::Forum(forum) => &forum.base,
        }
    }

    fn base_mut(&mut self) -> &mut Utterance {
        match self {
            EventContent::Dialogue(base) => base,
            EventContent::Stage(stage) => &mut stage.base,
            EventContent::Variety(variety) => &mut variety.base,
            EventContent::Workplace(workplace) => &mut workplace.base,
            EventContent::Forum(forum) => &mut forum.base,
        }
    }

    /// Pick the variant and move its fields out of `raw`. Whatever the
    /// variant leaves behind lands in [`Utterance::extras`].
    fn classify(event_type: &EventType, mut raw: RawContent) -> Self {
        let has_stage = raw.stage_phase.is_some()
            || raw.outfit.is_some()
            || raw.lighting.is_some()
            || raw.camera.is_some()
            || raw.choreography.is_some();
        let has_forum = raw.title.is_some() || raw.board.is_some() || raw.replies.is_some();

        let stage = |raw: &mut RawContent| {
            EventContent::Stage(StageContent {
                phase: raw.stage_phase.take(),
                outfit: raw.outfit.take(),
                lighting: raw.lighting.take(),
                camera: raw.camera.take(),
                choreography: raw.choreography.take(),
                ..StageContent::default()
            })
        };
        let forum = |raw: &mut RawContent| {
            EventContent::Forum(ForumContent {
                title: raw.title.take(),
                board: raw.board.take(),
                replies: raw.replies.take().unwrap_or_default(),
                ..ForumContent::default()
            })
        };
        let variety = |raw: &mut RawContent| {
            EventContent::Variety(VarietyContent {
                persona: raw.variety_persona.take(),
                caption: raw.detail.take(),
                ..VarietyContent::default()
            })
        };

        let mut content = match event_type {
            EventType::StageMoment => stage(&mut raw),
            EventType::VarietyBeat => variety(&mut raw),
            EventType::ForumPost | EventType::ForumReply => forum(&mut raw),
            _ if has_stage => stage(&mut raw),
            _ if has_forum => forum(&mut raw),
            _ if raw.variety_persona.is_some() => variety(&mut raw),
            _ if raw.detail.is_some() => EventContent::Workplace(WorkplaceContent {
                note: raw.detail.take(),
                ..WorkplaceContent::default()
            }),
            _ => EventContent::Dialogue(Utterance::default()),
        };

        *content.base_mut() = Utterance {
            speaker: raw.speaker.take(),
            text: raw.text.take(),
            action: raw.action.take(),
            extras: raw.into_extras(),
        };
        content
    }

    fn into_raw(self) -> RawContent {
        let with_base = |base: Utterance| RawContent {
            speaker: base.speaker,
            text: base.text,
            action: base.action,
            other: base.extras,
            ..RawContent::default()
        };
        match self {
            EventContent::Dialogue(base) => with_base(base),
            EventContent::Stage(stage) => RawContent {
                stage_phase: stage.phase,
                outfit: stage.outfit,
                lighting: stage.lighting,
                camera: stage.camera,
                choreography: stage.choreography,
                ..with_base(stage.base)
            },
            EventContent::Variety(variety) => RawContent {
                variety_persona: variety.persona,
                detail: variety.caption,
                ..with_base(variety.base)
            },
            EventContent::Workplace(workplace) => RawContent {
                detail: workplace.note,
                ..with_base(workplace.base)
            },
            EventContent::Forum(forum) => RawContent {
                title: forum.title,
                board: forum.board,
                replies: if forum.replies.is_empty() {
                    None
                } else {
                    Some(forum.replies)
                },
                ..with_base(forum.base)
            },
        }
    }
}

// ============================================================================
// Wire shape
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    event_id: String,
    ts: String,
    event_type: String,
    participants: Vec<String>,
    content: RawContent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outfit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lighting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    camera: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    choreography: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stage_phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    variety_persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    board: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    replies: Option<Vec<ForumReply>>,
    #[serde(flatten)]
    other: Map<String, Value>,
}

impl RawContent {
    /// The fields still set, as a JSON object.
    fn into_extras(self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

impl From<RawEvent> for SimulationEvent {
    fn from(raw: RawEvent) -> Self {
        let event_type = EventType::parse(&raw.event_type);
        let content = EventContent::classify(&event_type, raw.content);
        Self {
            event_id: raw.event_id,
            ts: raw.ts,
            event_type,
            participants: raw.participants,
            content,
        }
    }
}

impl From<SimulationEvent> for RawEvent {
    fn from(event: SimulationEvent) -> Self {
        Self {
            event_id: event.event_id,
            ts: event.ts,
            event_type: event.event_type.into(),
            participants: event.participants,
            content: event.content.into_raw(),
        }
    }
}

/// The response contract sent with every generation request.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "sessionId": { "type": "STRING" },
            "scene": {
                "type": "OBJECT",
                "properties": {
                    "sceneId": { "type": "STRING" },
                    "sceneType": { "type": "STRING" },
                    "locationLabel": { "type": "STRING" },
                    "subScene": { "type": "STRING" }
                },
                "required": ["sceneId", "sceneType", "locationLabel"]
            },
            "events": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "eventId": { "type": "STRING" },
                        "ts": { "type": "STRING" },
                        "eventType": { "type": "STRING" },
                        "participants": { "type": "ARRAY", "items": { "type": "STRING" } },
                        "content": {
                            "type": "OBJECT",
                            "properties": {
                                "speaker": { "type": "STRING" },
                                "text": { "type": "STRING" },
                                "action": { "type": "STRING" },
                                "outfit": { "type": "STRING" },
                                "lighting": { "type": "STRING" },
                                "camera": { "type": "STRING" },
                                "choreography": { "type": "STRING" },
                                "stage_phase": { "type": "STRING" },
                                "detail": { "type": "STRING" },
                                "title": { "type": "STRING" },
                                "board": { "type": "STRING" },
                                "replies": {
                                    "type": "ARRAY",
                                    "items": {
                                        "type": "OBJECT",
                                        "properties": {
                                            "id": { "type": "STRING" },
                                            "author": { "type": "STRING" },
                                            "text": { "type": "STRING" },
                                            "type": { "type": "STRING" }
                                        }
                                    }
                                }
                            }
                        }
                    },
                    "required": ["eventId", "ts", "eventType", "participants", "content"]
                }
            }
        },
        "required": ["sessionId", "scene", "events"]
    })
}

/// Extract JSON from a response that might be wrapped in a Markdown code block.
///
/// Only a fence that encloses the whole body is stripped; backticks inside
/// JSON strings are left alone.
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    let Some(inner) = text
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return text;
    };

    // Drop the language tag on the opening line, if any
    match inner.split_once('\n') {
        Some((tag, body)) if !tag.trim_start().starts_with(['{', '[']) => body.trim(),
        _ => inner.trim(),
    }
}
