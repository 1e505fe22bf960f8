//! Character profiles and the selector that decides which of them a round sees.

use crate::block::SimulationEvent;
use crate::scene::SceneType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How many of the most recent events a session hands the selector by default.
pub const HISTORY_WINDOW: usize = 20;

/// A fixed fictional character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaProfile {
    /// Identifier, also the name used as speaker and participant.
    pub id: String,
    pub role: String,
    pub traits: String,
    pub speech: String,
    /// One-line summary of where this persona stands with the others.
    pub relationship: String,
}

impl PersonaProfile {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            traits: String::new(),
            speech: String::new(),
            relationship: String::new(),
        }
    }

    pub fn with_traits(mut self, traits: impl Into<String>) -> Self {
        self.traits = traits.into();
        self
    }

    pub fn with_speech(mut self, speech: impl Into<String>) -> Self {
        self.speech = speech.into();
        self
    }

    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = relationship.into();
        self
    }
}

/// The world the personas live in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldView {
    pub concept: String,
    pub music_style: String,
}

impl Default for WorldView {
    fn default() -> Self {
        Self {
            concept: "夢幻、空靈、優雅、黑暗、反叛".to_string(),
            music_style: "「空靈的叛亂」：古典架構揉合工業噪音。".to_string(),
        }
    }
}

/// All personas, in canonical order. Fixed once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaRoster {
    profiles: Vec<PersonaProfile>,
}

impl PersonaRoster {
    /// Build a roster; later profiles with an already-used id are ignored.
    pub fn new(profiles: Vec<PersonaProfile>) -> Self {
        let mut seen = HashSet::new();
        let profiles = profiles
            .into_iter()
            .filter(|p| seen.insert(p.id.clone()))
            .collect();
        Self { profiles }
    }

    /// The five members of BLUR.
    pub fn blur() -> Self {
        Self::new(vec![
            PersonaProfile::new("Chloe", "Rapper / Vocal")
                .with_traits("高冷臉、語速極快、邏輯強、遊戲大神。")
                .with_speech("語速快、激動時冒韓語。")
                .with_relationship("最黏 RAHI。"),
            PersonaProfile::new("Nanae", "主舞")
                .with_traits("172cm、舞台霸氣下台省電、呆萌 lag。")
                .with_speech("慢半拍、呆萌。")
                .with_relationship("被全體寵愛。"),
            PersonaProfile::new("Yeongri", "隊長 / 門面")
                .with_traits("175cm、效率控、軍隊式管理、怕鬼。")
                .with_speech("命令式、簡短有力。")
                .with_relationship("守護 Sera。"),
            PersonaProfile::new("RAHI", "忙內 / Rap")
                .with_traits("14歲巨型寶寶、惡作劇之王、四次元。")
                .with_speech("mumbling rap。")
                .with_relationship("逆子忙內。"),
            PersonaProfile::new("Sera", "大姐 / Vocal")
                .with_traits("溫柔堅韌、眼淚女王、香菜愛好者。")
                .with_speech("感性、溫柔。")
                .with_relationship("照顧大家情緒。"),
        ])
    }

    pub fn ids(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&PersonaProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// Profiles for `ids`, in the order given, skipping unknown ids.
    pub fn profiles_for<S: AsRef<str>>(&self, ids: &[S]) -> Vec<&PersonaProfile> {
        ids.iter().filter_map(|id| self.get(id.as_ref())).collect()
    }

    pub fn profiles(&self) -> &[PersonaProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for PersonaRoster {
    fn default() -> Self {
        Self::blur()
    }
}

/// Persona budget for a scene when the caller doesn't set one.
pub fn default_limit(scene: SceneType) -> usize {
    match scene {
        SceneType::Dm => 3,
        SceneType::GroupChat => 6,
        SceneType::Stage | SceneType::Variety => 8,
        _ => 6,
    }
}

/// Pick the personas a round is generated with.
///
/// `recent` is the slice of history to consider; callers cut it to their
/// window (see [`HISTORY_WINDOW`]). Whoever appears there comes first, in
/// order of first appearance (each event's participants, then its speaker).
/// The rest of the budget is filled from `all_ids` in canonical order, which
/// also covers a thread with no history yet. The result never holds
/// duplicates or ids outside `all_ids`, and is never longer than the limit.
/// A limit of zero is treated as one.
pub fn select_personas<S: AsRef<str>>(
    scene: SceneType,
    recent: &[SimulationEvent],
    all_ids: &[S],
    limit: Option<usize>,
) -> Vec<String> {
    let limit = limit.unwrap_or_else(|| default_limit(scene)).max(1);

    let mut canonical: Vec<&str> = Vec::with_capacity(all_ids.len());
    for id in all_ids.iter().map(AsRef::as_ref) {
        if !canonical.contains(&id) {
            canonical.push(id);
        }
    }

    let mut selected: Vec<String> = Vec::with_capacity(limit.min(canonical.len()));
    let consider = |id: &str, selected: &mut Vec<String>| {
        if selected.len() < limit && canonical.contains(&id) && !selected.iter().any(|s| s == id)
        {
            selected.push(id.to_string());
        }
    };

    for event in recent {
        for participant in &event.participants {
            consider(participant, &mut selected);
        }
        if let Some(speaker) = event.speaker() {
            consider(speaker, &mut selected);
        }
    }

    for id in &canonical {
        if selected.len() >= limit {
            break;
        }
        if !selected.iter().any(|s| s == id) {
            selected.push((*id).to_string());
        }
    }

    selected
}
