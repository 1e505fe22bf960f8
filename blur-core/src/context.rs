//! Context keys: which narrative thread a request belongs to.

use crate::scene::SceneType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of direct-message thread keys.
pub const DM_PREFIX: &str = "dm:";

/// Separator between the sorted participants of a direct-message key.
pub const DM_SEPARATOR: &str = "-";

/// Names one independent narrative thread and its history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextKey(String);

impl ContextKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this key names a direct-message thread.
    pub fn is_direct_message(&self) -> bool {
        self.0.starts_with(DM_PREFIX)
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Derive the thread a request belongs to.
///
/// Direct-message threads are keyed by their participants, sorted so that
/// selection order never splits one conversation into two. Every other scene
/// is keyed by its sub-scene label, or by the scene type when none is active.
pub fn resolve<S: AsRef<str>>(
    scene: SceneType,
    sub_scene: &str,
    participants: &[S],
) -> ContextKey {
    if scene.is_direct_message() {
        let mut ids: Vec<&str> = participants.iter().map(AsRef::as_ref).collect();
        ids.sort_unstable();
        return ContextKey(format!("{DM_PREFIX}{}", ids.join(DM_SEPARATOR)));
    }

    if sub_scene.is_empty() {
        ContextKey(scene.as_str().to_string())
    } else {
        ContextKey(sub_scene.to_string())
    }
}

/// The two-person picker used to open direct-message threads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantSelection {
    selected: Vec<String>,
}

impl ParticipantSelection {
    /// How many participants a direct-message thread holds.
    pub const CAPACITY: usize = 2;

    pub fn new<S: Into<String>>(ids: impl IntoIterator<Item = S>) -> Self {
        let mut selection = Self::default();
        for id in ids {
            selection.toggle(id);
        }
        selection
    }

    /// Deselect `id` if selected; otherwise select it, dropping the oldest
    /// selection when the picker is full.
    pub fn toggle(&mut self, id: impl Into<String>) {
        let id = id.into();
        if let Some(pos) = self.selected.iter().position(|s| *s == id) {
            self.selected.remove(pos);
            return;
        }
        if self.selected.len() >= Self::CAPACITY {
            self.selected.remove(0);
        }
        self.selected.push(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.selected.iter().any(|s| s == id)
    }

    pub fn ids(&self) -> &[String] {
        &self.selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dm_key_is_order_independent() {
        let a = resolve(SceneType::Dm, "", &["RAHI", "Chloe"]);
        let b = resolve(SceneType::Dm, "", &["Chloe", "RAHI"]);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "dm:Chloe-RAHI");
        assert!(a.is_direct_message());
    }

    #[test]
    fn test_dm_key_ignores_sub_scene() {
        let key = resolve(SceneType::Dm, "M Countdown", &["Sera", "Nanae"]);
        assert_eq!(key.as_str(), "dm:Nanae-Sera");
    }

    #[test]
    fn test_sub_scene_wins_over_scene_type() {
        let key = resolve(SceneType::Stage, "M Countdown", &["Chloe", "RAHI"]);
        assert_eq!(key.as_str(), "M Countdown");
    }

    #[test]
    fn test_scene_type_fallback() {
        let none: [&str; 0] = [];
        assert_eq!(resolve(SceneType::Dorm, "", &none).as_str(), "dorm");
        assert_eq!(
            resolve(SceneType::GroupChat, "", &["Chloe"]).as_str(),
            "group_chat"
        );
    }

    #[test]
    fn test_selection_rotates_oldest_out() {
        let mut selection = ParticipantSelection::new(["Chloe", "RAHI"]);
        selection.toggle("Sera");
        assert_eq!(selection.ids(), ["RAHI", "Sera"]);

        selection.toggle("RAHI");
        assert_eq!(selection.ids(), ["Sera"]);

        selection.toggle("Nanae");
        assert_eq!(selection.ids(), ["Sera", "Nanae"]);
        assert!(selection.contains("Nanae"));
    }
}
