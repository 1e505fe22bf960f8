//! Scene types and the sub-scene catalogues offered for each.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Weekly music shows a stage scene can take place on.
pub const MUSIC_SHOWS: &[&str] = &[
    "M Countdown",
    "Music Bank",
    "Inkigayo",
    "Show! Music Core",
    "Show Champion",
];

/// Variety programmes a variety scene can take place on.
pub const VARIETY_SHOWS: &[&str] = &[
    "Running Man",
    "Knowing Bros",
    "Amazing Saturday",
    "I Live Alone",
    "Radio Star",
    "2 Days & 1 Night",
    "King of Mask Singer",
    "Weekly Idol",
    "Idol Human Theater",
    "MMTG",
    "Yoo Quiz on the Block",
    "The Manager",
];

/// Fan forum boards a forum scene can be posted to.
pub const FORUM_BOARDS: &[&str] = &[
    "回歸討論",
    "舞台截圖/彩蛋分析",
    "成員關係學/互動糖點",
    "謠言澄清",
    "路人感想",
    "搞笑meme/梗圖",
];

/// Where a narrative round takes place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneType {
    GroupChat,
    Dm,
    PracticeRoom,
    Dorm,
    Stage,
    Variety,
    Company,
    Studio,
    Forum,
    RelationshipMap,
}

impl SceneType {
    /// Every scene type, in menu order.
    pub const ALL: [SceneType; 10] = [
        SceneType::GroupChat,
        SceneType::Dm,
        SceneType::PracticeRoom,
        SceneType::Dorm,
        SceneType::Stage,
        SceneType::Variety,
        SceneType::Company,
        SceneType::Studio,
        SceneType::Forum,
        SceneType::RelationshipMap,
    ];

    /// The wire name, also used as the context key of scenes without a sub-scene.
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneType::GroupChat => "group_chat",
            SceneType::Dm => "dm",
            SceneType::PracticeRoom => "practice_room",
            SceneType::Dorm => "dorm",
            SceneType::Stage => "stage",
            SceneType::Variety => "variety",
            SceneType::Company => "company",
            SceneType::Studio => "studio",
            SceneType::Forum => "forum",
            SceneType::RelationshipMap => "relationship_map",
        }
    }

    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            SceneType::GroupChat => "團體聊天室",
            SceneType::Dm => "私密監控",
            SceneType::PracticeRoom => "練習室",
            SceneType::Dorm => "宿舍",
            SceneType::Stage => "打歌舞台",
            SceneType::Variety => "綜藝節目",
            SceneType::Company => "經紀公司",
            SceneType::Studio => "錄音室",
            SceneType::Forum => "粉絲論壇",
            SceneType::RelationshipMap => "關係圖譜",
        }
    }

    /// Direct-message threads are keyed by their participants rather than a label.
    pub fn is_direct_message(&self) -> bool {
        matches!(self, SceneType::Dm)
    }

    /// Sub-scenes the front end offers for this scene.
    pub fn sub_scene_options(&self) -> &'static [&'static str] {
        match self {
            SceneType::Stage => MUSIC_SHOWS,
            SceneType::Variety => VARIETY_SHOWS,
            SceneType::Forum => FORUM_BOARDS,
            _ => &[],
        }
    }

    /// The sub-scene assumed in instructions when none is selected.
    pub fn default_sub_scene(&self) -> Option<&'static str> {
        match self {
            SceneType::Stage => Some("M Countdown"),
            SceneType::Variety => Some("Weekly Idol"),
            SceneType::Forum => Some("回歸討論"),
            _ => None,
        }
    }
}

impl fmt::Display for SceneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unrecognised scene names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scene type: {0}")]
pub struct UnknownScene(pub String);

impl FromStr for SceneType {
    type Err = UnknownScene;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        SceneType::ALL
            .into_iter()
            .find(|scene| scene.as_str() == wanted)
            .ok_or_else(|| UnknownScene(wanted.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip_through_from_str() {
        for scene in SceneType::ALL {
            assert_eq!(scene.as_str().parse::<SceneType>(), Ok(scene));
        }
        assert!("concert".parse::<SceneType>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&SceneType::PracticeRoom).unwrap();
        assert_eq!(json, "\"practice_room\"");
    }

    #[test]
    fn test_sub_scene_catalogues() {
        assert_eq!(SceneType::Stage.sub_scene_options().len(), 5);
        assert_eq!(SceneType::Variety.sub_scene_options().len(), 12);
        assert_eq!(SceneType::Forum.sub_scene_options().len(), 6);
        assert!(SceneType::Dorm.sub_scene_options().is_empty());
        assert_eq!(SceneType::Stage.default_sub_scene(), Some("M Countdown"));
        assert_eq!(SceneType::Company.default_sub_scene(), None);
    }
}
