//! The relationship graph between personas.
//!
//! Edges are directed and weighted, and several edges may join the same pair
//! (each one a different facet of the relationship). Every edge gets a stable
//! [`EdgeId`] when it is created; edits and removals address edges by that id,
//! so an edit never lands on the wrong edge after an earlier removal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Digest rendered for a graph with no edges.
pub const EMPTY_DIGEST: &str = "Standard relationships.";

/// Highest relationship level.
pub const MAX_LEVEL: u8 = 100;

/// Errors from graph edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("no relationship edge with id {0}")]
    UnknownEdge(EdgeId),
}

/// Stable identifier of one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId(Uuid);

impl EdgeId {
    /// Create a new unique edge ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EdgeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A directed relationship from one persona to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    /// Snapshots written before ids existed get a fresh id on load.
    #[serde(default)]
    pub id: EdgeId,
    pub from: String,
    pub to: String,
    /// Free-form label such as "靈魂伴侶" or "Rivals".
    #[serde(rename = "type")]
    pub kind: String,
    /// Strength, 0 to 100.
    pub level: u8,
    pub note: String,
}

impl RelationshipEdge {
    /// Create a new edge; `level` is clamped to 100.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: impl Into<String>,
        level: u8,
    ) -> Self {
        Self {
            id: EdgeId::new(),
            from: from.into(),
            to: to.into(),
            kind: kind.into(),
            level: level.min(MAX_LEVEL),
            note: String::new(),
        }
    }

    /// Set the note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Check if this edge touches a specific persona.
    pub fn involves(&self, persona: &str) -> bool {
        self.from == persona || self.to == persona
    }

    /// `"{from}-{to}: {type}({level}%): {note}"`
    pub fn digest_line(&self) -> String {
        format!(
            "{}-{}: {}({}%): {}",
            self.from, self.to, self.kind, self.level, self.note
        )
    }

    fn with_field(&self, field: EdgeField) -> Self {
        let mut edge = self.clone();
        match field {
            EdgeField::From(from) => edge.from = from,
            EdgeField::To(to) => edge.to = to,
            EdgeField::Kind(kind) => edge.kind = kind,
            EdgeField::Level(level) => edge.level = level.min(MAX_LEVEL),
            EdgeField::Note(note) => edge.note = note,
        }
        edge
    }
}

/// A single-field edit to an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeField {
    From(String),
    To(String),
    Kind(String),
    Level(u8),
    Note(String),
}

/// Ordered list of relationship edges.
///
/// Loaded snapshots go through [`RelationshipGraph::add`], so levels are
/// clamped and repeated ids replaced just as for edges added at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<RelationshipEdge>", into = "Vec<RelationshipEdge>")]
pub struct RelationshipGraph {
    edges: Vec<RelationshipEdge>,
}

impl From<Vec<RelationshipEdge>> for RelationshipGraph {
    fn from(edges: Vec<RelationshipEdge>) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            graph.add(edge);
        }
        graph
    }
}

impl From<RelationshipGraph> for Vec<RelationshipEdge> {
    fn from(graph: RelationshipGraph) -> Self {
        graph.edges
    }
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The relationships BLUR starts with.
    pub fn with_defaults() -> Self {
        let mut graph = Self::new();
        graph.add(RelationshipEdge::new("Chloe", "RAHI", "靈魂伴侶", 95).with_note("共同搗蛋小隊"));
        graph.add(RelationshipEdge::new("Yeongri", "Sera", "互補搭檔", 90).with_note("隊內的雙親"));
        graph.add(RelationshipEdge::new("Nanae", "Yeongri", "敬畏", 85).with_note("隊長的小跟班"));
        graph.add(
            RelationshipEdge::new("RAHI", "Nanae", "巨型寶寶", 92).with_note("Nanae 的人體掛件"),
        );
        graph.add(
            RelationshipEdge::new("Sera", "Chloe", "心理諮商", 88).with_note("聽 Chloe 抱怨的人"),
        );
        graph
    }

    /// Append an edge and return its id.
    ///
    /// An edge whose id is already present is given a fresh one.
    pub fn add(&mut self, mut edge: RelationshipEdge) -> EdgeId {
        if self.get(edge.id).is_some() {
            edge.id = EdgeId::new();
        }
        edge.level = edge.level.min(MAX_LEVEL);
        let id = edge.id;
        self.edges.push(edge);
        id
    }

    /// Replace one field of an edge, keeping its position and id.
    pub fn update(&mut self, id: EdgeId, field: EdgeField) -> Result<&RelationshipEdge, GraphError> {
        let pos = self.position(id)?;
        self.edges[pos] = self.edges[pos].with_field(field);
        Ok(&self.edges[pos])
    }

    /// Remove an edge, returning it.
    pub fn remove(&mut self, id: EdgeId) -> Result<RelationshipEdge, GraphError> {
        let pos = self.position(id)?;
        Ok(self.edges.remove(pos))
    }

    pub fn get(&self, id: EdgeId) -> Option<&RelationshipEdge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn edges(&self) -> &[RelationshipEdge] {
        &self.edges
    }

    /// Edges starting or ending at `persona`.
    pub fn edges_involving<'a>(
        &'a self,
        persona: &'a str,
    ) -> impl Iterator<Item = &'a RelationshipEdge> + 'a {
        self.edges.iter().filter(move |e| e.involves(persona))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Render the graph for a generation prompt, one edge per line.
    pub fn digest(&self) -> String {
        if self.edges.is_empty() {
            return EMPTY_DIGEST.to_string();
        }
        self.edges
            .iter()
            .map(RelationshipEdge::digest_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn position(&self, id: EdgeId) -> Result<usize, GraphError> {
        self.edges
            .iter()
            .position(|e| e.id == id)
            .ok_or(GraphError::UnknownEdge(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_digest() {
        assert_eq!(RelationshipGraph::new().digest(), "Standard relationships.");
    }

    #[test]
    fn test_single_edge_digest() {
        let mut graph = RelationshipGraph::new();
        graph.add(RelationshipEdge::new("A", "B", "Rivals", 70).with_note("x"));
        assert_eq!(graph.digest(), "A-B: Rivals(70%): x");
    }

    #[test]
    fn test_digest_keeps_insertion_order() {
        let graph = RelationshipGraph::with_defaults();
        let digest = graph.digest();
        let lines: Vec<&str> = digest.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Chloe-RAHI: 靈魂伴侶(95%): 共同搗蛋小隊");
        assert_eq!(lines[4], "Sera-Chloe: 心理諮商(88%): 聽 Chloe 抱怨的人");
    }

    #[test]
    fn test_ids_stay_valid_after_removal() {
        let mut graph = RelationshipGraph::new();
        let first = graph.add(RelationshipEdge::new("A", "B", "x", 10));
        let second = graph.add(RelationshipEdge::new("B", "C", "y", 20));
        let third = graph.add(RelationshipEdge::new("C", "A", "z", 30));

        graph.remove(first).unwrap();
        let updated = graph.update(third, EdgeField::Note("still me".into())).unwrap();
        assert_eq!(updated.from, "C");
        assert_eq!(updated.note, "still me");
        assert_eq!(graph.get(second).unwrap().level, 20);

        assert_eq!(graph.remove(first), Err(GraphError::UnknownEdge(first)));
    }

    #[test]
    fn test_update_clamps_level() {
        let mut graph = RelationshipGraph::new();
        let id = graph.add(RelationshipEdge::new("A", "B", "x", 250));
        assert_eq!(graph.get(id).unwrap().level, 100);
        graph.update(id, EdgeField::Level(180)).unwrap();
        assert_eq!(graph.get(id).unwrap().level, 100);
    }

    #[test]
    fn test_duplicate_pairs_are_kept() {
        let mut graph = RelationshipGraph::new();
        graph.add(RelationshipEdge::new("A", "B", "Rivals", 70));
        graph.add(RelationshipEdge::new("A", "B", "Friends", 40));
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges_involving("B").count(), 2);
    }

    #[test]
    fn test_re_adding_an_edge_assigns_new_id() {
        let mut graph = RelationshipGraph::new();
        let edge = RelationshipEdge::new("A", "B", "x", 1);
        let first = graph.add(edge.clone());
        let second = graph.add(edge);
        assert_ne!(first, second);
    }

    #[test]
    fn test_legacy_snapshot_without_ids_loads() {
        let json = r#"[{"from":"Chloe","to":"RAHI","type":"靈魂伴侶","level":95,"note":"共同搗蛋小隊"}]"#;
        let graph: RelationshipGraph = serde_json::from_str(json).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.edges()[0].kind, "靈魂伴侶");
    }

    #[test]
    fn test_loaded_levels_are_clamped() {
        let json = r#"[{"from":"A","to":"B","type":"x","level":150,"note":""}]"#;
        let graph: RelationshipGraph = serde_json::from_str(json).unwrap();
        assert_eq!(graph.edges()[0].level, 100);
    }

    #[test]
    fn test_loaded_duplicate_ids_are_reassigned() {
        let edge = RelationshipEdge::new("A", "B", "x", 10);
        let json = serde_json::to_string(&vec![edge.clone(), edge.clone()]).unwrap();
        let graph: RelationshipGraph = serde_json::from_str(&json).unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges()[0].id, edge.id);
        assert_ne!(graph.edges()[1].id, edge.id);
    }

    #[test]
    fn test_graph_saves_as_plain_list() {
        let graph = RelationshipGraph::with_defaults();
        let value = serde_json::to_value(&graph).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(5));
        let back: RelationshipGraph = serde_json::from_value(value).unwrap();
        assert_eq!(back, graph);
    }
}
