//! Per-thread event history.

use crate::block::{EventType, SimulationEvent};
use crate::context::ContextKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Append-only event log for every thread.
///
/// Events are only ever appended, a whole round at a time, and are never
/// changed afterwards. Event ids are unique within a thread: an incoming id
/// that is already taken is suffixed with `~2`, `~3`, ... on the way in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryStore {
    threads: BTreeMap<ContextKey, Vec<SimulationEvent>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one round's events to a thread, returning how many were added.
    pub fn append(&mut self, key: &ContextKey, events: Vec<SimulationEvent>) -> usize {
        let thread = self.threads.entry(key.clone()).or_default();
        let mut taken: HashSet<String> = thread.iter().map(|e| e.event_id.clone()).collect();

        let count = events.len();
        thread.reserve(count);
        for mut event in events {
            if taken.contains(&event.event_id) {
                event.event_id = unused_id(&event.event_id, &taken);
            }
            taken.insert(event.event_id.clone());
            thread.push(event);
        }
        count
    }

    /// The whole thread, oldest first.
    pub fn events(&self, key: &ContextKey) -> &[SimulationEvent] {
        self.threads.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// The last `n` events of a thread, oldest first.
    pub fn recent(&self, key: &ContextKey, n: usize) -> &[SimulationEvent] {
        let events = self.events(key);
        &events[events.len().saturating_sub(n)..]
    }

    /// Events of one type within a thread.
    pub fn events_of_type<'a>(
        &'a self,
        key: &ContextKey,
        event_type: &'a EventType,
    ) -> impl Iterator<Item = &'a SimulationEvent> + 'a {
        self.events(key)
            .iter()
            .filter(move |e| &e.event_type == event_type)
    }

    /// Threads that have at least one event.
    pub fn keys(&self) -> impl Iterator<Item = &ContextKey> {
        self.threads
            .iter()
            .filter(|(_, events)| !events.is_empty())
            .map(|(key, _)| key)
    }

    pub fn len(&self, key: &ContextKey) -> usize {
        self.events(key).len()
    }

    pub fn total_events(&self) -> usize {
        self.threads.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_events() == 0
    }
}

fn unused_id(id: &str, taken: &HashSet<String>) -> String {
    (2..)
        .map(|n| format!("{id}~{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{EventContent, Utterance};

    fn event(id: &str, event_type: EventType) -> SimulationEvent {
        SimulationEvent {
            event_id: id.to_string(),
            ts: "t".to_string(),
            event_type,
            participants: vec![],
            content: EventContent::Dialogue(Utterance::default()),
        }
    }

    #[test]
    fn test_append_preserves_prior_events_and_order() {
        let key = ContextKey::from("dorm");
        let mut store = HistoryStore::new();
        store.append(&key, vec![event("a", EventType::Message)]);
        let added = store.append(
            &key,
            vec![event("b", EventType::Action), event("c", EventType::Message)],
        );

        assert_eq!(added, 2);
        let ids: Vec<&str> = store.events(&key).iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_threads_are_independent() {
        let mut store = HistoryStore::new();
        store.append(&"dm:Chloe-RAHI".into(), vec![event("a", EventType::Message)]);
        assert!(store.events(&"M Countdown".into()).is_empty());
        assert_eq!(store.keys().count(), 1);
        assert_eq!(store.total_events(), 1);
    }

    #[test]
    fn test_colliding_ids_are_suffixed() {
        let key = ContextKey::from("dorm");
        let mut store = HistoryStore::new();
        store.append(&key, vec![event("e1", EventType::Message)]);
        store.append(
            &key,
            vec![event("e1", EventType::Message), event("e1", EventType::Message)],
        );
        let ids: Vec<&str> = store.events(&key).iter().map(|e| e.event_id.as_str()).collect();
        assert_eq!(ids, ["e1", "e1~2", "e1~3"]);
    }

    #[test]
    fn test_recent_and_filter() {
        let key = ContextKey::from("forum");
        let mut store = HistoryStore::new();
        store.append(
            &key,
            vec![
                event("p", EventType::ForumPost),
                event("r1", EventType::ForumReply),
                event("r2", EventType::ForumReply),
            ],
        );
        assert_eq!(store.recent(&key, 2)[0].event_id, "r1");
        assert_eq!(store.recent(&key, 10).len(), 3);
        assert_eq!(store.events_of_type(&key, &EventType::ForumReply).count(), 2);
    }

    #[test]
    fn test_snapshot_round_trip_keeps_threads() {
        let mut store = HistoryStore::new();
        store.append(&"stage".into(), vec![event("a", EventType::Message)]);
        let json = serde_json::to_string(&store).unwrap();
        assert!(json.starts_with("{\"stage\":["));
        let restored: HistoryStore = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, store);
    }
}
