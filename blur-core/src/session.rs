//! Session - the primary public API for running the simulation.
//!
//! A session owns the shared state (relationship graph and per-thread
//! history) and runs one generation round at a time per thread:
//! resolve the thread, select personas, compile instructions, generate,
//! then append the block's events.

use crate::block::{EventType, SimulationBlock, SimulationEvent};
use crate::context::{self, ContextKey};
use crate::generation::{CredentialProvider, GenerationBackend, GenerationClient, GenerationError};
use crate::history::HistoryStore;
use crate::instructions::{GenerationSettings, InstructionCompiler};
use crate::persist::{Chronicle, PersistError};
use crate::persona::{select_personas, PersonaRoster, WorldView, HISTORY_WINDOW};
use crate::relationship::{EdgeField, EdgeId, GraphError, RelationshipEdge, RelationshipGraph};
use crate::scene::SceneType;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from Session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a generation round is already running for {0}")]
    Busy(ContextKey),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Relationship error: {0}")]
    Graph(#[from] GraphError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),
}

/// Configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model to request; `None` leaves the backend's default.
    pub model: Option<String>,

    /// How many of a thread's latest events feed persona selection.
    pub history_window: usize,

    /// Persona budget override; `None` uses the per-scene default.
    pub persona_limit: Option<usize>,

    pub settings: GenerationSettings,

    pub world_view: WorldView,

    /// Where `#save`/`#load` go when no path is given.
    pub save_path: Option<PathBuf>,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            model: None,
            history_window: HISTORY_WINDOW,
            persona_limit: None,
            settings: GenerationSettings::default(),
            world_view: WorldView::default(),
            save_path: None,
        }
    }

    /// Defaults overridden by `BLUR_MODEL` and `BLUR_SAVE_PATH`.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(model) = non_empty_env("BLUR_MODEL") {
            config.model = Some(model);
        }
        if let Some(path) = non_empty_env("BLUR_SAVE_PATH") {
            config.save_path = Some(PathBuf::from(path));
        }
        config
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_history_window(mut self, events: usize) -> Self {
        self.history_window = events;
        self
    }

    /// Cap the number of personas described per round.
    pub fn with_persona_limit(mut self, limit: usize) -> Self {
        self.persona_limit = Some(limit);
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_world_view(mut self, world_view: WorldView) -> Self {
        self.world_view = world_view;
        self
    }

    pub fn with_save_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(path.into());
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// One round as the director asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRequest {
    pub scene: SceneType,
    pub sub_scene: String,
    pub participants: Vec<String>,
    pub command: String,
}

impl RoundRequest {
    pub fn new(scene: SceneType) -> Self {
        Self {
            scene,
            sub_scene: String::new(),
            participants: Vec::new(),
            command: String::new(),
        }
    }

    pub fn with_sub_scene(mut self, sub_scene: impl Into<String>) -> Self {
        self.sub_scene = sub_scene.into();
        self
    }

    /// Participants of a direct-message thread.
    pub fn with_participants<S: Into<String>>(
        mut self,
        participants: impl IntoIterator<Item = S>,
    ) -> Self {
        self.participants = participants.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// The thread this round belongs to.
    pub fn context_key(&self) -> ContextKey {
        context::resolve(self.scene, &self.sub_scene, &self.participants)
    }
}

/// The result of a successful round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    /// The thread the block was appended to.
    pub context_key: ContextKey,

    /// The block as appended; event ids match the stored history.
    pub block: SimulationBlock,

    /// Personas described to the backend for this round.
    pub selected_personas: Vec<String>,
}

/// A simulation session.
///
/// Rounds for different threads may run concurrently; a second round for a
/// thread that is still generating is rejected with [`SessionError::Busy`].
pub struct Session {
    config: SessionConfig,
    roster: PersonaRoster,
    compiler: InstructionCompiler,
    client: GenerationClient,
    relationships: RwLock<RelationshipGraph>,
    history: RwLock<HistoryStore>,
    in_flight: Mutex<HashSet<ContextKey>>,
}

impl Session {
    /// Create a session with the default roster and relationships.
    pub fn new(
        config: SessionConfig,
        backend: Arc<dyn GenerationBackend>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let compiler = InstructionCompiler::new(config.world_view.clone(), config.settings.clone());
        Self {
            config,
            roster: PersonaRoster::blur(),
            compiler,
            client: GenerationClient::new(backend, credentials),
            relationships: RwLock::new(RelationshipGraph::with_defaults()),
            history: RwLock::new(HistoryStore::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Replace the persona roster.
    pub fn with_roster(mut self, roster: PersonaRoster) -> Self {
        self.roster = roster;
        self
    }

    /// Replace the starting relationships.
    pub fn with_relationships(mut self, relationships: RelationshipGraph) -> Self {
        self.relationships = RwLock::new(relationships);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn roster(&self) -> &PersonaRoster {
        &self.roster
    }

    /// Run one generation round.
    ///
    /// The block's events are appended to the thread in one step, and only
    /// when the whole block validated. On any failure history is untouched.
    pub async fn advance(&self, round: RoundRequest) -> Result<RoundOutcome, SessionError> {
        let key = round.context_key();
        let _guard = InFlightGuard::acquire(&self.in_flight, &key).ok_or_else(|| {
            debug!(context = %key, "round rejected, thread is busy");
            SessionError::Busy(key.clone())
        })?;

        let selected = {
            let history = self.read_history();
            let recent = history.recent(&key, self.config.history_window);
            let ids = self.roster.ids();
            select_personas(round.scene, recent, &ids, self.config.persona_limit)
        };
        let digest = self.read_relationships().digest();

        let profiles = self.roster.profiles_for(&selected);
        let mut request = self.compiler.compile(
            round.scene,
            &round.sub_scene,
            &round.command,
            &profiles,
            &digest,
        );
        if let Some(model) = &self.config.model {
            request = request.with_model(model);
        }

        debug!(context = %key, personas = ?selected, "compiled round");

        let generated = self.client.generate(&key, &request).await?;
        let mut block = generated.block;
        let context_key = generated.context_key;
        {
            let mut history = self.write_history();
            let added = history.append(&context_key, std::mem::take(&mut block.events));
            // Hand back the events as stored, with any `~N` id suffixes
            block.events = history.recent(&context_key, added).to_vec();
            info!(context = %context_key, events = added, "round appended");
        }

        Ok(RoundOutcome {
            context_key,
            block,
            selected_personas: selected,
        })
    }

    /// Whether a round is running for `key`.
    pub fn is_generating(&self, key: &ContextKey) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    // ========================================================================
    // History
    // ========================================================================

    /// A thread's events, oldest first.
    pub fn history(&self, key: &ContextKey) -> Vec<SimulationEvent> {
        self.read_history().events(key).to_vec()
    }

    /// A thread's events of one type.
    pub fn events_of_type(&self, key: &ContextKey, event_type: &EventType) -> Vec<SimulationEvent> {
        self.read_history()
            .events_of_type(key, event_type)
            .cloned()
            .collect()
    }

    /// Threads that have history.
    pub fn threads(&self) -> Vec<ContextKey> {
        self.read_history().keys().cloned().collect()
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    pub fn relationships(&self) -> RelationshipGraph {
        self.read_relationships().clone()
    }

    pub fn add_relationship(&self, edge: RelationshipEdge) -> EdgeId {
        self.write_relationships().add(edge)
    }

    pub fn update_relationship(
        &self,
        id: EdgeId,
        field: EdgeField,
    ) -> Result<RelationshipEdge, SessionError> {
        let mut graph = self.write_relationships();
        let edge = graph.update(id, field)?;
        Ok(edge.clone())
    }

    pub fn remove_relationship(&self, id: EdgeId) -> Result<RelationshipEdge, SessionError> {
        Ok(self.write_relationships().remove(id)?)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Snapshot of history and relationships.
    pub fn chronicle(&self) -> Chronicle {
        Chronicle::new(self.read_history().clone(), self.relationships())
    }

    /// Replace history and relationships with a snapshot.
    pub fn restore(&self, chronicle: Chronicle) {
        *self.write_history() = chronicle.history;
        *self.write_relationships() = chronicle.relationships;
        info!(saved_at = %chronicle.saved_at, "restored chronicle");
    }

    /// Save the session to a file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let chronicle = self.chronicle();
        chronicle.save_json(path).await?;
        Ok(())
    }

    /// Load a saved session into this one.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let chronicle = Chronicle::load_json(path).await.map_err(|e| {
            warn!(error = %e, "failed to load chronicle");
            e
        })?;
        self.restore(chronicle);
        Ok(())
    }

    fn read_history(&self) -> RwLockReadGuard<'_, HistoryStore> {
        self.history.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_history(&self) -> RwLockWriteGuard<'_, HistoryStore> {
        self.history.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_relationships(&self) -> RwLockReadGuard<'_, RelationshipGraph> {
        self.relationships
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_relationships(&self) -> RwLockWriteGuard<'_, RelationshipGraph> {
        self.relationships
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks a thread as generating until dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<ContextKey>>,
    key: ContextKey,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<ContextKey>>, key: &ContextKey) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        inserted.then(|| Self {
            set,
            key: key.clone(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chat_block_json, ScriptedBackend, ScriptedCredentials};

    fn session(backend: &Arc<ScriptedBackend>) -> Session {
        Session::new(
            SessionConfig::new(),
            backend.clone(),
            Arc::new(ScriptedCredentials::always("key")),
        )
    }

    #[test]
    fn test_round_request_keys() {
        let dm = RoundRequest::new(SceneType::Dm).with_participants(["RAHI", "Chloe"]);
        assert_eq!(dm.context_key().as_str(), "dm:Chloe-RAHI");

        let stage = RoundRequest::new(SceneType::Stage).with_sub_scene("Inkigayo");
        assert_eq!(stage.context_key().as_str(), "Inkigayo");

        let dorm = RoundRequest::new(SceneType::Dorm);
        assert_eq!(dorm.context_key().as_str(), "dorm");
    }

    #[test]
    fn test_in_flight_guard_releases_on_drop() {
        let set = Mutex::new(HashSet::new());
        let key = ContextKey::from("dorm");

        let guard = InFlightGuard::acquire(&set, &key).unwrap();
        assert!(InFlightGuard::acquire(&set, &key).is_none());
        assert!(InFlightGuard::acquire(&set, &"company".into()).is_some());
        drop(guard);
        assert!(InFlightGuard::acquire(&set, &key).is_some());
    }

    #[tokio::test]
    async fn test_model_override_reaches_request() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(chat_block_json())]));
        let session = Session::new(
            SessionConfig::new().with_model("gemini-2.5-flash"),
            backend.clone(),
            Arc::new(ScriptedCredentials::always("key")),
        );

        session
            .advance(RoundRequest::new(SceneType::GroupChat))
            .await
            .unwrap();

        let request = backend.last_request().unwrap();
        assert_eq!(request.model.as_deref(), Some("gemini-2.5-flash"));
    }

    #[tokio::test]
    async fn test_guard_cleared_after_failure() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("not json".to_string())]));
        let session = session(&backend);
        let round = RoundRequest::new(SceneType::Dorm);

        let err = session.advance(round.clone()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Generation(GenerationError::ParseFailure(_))
        ));
        assert!(!session.is_generating(&round.context_key()));
        assert!(session.history(&round.context_key()).is_empty());
    }

    #[test]
    fn test_relationship_passthroughs() {
        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let session = session(&backend);
        let before = session.relationships().len();

        let id = session.add_relationship(RelationshipEdge::new("Sera", "Nanae", "室友", 70));
        let updated = session
            .update_relationship(id, EdgeField::Level(120))
            .unwrap();
        assert_eq!(updated.level, 100);
        assert_eq!(session.relationships().len(), before + 1);

        session.remove_relationship(id).unwrap();
        assert!(matches!(
            session.remove_relationship(id),
            Err(SessionError::Graph(GraphError::UnknownEdge(_)))
        ));
    }

    #[tokio::test]
    async fn test_outcome_ids_match_stored_history() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(chat_block_json()),
            Ok(chat_block_json()),
        ]));
        let session = session(&backend);
        let round = RoundRequest::new(SceneType::GroupChat);

        session.advance(round.clone()).await.unwrap();
        let second = session.advance(round.clone()).await.unwrap();

        let ids: Vec<&str> = second
            .block
            .events
            .iter()
            .map(|e| e.event_id.as_str())
            .collect();
        assert_eq!(ids, ["c1~2", "c2~2"]);
        assert_eq!(
            session.history(&second.context_key)[2..],
            second.block.events[..]
        );
    }

    #[tokio::test]
    async fn test_history_window_beyond_default_is_honored() {
        let events: Vec<serde_json::Value> = std::iter::once("Sera")
            .chain(std::iter::repeat("Nanae").take(HISTORY_WINDOW + 4))
            .enumerate()
            .map(|(i, who)| {
                serde_json::json!({
                    "eventId": format!("e{i}"),
                    "ts": "22:00",
                    "eventType": "message",
                    "participants": [who],
                    "content": {"speaker": who, "text": "..."}
                })
            })
            .collect();
        let long_block = serde_json::json!({
            "sessionId": "s",
            "scene": {"sceneId": "dorm-1", "sceneType": "dorm", "locationLabel": "宿舍"},
            "events": events
        })
        .to_string();

        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(long_block),
            Ok(chat_block_json()),
        ]));
        let session = Session::new(
            SessionConfig::new()
                .with_history_window(HISTORY_WINDOW + 10)
                .with_persona_limit(2),
            backend.clone(),
            Arc::new(ScriptedCredentials::always("key")),
        );
        let round = RoundRequest::new(SceneType::Dorm);

        session.advance(round.clone()).await.unwrap();
        let outcome = session.advance(round).await.unwrap();
        assert_eq!(outcome.selected_personas, ["Sera", "Nanae"]);
    }
}
