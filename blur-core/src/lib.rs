//! Narrative context and generation engine for the BLUR GOD VIEW simulation.
//!
//! This crate provides:
//! - Context keys that split the story into independent threads
//! - The relationship graph and its prompt digest
//! - Persona selection bounded by recent history
//! - Scene-specific instruction compilation with a fixed response schema
//! - A generation client with credential re-acquisition and schema validation
//! - Per-thread append-only history and JSON save files
//!
//! # Quick Start
//!
//! ```ignore
//! use blur_core::{EnvCredentials, GeminiBackend, RoundRequest, SceneType, Session, SessionConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new(
//!         SessionConfig::from_env(),
//!         Arc::new(GeminiBackend::default()),
//!         Arc::new(EnvCredentials),
//!     );
//!
//!     let round = RoundRequest::new(SceneType::Stage).with_sub_scene("M Countdown");
//!     let outcome = session.advance(round).await?;
//!     println!("{} events in {}", outcome.block.events.len(), outcome.context_key);
//!
//!     session.save("blur_save.json").await?;
//!     Ok(())
//! }
//! ```

pub mod block;
pub mod context;
pub mod generation;
pub mod history;
pub mod instructions;
pub mod persist;
pub mod persona;
pub mod relationship;
pub mod scene;
pub mod session;
pub mod testing;

// Primary public API
pub use block::{EventContent, EventType, SimulationBlock, SimulationEvent, StagePhase};
pub use context::{ContextKey, ParticipantSelection};
pub use generation::{
    CredentialProvider, EnvCredentials, GeminiBackend, GenerationBackend, GenerationClient,
    GenerationError, StaticCredential,
};
pub use history::HistoryStore;
pub use instructions::{GenerationRequest, GenerationSettings, InstructionCompiler};
pub use persist::{Chronicle, PersistError};
pub use persona::{PersonaProfile, PersonaRoster, WorldView};
pub use relationship::{EdgeField, EdgeId, RelationshipEdge, RelationshipGraph};
pub use scene::SceneType;
pub use session::{RoundOutcome, RoundRequest, Session, SessionConfig, SessionError};
pub use testing::{ScriptedBackend, ScriptedCredentials};
