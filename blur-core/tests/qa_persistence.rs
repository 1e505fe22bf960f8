//! QA tests for saving and restoring a session.
//!
//! Run with: `cargo test -p blur-core --test qa_persistence`

use blur_core::testing::{chat_block_json, stage_block_json};
use blur_core::{
    Chronicle, EdgeField, PersistError, RelationshipEdge, RoundRequest, SceneType,
    ScriptedBackend, ScriptedCredentials, Session, SessionConfig, SessionError,
};
use std::sync::Arc;
use tempfile::TempDir;

fn new_session(bodies: Vec<String>) -> Session {
    Session::new(
        SessionConfig::new(),
        Arc::new(ScriptedBackend::new(bodies.into_iter().map(Ok).collect())),
        Arc::new(ScriptedCredentials::always("key")),
    )
}

#[tokio::test]
async fn test_save_and_load_restores_threads_and_relationships() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let save_path = temp_dir.path().join("blur_save.json");

    let session = new_session(vec![chat_block_json(), stage_block_json("M Countdown")]);
    session
        .advance(RoundRequest::new(SceneType::Dm).with_participants(["RAHI", "Chloe"]))
        .await
        .unwrap();
    session
        .advance(RoundRequest::new(SceneType::Stage).with_sub_scene("M Countdown"))
        .await
        .unwrap();

    let edge = session.add_relationship(RelationshipEdge::new("Sera", "Nanae", "室友", 70));
    session
        .update_relationship(edge, EdgeField::Note("半夜一起追劇".to_string()))
        .unwrap();

    session.save(&save_path).await.expect("save should succeed");

    let restored = new_session(vec![]);
    restored.load(&save_path).await.expect("load should succeed");

    assert_eq!(restored.threads(), session.threads());
    assert_eq!(
        restored.history(&"dm:Chloe-RAHI".into()),
        session.history(&"dm:Chloe-RAHI".into())
    );
    assert_eq!(restored.history(&"M Countdown".into()).len(), 4);
    assert_eq!(restored.relationships(), session.relationships());
    assert!(restored
        .relationships()
        .digest()
        .contains("Sera-Nanae: 室友(70%): 半夜一起追劇"));
}

#[tokio::test]
async fn test_restored_edges_keep_their_ids() {
    let temp_dir = TempDir::new().unwrap();
    let save_path = temp_dir.path().join("edges.json");

    let session = new_session(vec![]);
    let edge = session.add_relationship(RelationshipEdge::new("Chloe", "Sera", "損友", 60));
    session.save(&save_path).await.unwrap();

    let restored = new_session(vec![]);
    restored.load(&save_path).await.unwrap();
    let removed = restored.remove_relationship(edge).unwrap();
    assert_eq!(removed.kind, "損友");
}

#[tokio::test]
async fn test_load_rejects_other_versions() {
    let temp_dir = TempDir::new().unwrap();
    let save_path = temp_dir.path().join("future.json");

    let session = new_session(vec![]);
    let mut chronicle = session.chronicle();
    chronicle.version += 1;
    chronicle.save_json(&save_path).await.unwrap();

    let err = session.load(&save_path).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Persist(PersistError::VersionMismatch { .. })
    ));
}

#[tokio::test]
async fn test_failed_load_keeps_current_state() {
    let temp_dir = TempDir::new().unwrap();
    let save_path = temp_dir.path().join("broken.json");
    tokio::fs::write(&save_path, "{ not json").await.unwrap();

    let session = new_session(vec![chat_block_json()]);
    session
        .advance(RoundRequest::new(SceneType::GroupChat))
        .await
        .unwrap();

    assert!(matches!(
        session.load(&save_path).await,
        Err(SessionError::Persist(PersistError::Json(_)))
    ));
    assert_eq!(session.history(&"group_chat".into()).len(), 2);

    let saved = Chronicle::load_json(&save_path).await;
    assert!(saved.is_err());
}
