//! Integration tests that call the real Gemini API.
//!
//! These tests require GEMINI_API_KEY to be set (via .env file or environment).
//! Run with: `cargo test -p blur-core --test api_integration -- --ignored`

use blur_core::{
    EnvCredentials, EventContent, GeminiBackend, RoundRequest, SceneType, Session, SessionConfig,
};
use std::sync::Arc;

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if API key is available
fn has_api_key() -> bool {
    std::env::var("GEMINI_API_KEY").is_ok() || std::env::var("API_KEY").is_ok()
}

fn live_session() -> Session {
    Session::new(
        SessionConfig::from_env(),
        Arc::new(GeminiBackend::default()),
        Arc::new(EnvCredentials),
    )
}

#[tokio::test]
#[ignore] // Run with: cargo test -p blur-core --test api_integration -- --ignored
async fn test_live_stage_round_has_four_phases() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: GEMINI_API_KEY not set");
        return;
    }

    let session = live_session();
    let outcome = session
        .advance(RoundRequest::new(SceneType::Stage).with_sub_scene("M Countdown"))
        .await
        .expect("stage round failed");

    println!("Stage phases: {:?}", outcome.block.stage_phases());
    assert_eq!(outcome.context_key.as_str(), "M Countdown");
    assert!(!outcome.block.events.is_empty());
    assert_eq!(
        session.history(&outcome.context_key).len(),
        outcome.block.events.len()
    );
}

#[tokio::test]
#[ignore]
async fn test_live_dm_round_is_dialogue_only() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: GEMINI_API_KEY not set");
        return;
    }

    let session = live_session();
    let outcome = session
        .advance(
            RoundRequest::new(SceneType::Dm)
                .with_participants(["RAHI", "Chloe"])
                .with_command("RAHI 半夜傳訊息問 Chloe 要不要偷吃泡麵"),
        )
        .await
        .expect("dm round failed");

    assert_eq!(outcome.context_key.as_str(), "dm:Chloe-RAHI");
    for event in &outcome.block.events {
        println!("[{}] {:?}: {:?}", event.ts, event.speaker(), event.content.base().text);
        assert!(!matches!(event.content, EventContent::Stage(_)));
    }
}
