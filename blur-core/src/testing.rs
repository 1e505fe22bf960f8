//! Test doubles for running sessions without the network.
//!
//! [`ScriptedBackend`] replays queued responses and records what it was
//! sent; [`ScriptedCredentials`] replays queued credential answers.

use crate::generation::{BackendFailure, CredentialProvider, GenerationBackend};
use crate::instructions::GenerationRequest;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// A backend that returns pre-scripted bodies or failures in order.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<String, BackendFailure>>>,
    calls: Mutex<Vec<(String, GenerationRequest)>>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<Result<String, BackendFailure>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful body.
    pub fn push_body(&self, body: impl Into<String>) {
        self.lock_responses().push_back(Ok(body.into()));
    }

    /// Queue a failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.lock_responses()
            .push_back(Err(BackendFailure::new(message)));
    }

    /// Number of times the backend was called.
    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    /// Credentials the backend was called with, in order.
    pub fn credentials_seen(&self) -> Vec<String> {
        self.lock_calls().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.lock_calls().last().map(|(_, r)| r.clone())
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, BackendFailure>>> {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<(String, GenerationRequest)>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(
        &self,
        credential: &str,
        request: &GenerationRequest,
    ) -> Result<String, BackendFailure> {
        self.lock_calls()
            .push((credential.to_string(), request.clone()));
        self.lock_responses()
            .pop_front()
            .unwrap_or_else(|| Err(BackendFailure::new("no scripted response left")))
    }
}

/// A credential provider that answers from a queue.
///
/// Once the queue is empty every call returns the fallback.
#[derive(Debug, Default)]
pub struct ScriptedCredentials {
    answers: Mutex<VecDeque<Option<String>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedCredentials {
    pub fn new(answers: Vec<Option<String>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answers with `secret`.
    pub fn always(secret: impl Into<String>) -> Self {
        Self {
            fallback: Some(secret.into()),
            ..Self::default()
        }
    }

    /// Never has a credential.
    pub fn cancelled() -> Self {
        Self::default()
    }

    /// Number of times `resolve` was called.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for ScriptedCredentials {
    async fn resolve(&self) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// A valid group-chat block with two messages.
pub fn chat_block_json() -> String {
    r#"{
  "sessionId": "sess-chat",
  "scene": {"sceneId": "group_chat-1", "sceneType": "group_chat", "locationLabel": "BLUR 群組"},
  "events": [
    {"eventId": "c1", "ts": "23:41", "eventType": "message",
     "participants": ["RAHI", "Nanae"],
     "content": {"speaker": "RAHI", "text": "有人要吃宵夜嗎"}},
    {"eventId": "c2", "ts": "23:42", "eventType": "message",
     "participants": ["Nanae", "RAHI"],
     "content": {"speaker": "Nanae", "text": "已讀"}}
  ]
}"#
    .to_string()
}

/// A valid stage block covering all four phases in order.
pub fn stage_block_json(sub_scene: &str) -> String {
    let phases = [
        ("s1", "待機室", "RAHI", "練習服", "日光燈", "手機直拍", "暖身"),
        ("s2", "上台前", "Yeongri", "舞台服", "側燈", "後台跟拍", "圍圈打氣"),
        ("s3", "舞台表演", "Chloe", "黑色皮革", "紅色追光", "特寫", "Killing part 甩頭"),
        ("s4", "下台後", "Sera", "披外套", "走廊燈", "粉絲錄影", "鞠躬"),
    ];
    let events: Vec<serde_json::Value> = phases
        .iter()
        .map(|(id, phase, speaker, outfit, lighting, camera, choreography)| {
            serde_json::json!({
                "eventId": id,
                "ts": "19:00",
                "eventType": "stage_moment",
                "participants": [speaker],
                "content": {
                    "speaker": speaker,
                    "text": phase,
                    "stage_phase": phase,
                    "outfit": outfit,
                    "lighting": lighting,
                    "camera": camera,
                    "choreography": choreography,
                }
            })
        })
        .collect();

    serde_json::json!({
        "sessionId": "sess-stage",
        "scene": {
            "sceneId": "stage-1",
            "sceneType": "stage",
            "locationLabel": sub_scene,
            "subScene": sub_scene,
        },
        "events": events,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::SimulationBlock;

    #[test]
    fn test_fixtures_are_valid_blocks() {
        assert_eq!(SimulationBlock::from_response(&chat_block_json()).unwrap().events.len(), 2);
        let stage = SimulationBlock::from_response(&stage_block_json("M Countdown")).unwrap();
        assert_eq!(stage.stage_phases(), ["待機室", "上台前", "舞台表演", "下台後"]);
    }

    #[tokio::test]
    async fn test_scripted_credentials_fall_back_when_drained() {
        let creds = ScriptedCredentials::new(vec![None]);
        assert_eq!(creds.resolve().await, None);
        assert_eq!(creds.resolve().await, None);
        assert_eq!(creds.call_count(), 2);

        let creds = ScriptedCredentials::always("k");
        assert_eq!(creds.resolve().await.as_deref(), Some("k"));
    }
}
