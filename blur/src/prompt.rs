//! Asking the operator for a Gemini key.

use async_trait::async_trait;
use blur_core::{CredentialProvider, EnvCredentials};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// Stdin lines, shared between the command loop and the key prompt.
pub type SharedInput = Arc<Mutex<Lines<BufReader<Stdin>>>>;

/// Tries the environment once, then asks on stdin.
///
/// Every later call, including the one after a rejected key, prompts.
/// A blank answer cancels.
pub struct PromptCredentials {
    input: SharedInput,
    env_tried: AtomicBool,
}

impl PromptCredentials {
    pub fn new(input: SharedInput) -> Self {
        Self {
            input,
            env_tried: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CredentialProvider for PromptCredentials {
    async fn resolve(&self) -> Option<String> {
        if !self.env_tried.swap(true, Ordering::SeqCst) {
            if let Some(key) = EnvCredentials.resolve().await {
                return Some(key);
            }
        }

        eprint!("[KEY] Gemini API key (blank to cancel): ");
        std::io::stderr().flush().ok();

        let mut input = self.input.lock().await;
        match input.next_line().await {
            Ok(Some(line)) => Some(line.trim().to_string()).filter(|key| !key.is_empty()),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read key from stdin");
                None
            }
        }
    }
}
