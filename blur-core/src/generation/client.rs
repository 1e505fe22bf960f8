//! The generation client: credentials, dispatch and response validation.

use super::backend::GenerationBackend;
use super::credentials::CredentialProvider;
use crate::block::{BlockError, SimulationBlock};
use crate::context::ContextKey;
use crate::instructions::GenerationRequest;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Substrings of a backend error that mean the credential was rejected or absent.
pub const AUTH_FAILURE_MARKERS: [&str; 5] = [
    "Requested entity was not found",
    "API key",
    "apiKey",
    "API_KEY",
    "NO_API_KEY",
];

/// Errors from a generation call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("no credential available for the generation backend")]
    CredentialMissing,

    #[error("generation backend error: {0}")]
    Backend(String),

    #[error("response violates the simulation schema: {0}")]
    SchemaViolation(String),

    #[error("response is not valid JSON: {0}")]
    ParseFailure(String),
}

impl GenerationError {
    /// Whether this is a backend error caused by the credential.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, GenerationError::Backend(message) if is_auth_failure(message))
    }
}

impl From<BlockError> for GenerationError {
    fn from(err: BlockError) -> Self {
        match err {
            BlockError::Parse(message) => GenerationError::ParseFailure(message),
            BlockError::Schema(message) => GenerationError::SchemaViolation(message),
        }
    }
}

/// Whether a backend error message carries an authentication-failure signature.
pub fn is_auth_failure(message: &str) -> bool {
    AUTH_FAILURE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// A validated block together with the thread it was generated for.
///
/// The thread travels with the result so a caller that moved to another
/// thread while waiting can tell the block is stale.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub context_key: ContextKey,
    pub block: SimulationBlock,
}

/// Dispatches generation requests.
///
/// The credential is resolved lazily through the injected provider and
/// cached. When the backend rejects it, the provider is asked exactly once
/// for a replacement and the original error is still returned; the call is
/// never retried here. Concurrent calls share a single resolution.
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    credentials: Arc<dyn CredentialProvider>,
    cached: RwLock<Option<String>>,
    /// Held across resolve-and-store so the provider is asked once at a time.
    resolving: Mutex<()>,
}

impl GenerationClient {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            backend,
            credentials,
            cached: RwLock::new(None),
            resolving: Mutex::new(()),
        }
    }

    /// Generate one block for `context_key`.
    pub async fn generate(
        &self,
        context_key: &ContextKey,
        request: &GenerationRequest,
    ) -> Result<Generated, GenerationError> {
        let credential = self.credential().await?;

        debug!(context = %context_key, model = ?request.model, "dispatching generation request");

        let body = match self.backend.generate(&credential, request).await {
            Ok(body) => body,
            Err(failure) => {
                if is_auth_failure(&failure.message) {
                    warn!(context = %context_key, "backend rejected the credential, asking for a new one");
                    self.reacquire().await;
                } else {
                    warn!(context = %context_key, error = %failure, "generation backend failed");
                }
                return Err(GenerationError::Backend(failure.message));
            }
        };

        let block = SimulationBlock::from_response(&body).map_err(|e| {
            warn!(context = %context_key, error = %e, "rejected generation response");
            GenerationError::from(e)
        })?;

        info!(
            context = %context_key,
            session = %block.session_id,
            events = block.events.len(),
            "generated simulation block"
        );

        Ok(Generated {
            context_key: context_key.clone(),
            block,
        })
    }

    /// Whether a credential is currently cached.
    pub async fn has_credential(&self) -> bool {
        self.cached.read().await.is_some()
    }

    /// Drop the cached credential; the next call resolves again.
    pub async fn forget_credential(&self) {
        *self.cached.write().await = None;
    }

    async fn credential(&self) -> Result<String, GenerationError> {
        if let Some(credential) = self.cached.read().await.clone() {
            return Ok(credential);
        }

        let _resolving = self.resolving.lock().await;
        // Another call may have filled the cache while we waited
        if let Some(credential) = self.cached.read().await.clone() {
            return Ok(credential);
        }

        let credential = self.resolve().await.ok_or_else(|| {
            warn!("no credential available, generation not attempted");
            GenerationError::CredentialMissing
        })?;
        *self.cached.write().await = Some(credential.clone());
        Ok(credential)
    }

    async fn reacquire(&self) {
        let _resolving = self.resolving.lock().await;
        let fresh = self.resolve().await;
        if fresh.is_none() {
            debug!("credential re-resolution cancelled, cache cleared");
        }
        *self.cached.write().await = fresh;
    }

    async fn resolve(&self) -> Option<String> {
        self.credentials
            .resolve()
            .await
            .map(|secret| secret.trim().to_string())
            .filter(|secret| !secret.is_empty())
    }
}
