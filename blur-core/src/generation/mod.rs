//! Talking to the generation backend.
//!
//! Contains the client that enforces the response contract, the backend
//! seam with its Gemini implementation, and credential providers.

mod backend;
mod client;
mod credentials;

pub use backend::{BackendFailure, GeminiBackend, GenerationBackend};
pub use client::{is_auth_failure, Generated, GenerationClient, GenerationError, AUTH_FAILURE_MARKERS};
pub use credentials::{CredentialProvider, EnvCredentials, StaticCredential, CREDENTIAL_ENV_VARS};
