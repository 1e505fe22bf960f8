//! Where the generation backend's secret comes from.

use async_trait::async_trait;

/// Environment variables checked by [`EnvCredentials`], in order.
pub const CREDENTIAL_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Supplies the secret the backend needs.
///
/// `None`, or a blank string, means the user cancelled or nothing is
/// configured. Implementations may be interactive; the generation client
/// calls `resolve` when it holds no secret and once more after an
/// authentication failure.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(&self) -> Option<String>;
}

/// Reads the secret from the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials;

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn resolve(&self) -> Option<String> {
        CREDENTIAL_ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty())
    }
}

/// A fixed secret.
#[derive(Clone)]
pub struct StaticCredential(String);

impl StaticCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticCredential(***)")
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn resolve(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_credential() {
        let provider = StaticCredential::new("secret");
        assert_eq!(provider.resolve().await.as_deref(), Some("secret"));
        assert_eq!(format!("{provider:?}"), "StaticCredential(***)");
    }
}
