//! The generation backend seam and its Gemini implementation.

use crate::instructions::GenerationRequest;
use async_trait::async_trait;
use gemini::{Gemini, Message, Request};
use thiserror::Error;

/// A failed backend call, described by the service's own message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendFailure {
    pub message: String,
}

impl BackendFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Something that turns a request into a response body.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Send `request` authenticated with `credential` and return the raw body text.
    async fn generate(
        &self,
        credential: &str,
        request: &GenerationRequest,
    ) -> Result<String, BackendFailure>;
}

/// Gemini `generateContent` in JSON mode.
#[derive(Clone)]
pub struct GeminiBackend {
    client: Gemini,
    temperature: Option<f32>,
}

impl GeminiBackend {
    pub fn new(client: Gemini) -> Self {
        Self {
            client,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl Default for GeminiBackend {
    fn default() -> Self {
        Self::new(Gemini::new(String::new()))
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn generate(
        &self,
        credential: &str,
        request: &GenerationRequest,
    ) -> Result<String, BackendFailure> {
        let mut api_request = Request::new(vec![Message::user(&request.user_content)])
            .with_system(&request.system_instruction)
            .with_json_schema(request.response_schema.clone());
        api_request.response_mime_type = Some(request.response_mime_type.clone());

        if let Some(model) = &request.model {
            api_request = api_request.with_model(model);
        }
        if let Some(temperature) = self.temperature {
            api_request = api_request.with_temperature(temperature);
        }

        let response = self
            .client
            .clone()
            .with_api_key(credential)
            .complete(api_request)
            .await
            .map_err(|e| BackendFailure::new(e.to_string()))?;

        Ok(response.text)
    }
}
