//! Completion API clients.

mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use regent_common::{ChatCompletionRequest, ChatCompletionResponse};

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),
    #[error("Completion API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A chat completion endpoint.
///
/// The credential is passed per call so the caller decides where it lives.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run one stateless completion over the given messages.
    async fn complete(
        &self,
        credential: &str,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, CompletionError>;

    /// Check whether a credential is accepted by the provider.
    ///
    /// `Ok(false)` means the provider rejected it; transport problems are errors.
    async fn validate_credential(&self, credential: &str) -> Result<bool, CompletionError>;
}
