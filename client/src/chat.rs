//! Chat dispatch: turn user input into a completion request and persist the
//! conversation.

use std::sync::{Arc, Mutex, MutexGuard};

use regent_common::session::generate_id;
use regent_common::{ChatCompletionRequest, ChatMessage, ChatSession, SessionMessage};

use crate::config::CompletionConfig;
use crate::llm::{CompletionClient, CompletionError};
use crate::store::{SessionStore, StoreError};

/// System message sent ahead of every conversation.
pub const SYSTEM_PREAMBLE: &str = "You are Regent, a sovereign AI assistant. \
The user owns their data and their conversations: do not ask for personal \
information you do not need, do not retain anything beyond this conversation, \
and be transparent about what you can and cannot do.";

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error("API key not found. Please add your API key in settings.")]
    MissingCredential,
    #[error("Completion request failed: {0}")]
    Transport(String),
    #[error("Completion API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Invalid completion response: {0}")]
    InvalidResponse(String),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl SendError {
    /// Configuration errors need a settings change rather than a resend.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SendError::MissingCredential)
    }
}

impl From<CompletionError> for SendError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::RequestFailed(msg) => SendError::Transport(msg),
            CompletionError::Api { status, body } => SendError::Api { status, body },
            CompletionError::InvalidResponse(msg) => SendError::InvalidResponse(msg),
        }
    }
}

/// Model parameters attached to every request.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&CompletionConfig> for CompletionOptions {
    fn from(config: &CompletionConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self::from(&CompletionConfig::default())
    }
}

/// Sends user messages to the completion API and records both sides of the
/// exchange in the session store.
///
/// A failed send leaves the user's message stored without a reply. At most
/// one send per session should be in flight; the view enforces that.
pub struct ChatDispatcher {
    store: SessionStore,
    client: Arc<dyn CompletionClient>,
    options: CompletionOptions,
    current: Mutex<String>,
}

impl ChatDispatcher {
    pub fn new(
        store: SessionStore,
        client: Arc<dyn CompletionClient>,
        options: CompletionOptions,
    ) -> Self {
        Self {
            store,
            client,
            options,
            current: Mutex::new(generate_id()),
        }
    }

    /// Id of the session new messages go to.
    pub fn current_session(&self) -> String {
        self.current_guard().clone()
    }

    /// Start a fresh, empty current session and return its id.
    pub fn new_session(&self) -> String {
        let id = generate_id();
        *self.current_guard() = id.clone();
        tracing::debug!("Started new chat session {}", id);
        id
    }

    /// Make `id` the current session and return its stored contents, if any.
    pub fn switch_session(&self, id: &str) -> Option<ChatSession> {
        *self.current_guard() = id.to_string();
        self.store.get_session(id)
    }

    pub async fn send_to_current(&self, text: &str) -> Result<SessionMessage, SendError> {
        let session_id = self.current_session();
        self.send_message(&session_id, text).await
    }

    /// Append `text` as a user message, ask the completion API for a reply,
    /// and append the reply. Returns the assistant message.
    pub async fn send_message(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<SessionMessage, SendError> {
        if text.trim().is_empty() {
            return Err(SendError::EmptyMessage);
        }

        // Optimistic append, persisted before anything can fail.
        let user_message = SessionMessage::user(text);
        let mut session = match self.store.get_session(session_id) {
            Some(mut existing) => {
                existing.push(user_message);
                existing
            }
            None => ChatSession::start(session_id, user_message),
        };
        self.store.upsert_session(&session)?;

        let credential = self.store.get_credential().ok_or_else(|| {
            tracing::warn!("No API key stored; message left unanswered in {}", session_id);
            SendError::MissingCredential
        })?;

        let request = self.build_request(&session);
        let response = self.client.complete(&credential, &request).await.map_err(|e| {
            tracing::error!("Completion failed for session {}: {}", session_id, e);
            SendError::from(e)
        })?;

        let content = response
            .first_content()
            .ok_or_else(|| SendError::InvalidResponse("response has no message content".to_string()))?;

        let reply = SessionMessage::assistant(content);
        session.push(reply.clone());
        self.store.upsert_session(&session)?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                "Session {}: prompt_tokens={}, completion_tokens={}",
                session_id,
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        Ok(reply)
    }

    fn build_request(&self, session: &ChatSession) -> ChatCompletionRequest {
        let messages = std::iter::once(ChatMessage::system(SYSTEM_PREAMBLE))
            .chain(
                session
                    .messages
                    .iter()
                    .map(|m| ChatMessage::new(m.role.as_str(), m.content.clone())),
            )
            .collect();

        ChatCompletionRequest {
            messages,
            model: Some(self.options.model.clone()),
            temperature: Some(self.options.temperature),
            max_tokens: Some(self.options.max_tokens),
        }
    }

    fn current_guard(&self) -> MutexGuard<'_, String> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}
