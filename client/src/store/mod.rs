//! Local persistence for chat sessions, the identity record and preferences.
//!
//! Everything is kept as JSON strings in a flat key-value backend. Corrupt or
//! missing entries read as empty/absent and are never fatal.

mod memory;
mod sqlite;

pub use memory::MemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;

use std::sync::Arc;

use regent_common::{ChatSession, IdentityRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::settings::Language;

/// Storage keys of the persisted layout.
pub mod keys {
    pub const CHAT_HISTORY: &str = "regent_chat_history";
    pub const IDENTITY: &str = "regent_bankid_user";
    pub const CREDENTIAL: &str = "regent_api_key";
    pub const LANGUAGE: &str = "regent_language";
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Flat string key-value backend.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Typed access to the persisted layout.
///
/// Last write wins. Callers serialize read-modify-write per session.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Store backed by a fresh in-memory map.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKeyValueStore::new()))
    }

    /// Open the backend named by a database URL (`sqlite:<path>`, a path, or `:memory:`).
    pub fn open(database_url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(SqliteKeyValueStore::open(database_url)?)))
    }

    // Sessions

    pub fn list_sessions(&self) -> Vec<ChatSession> {
        self.read_sessions().unwrap_or_else(|e| {
            tracing::warn!("Failed to read chat history: {}", e);
            Vec::new()
        })
    }

    pub fn get_session(&self, id: &str) -> Option<ChatSession> {
        self.list_sessions().into_iter().find(|s| s.id == id)
    }

    /// Replace the session with the same id, or append it.
    pub fn upsert_session(&self, session: &ChatSession) -> Result<(), StoreError> {
        let mut sessions = self.read_sessions()?;
        match sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session.clone(),
            None => sessions.push(session.clone()),
        }
        self.write_json(keys::CHAT_HISTORY, &sessions)?;
        tracing::debug!(
            "Saved session {} ({} messages)",
            session.id,
            session.messages.len()
        );
        Ok(())
    }

    /// Remove a session. Deleting an unknown id is not an error.
    pub fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        let mut sessions = self.read_sessions()?;
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        if sessions.len() != before {
            self.write_json(keys::CHAT_HISTORY, &sessions)?;
            tracing::debug!("Deleted session {}", id);
        }
        Ok(())
    }

    fn read_sessions(&self) -> Result<Vec<ChatSession>, StoreError> {
        Ok(self.read_json(keys::CHAT_HISTORY)?.unwrap_or_default())
    }

    // Identity

    pub fn get_identity(&self) -> Option<IdentityRecord> {
        self.read_slot(keys::IDENTITY)
    }

    pub fn set_identity(&self, record: &IdentityRecord) -> Result<(), StoreError> {
        self.write_json(keys::IDENTITY, record)
    }

    pub fn clear_identity(&self) -> Result<(), StoreError> {
        self.backend.remove(keys::IDENTITY)
    }

    // Preferences

    pub fn get_credential(&self) -> Option<String> {
        self.read_slot::<String>(keys::CREDENTIAL)
            .filter(|key| !key.trim().is_empty())
    }

    pub fn set_credential(&self, credential: &str) -> Result<(), StoreError> {
        self.write_json(keys::CREDENTIAL, &credential)
    }

    pub fn clear_credential(&self) -> Result<(), StoreError> {
        self.backend.remove(keys::CREDENTIAL)
    }

    pub fn get_language(&self) -> Option<Language> {
        self.read_slot::<String>(keys::LANGUAGE)
            .and_then(|code| code.parse().ok())
    }

    pub fn set_language(&self, language: Language) -> Result<(), StoreError> {
        self.write_json(keys::LANGUAGE, &language.code())
    }

    // Helpers

    fn read_slot<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.read_json(key).unwrap_or_else(|e| {
            tracing::warn!("Failed to read {}: {}", key, e);
            None
        })
    }

    /// Backend failures are errors; a corrupt value reads as absent.
    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.backend.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("Ignoring corrupt entry {}: {}", key, e);
                Ok(None)
            }
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        self.backend.set(key, &json)
    }
}
