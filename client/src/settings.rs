//! User preferences: the completion API credential and the UI language.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::logging::mask_secret;
use crate::store::{SessionStore, StoreError};

/// Supported UI languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Sv,
    Fr,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::En, Language::Sv, Language::Fr];

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Sv => "sv",
            Language::Fr => "fr",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported language code: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|lang| lang.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

/// Process-wide preferences with an explicit load/save lifecycle.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    pub credential: Option<String>,
    pub language: Language,
}

impl Preferences {
    /// Read preferences from the store. Missing or unknown values fall back to defaults.
    pub fn load(store: &SessionStore) -> Self {
        Self {
            credential: store.get_credential(),
            language: store.get_language().unwrap_or_default(),
        }
    }

    /// Write preferences back. A `None` credential clears the stored one.
    pub fn save(&self, store: &SessionStore) -> Result<(), StoreError> {
        match self.credential.as_deref() {
            Some(credential) => store.set_credential(credential)?,
            None => store.clear_credential()?,
        }
        store.set_language(self.language)?;
        tracing::debug!("Saved preferences: {:?}", self);
        Ok(())
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }
}

impl fmt::Debug for Preferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preferences")
            .field("credential", &self.credential.as_deref().map(mask_secret))
            .field("language", &self.language)
            .finish()
    }
}
