pub mod chat;
pub mod config;
pub mod identity;
pub mod llm;
pub mod logging;
pub mod settings;
pub mod store;
pub mod test_util;

pub use chat::{ChatDispatcher, CompletionOptions, SendError, SYSTEM_PREAMBLE};
pub use config::{Config, CompletionConfig, IdentityConfig, LoggingConfig, StorageConfig};
pub use identity::{
    FailureReason, IdentityPoller, IdentityProvider, LoginError, LoginPhase, LoginState,
    LoginUpdate, OrderHandle, ProviderError, SimulatedBankId,
};
pub use llm::{CompletionClient, CompletionError, OpenAiClient};
pub use settings::{Language, Preferences};
pub use store::{SessionStore, StoreError};

use std::sync::Arc;

use regent_common::IdentityRecord;

#[derive(Debug, thiserror::Error)]
pub enum RegentError {
    #[error("Failed to open session store: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to create completion client: {0}")]
    Completion(#[from] CompletionError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ::config::ConfigError),
}

/// Wired-up client core.
///
/// The poller only reports a completed login; persisting the identity
/// record is done here, on the caller side.
pub struct Regent {
    pub config: Config,
    pub store: SessionStore,
    pub dispatcher: Arc<ChatDispatcher>,
    pub poller: IdentityPoller,
}

impl Regent {
    /// Open the configured store and use the OpenAI-compatible client with
    /// the simulated identity provider.
    pub fn new(config: Config) -> Result<Self, RegentError> {
        let store = SessionStore::open(&config.storage.database_url)?;
        let client = Arc::new(OpenAiClient::new(&config.completion)?);
        tracing::info!(
            "Regent using completion API at {} (model {})",
            client.base_url(),
            config.completion.model
        );
        Ok(Self::with_parts(
            config,
            store,
            client,
            Arc::new(SimulatedBankId::default()),
        ))
    }

    /// Load `regent.toml` and `REGENT__*` variables, install logging, and
    /// build the core from the result.
    pub fn from_env() -> Result<Self, RegentError> {
        let config = Config::load()?;
        logging::init_tracing(&config.logging.level);
        Self::new(config)
    }

    pub fn with_parts(
        config: Config,
        store: SessionStore,
        client: Arc<dyn CompletionClient>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        let dispatcher = Arc::new(ChatDispatcher::new(
            store.clone(),
            client,
            CompletionOptions::from(&config.completion),
        ));
        let poller = IdentityPoller::new(provider, &config.identity);

        Self {
            config,
            store,
            dispatcher,
            poller,
        }
    }

    /// Persist the identity of a completed login. Returns `None` while the
    /// poller is in any other state.
    pub fn finish_login(&self) -> Result<Option<IdentityRecord>, StoreError> {
        let LoginState::Completed(identity) = self.poller.state() else {
            return Ok(None);
        };
        self.store.set_identity(&identity)?;
        tracing::info!("Signed in as {}", identity.name);
        Ok(Some(identity))
    }

    /// Forget the signed-in identity and return the poller to `Idle`.
    pub fn logout(&self) -> Result<(), StoreError> {
        self.poller.cancel();
        // Already idle is fine.
        let _ = self.poller.reset();
        self.store.clear_identity()?;
        tracing::info!("Signed out");
        Ok(())
    }

    pub fn identity(&self) -> Option<IdentityRecord> {
        self.store.get_identity()
    }

    pub fn preferences(&self) -> Preferences {
        Preferences::load(&self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockCompletionClient;
    use crate::test_util::{anna, ScriptedProvider};
    use regent_common::OrderQuery;

    fn regent(provider: ScriptedProvider) -> Regent {
        Regent::with_parts(
            Config::default(),
            SessionStore::in_memory(),
            Arc::new(MockCompletionClient::new()),
            Arc::new(provider),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_login_persists_identity() {
        let regent = regent(
            ScriptedProvider::new()
                .order("o1", "t")
                .query(OrderQuery::complete(anna())),
        );
        assert_eq!(regent.finish_login().unwrap(), None);

        regent.poller.start_login("user-1").await.unwrap();
        assert_eq!(regent.finish_login().unwrap(), None);
        assert!(regent.identity().is_none());

        regent.poller.settled().await;
        assert_eq!(regent.finish_login().unwrap(), Some(anna()));
        assert_eq!(regent.identity(), Some(anna()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_clears_identity_and_resets_poller() {
        let regent = regent(
            ScriptedProvider::new()
                .order("o1", "t")
                .query(OrderQuery::complete(anna())),
        );
        regent.poller.start_login("user-1").await.unwrap();
        regent.poller.settled().await;
        regent.finish_login().unwrap();

        regent.logout().unwrap();
        assert!(regent.identity().is_none());
        assert_eq!(regent.poller.state(), LoginState::Idle);

        // Logging out while signed out is harmless.
        regent.logout().unwrap();
    }

    #[test]
    fn test_new_with_in_memory_store() {
        let mut config = Config::default();
        config.storage.database_url = ":memory:".to_string();
        let regent = Regent::new(config).unwrap();
        assert_eq!(regent.poller.state(), LoginState::Idle);
        assert!(!regent.preferences().has_credential());
    }
}
