use async_trait::async_trait;
use regent_common::{AuthOrder, OrderQuery};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Identity provider unreachable: {0}")]
    Transport(String),
    #[error("Identity provider rejected the request: {0}")]
    Rejected(String),
}

/// Third-party identity-assertion service (BankID or a stand-in).
///
/// Implementations only relay; the login state machine lives in
/// [`IdentityPoller`](super::IdentityPoller).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an authentication order for the given subject hint.
    async fn start_order(&self, subject_hint: &str) -> Result<AuthOrder, ProviderError>;

    /// Query the current status of an order.
    async fn query_order(&self, order_ref: &str) -> Result<OrderQuery, ProviderError>;

    /// Tell the provider an order is abandoned.
    async fn cancel_order(&self, _order_ref: &str) -> Result<(), ProviderError> {
        Ok(())
    }
}
