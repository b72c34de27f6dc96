//! Identity login: provider seam, a simulated provider and the polling
//! state machine.

mod poller;
mod provider;
mod simulated;

pub use poller::{
    FailureReason, IdentityPoller, LoginError, LoginPhase, LoginState, LoginUpdate, OrderHandle,
};
pub use provider::{IdentityProvider, ProviderError};
pub use simulated::SimulatedBankId;
