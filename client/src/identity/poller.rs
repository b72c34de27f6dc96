//! Login state machine for a third-party identity-assertion flow.
//!
//! ```text
//! Idle -> Starting -> Polling -> Completed
//!                        |-----> Failed
//! Starting | Polling -> Cancelled
//! ```
//!
//! Each attempt owns at most one polling task. Every provider result is
//! applied under the poller lock, and only if its attempt is still the
//! current one in the phase that issued it; anything else is stale and
//! dropped.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use regent_common::{AuthOrder, IdentityRecord, OrderQuery, OrderStatus};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::IdentityConfig;

use super::{IdentityProvider, ProviderError};

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Phase of the login state machine, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPhase {
    Idle,
    Starting,
    Polling,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for LoginPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginPhase::Idle => "idle",
            LoginPhase::Starting => "starting",
            LoginPhase::Polling => "polling",
            LoginPhase::Completed => "completed",
            LoginPhase::Failed => "failed",
            LoginPhase::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Why a login attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The provider could not create the order.
    StartFailed(String),
    /// The provider reported the order as failed.
    Provider { hint_code: String },
    /// A status query could not be completed.
    Transport(String),
    /// The provider reported completion without an identity.
    MissingIdentity,
    /// The order stayed pending past the configured deadline.
    Expired,
}

impl FailureReason {
    /// Stable reason code for display and logs.
    pub fn code(&self) -> &str {
        match self {
            FailureReason::StartFailed(_) => "startFailed",
            FailureReason::Provider { hint_code } => hint_code,
            FailureReason::Transport(_) => "transportError",
            FailureReason::MissingIdentity => "missingIdentity",
            FailureReason::Expired => "expiredTransaction",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::StartFailed(msg) | FailureReason::Transport(msg) => {
                write!(f, "{}: {}", self.code(), msg)
            }
            _ => f.write_str(self.code()),
        }
    }
}

/// Observable state of an [`IdentityPoller`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    Starting,
    Polling {
        order_ref: String,
        /// Latest hint from the provider, e.g. `outstandingTransaction`.
        hint_code: Option<String>,
    },
    Completed(IdentityRecord),
    Failed(FailureReason),
    Cancelled,
}

impl LoginState {
    pub fn phase(&self) -> LoginPhase {
        match self {
            LoginState::Idle => LoginPhase::Idle,
            LoginState::Starting => LoginPhase::Starting,
            LoginState::Polling { .. } => LoginPhase::Polling,
            LoginState::Completed(_) => LoginPhase::Completed,
            LoginState::Failed(_) => LoginPhase::Failed,
            LoginState::Cancelled => LoginPhase::Cancelled,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, LoginState::Starting | LoginState::Polling { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoginState::Completed(_) | LoginState::Failed(_) | LoginState::Cancelled
        )
    }

    pub fn identity(&self) -> Option<&IdentityRecord> {
        match self {
            LoginState::Completed(identity) => Some(identity),
            _ => None,
        }
    }
}

/// One reported transition.
#[derive(Debug, Clone)]
pub struct LoginUpdate {
    pub attempt: u64,
    pub state: LoginState,
}

/// Returned by a successful [`IdentityPoller::start_login`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderHandle {
    pub attempt: u64,
    pub order: AuthOrder,
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("A login attempt is already in progress")]
    AttemptInProgress,
    #[error("Login can only be reset from a terminal state (currently {0})")]
    NotTerminal(LoginPhase),
    #[error("Login attempt was cancelled")]
    Cancelled,
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

struct Inner {
    state: LoginState,
    attempt: u64,
    order: Option<AuthOrder>,
    task: Option<JoinHandle<()>>,
}

impl Inner {
    fn is_current(&self, attempt: u64, phase: LoginPhase) -> bool {
        self.attempt == attempt && self.state.phase() == phase
    }

    fn settle(&mut self) {
        self.order = None;
        // Detach rather than abort: the finishing task may be the caller.
        self.task = None;
    }
}

struct Shared {
    provider: Arc<dyn IdentityProvider>,
    poll_interval: Duration,
    order_timeout: Duration,
    inner: Mutex<Inner>,
    updates: broadcast::Sender<LoginUpdate>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, inner: &mut Inner, state: LoginState) {
        tracing::debug!(
            attempt = inner.attempt,
            "Login {} -> {}",
            inner.state.phase(),
            state.phase()
        );
        inner.state = state.clone();
        // No subscribers is fine.
        let _ = self.updates.send(LoginUpdate {
            attempt: inner.attempt,
            state,
        });
    }

    /// Apply one query result. Returns true when polling should continue.
    fn apply_query(
        &self,
        attempt: u64,
        order_ref: &str,
        deadline: Option<Instant>,
        result: Result<OrderQuery, ProviderError>,
    ) -> bool {
        let mut inner = self.lock();
        if !inner.is_current(attempt, LoginPhase::Polling) {
            tracing::debug!(attempt, "Discarding stale status for order {}", order_ref);
            return false;
        }

        let next = match result {
            Err(e) => {
                tracing::error!(attempt, "Status query for order {} failed: {}", order_ref, e);
                LoginState::Failed(FailureReason::Transport(e.to_string()))
            }
            Ok(query) => match query.status {
                OrderStatus::Pending if deadline.is_some_and(|d| Instant::now() >= d) => {
                    tracing::warn!(attempt, "Order {} expired while pending", order_ref);
                    LoginState::Failed(FailureReason::Expired)
                }
                OrderStatus::Pending => {
                    self.transition(
                        &mut inner,
                        LoginState::Polling {
                            order_ref: order_ref.to_string(),
                            hint_code: query.hint_code,
                        },
                    );
                    return true;
                }
                OrderStatus::Complete => match query.identity {
                    Some(identity) => {
                        tracing::info!(attempt, "Login completed for order {}", order_ref);
                        LoginState::Completed(identity)
                    }
                    None => LoginState::Failed(FailureReason::MissingIdentity),
                },
                OrderStatus::Failed => {
                    let hint_code = query.hint_code.unwrap_or_else(|| "unknown".to_string());
                    tracing::info!(attempt, "Order {} failed: {}", order_ref, hint_code);
                    LoginState::Failed(FailureReason::Provider { hint_code })
                }
            },
        };

        inner.settle();
        self.transition(&mut inner, next);
        false
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = inner.task.take() {
            task.abort();
        }
    }
}

/// Owns the login lifecycle for one identity flow.
///
/// Cloning yields another handle to the same state machine. The polling task
/// stops once the last handle is dropped.
#[derive(Clone)]
pub struct IdentityPoller {
    shared: Arc<Shared>,
}

impl IdentityPoller {
    pub fn new(provider: Arc<dyn IdentityProvider>, config: &IdentityConfig) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                provider,
                poll_interval: config.poll_interval(),
                order_timeout: config.order_timeout(),
                inner: Mutex::new(Inner {
                    state: LoginState::Idle,
                    attempt: 0,
                    order: None,
                    task: None,
                }),
                updates,
            }),
        }
    }

    pub fn state(&self) -> LoginState {
        self.shared.lock().state.clone()
    }

    /// Number of the latest attempt (0 before the first one).
    pub fn attempt(&self) -> u64 {
        self.shared.lock().attempt
    }

    /// Order of the attempt in progress, if one has been created.
    pub fn current_order(&self) -> Option<AuthOrder> {
        self.shared.lock().order.clone()
    }

    /// Receive every transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LoginUpdate> {
        self.shared.updates.subscribe()
    }

    /// Create an order and start polling it.
    ///
    /// Fails with [`LoginError::AttemptInProgress`] while another attempt is
    /// starting or polling; cancel it first.
    ///
    /// Dropping the returned future before it resolves cancels the attempt.
    /// An order the provider creates after that point is never seen here and
    /// is left to expire at the provider.
    pub async fn start_login(&self, subject_hint: &str) -> Result<OrderHandle, LoginError> {
        let attempt = {
            let mut inner = self.shared.lock();
            if inner.state.is_active() {
                return Err(LoginError::AttemptInProgress);
            }
            inner.attempt += 1;
            inner.order = None;
            self.shared.transition(&mut inner, LoginState::Starting);
            inner.attempt
        };

        tracing::info!(attempt, "Starting identity login");
        let mut guard = StartGuard {
            shared: &self.shared,
            attempt,
            armed: true,
        };
        let result = self.shared.provider.start_order(subject_hint).await;
        guard.armed = false;

        let mut inner = self.shared.lock();
        if !inner.is_current(attempt, LoginPhase::Starting) {
            tracing::warn!(attempt, "Login attempt cancelled while the order was being created");
            if let Ok(order) = result {
                spawn_cancel_order(self.shared.provider.clone(), order.order_ref);
            }
            return Err(LoginError::Cancelled);
        }

        let order = match result {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(attempt, "Failed to create login order: {}", e);
                self.shared.transition(
                    &mut inner,
                    LoginState::Failed(FailureReason::StartFailed(e.to_string())),
                );
                return Err(LoginError::Provider(e));
            }
        };

        inner.order = Some(order.clone());
        self.shared.transition(
            &mut inner,
            LoginState::Polling {
                order_ref: order.order_ref.clone(),
                hint_code: None,
            },
        );

        // A timeout too large to represent never expires.
        let deadline = Instant::now().checked_add(self.shared.order_timeout);
        let task = tokio::spawn(poll_order(
            Arc::downgrade(&self.shared),
            attempt,
            order.order_ref.clone(),
            self.shared.poll_interval,
            deadline,
        ));
        inner.task = Some(task);

        Ok(OrderHandle { attempt, order })
    }

    /// Abandon the attempt in progress. Returns false when there was none.
    pub fn cancel(&self) -> bool {
        let mut inner = self.shared.lock();
        if !inner.state.is_active() {
            return false;
        }

        if let Some(task) = inner.task.take() {
            task.abort();
        }
        if let Some(order) = inner.order.take() {
            spawn_cancel_order(self.shared.provider.clone(), order.order_ref);
        }
        tracing::info!(attempt = inner.attempt, "Login cancelled");
        self.shared.transition(&mut inner, LoginState::Cancelled);
        true
    }

    /// Return to `Idle` after a terminal state.
    pub fn reset(&self) -> Result<(), LoginError> {
        let mut inner = self.shared.lock();
        if !inner.state.is_terminal() {
            return Err(LoginError::NotTerminal(inner.state.phase()));
        }
        self.shared.transition(&mut inner, LoginState::Idle);
        Ok(())
    }

    /// Wait until the current attempt reaches a terminal state and return it.
    ///
    /// Returns immediately when the poller is idle or already terminal.
    pub async fn settled(&self) -> LoginState {
        let mut updates = self.subscribe();
        loop {
            let state = self.state();
            if !state.is_active() {
                return state;
            }
            match updates.recv().await {
                Ok(update) if update.state.is_terminal() => return update.state,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return self.state(),
            }
        }
    }
}

/// Moves an attempt still in `Starting` to `Cancelled` if `start_login` is
/// dropped mid-flight.
struct StartGuard<'a> {
    shared: &'a Shared,
    attempt: u64,
    armed: bool,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.shared.lock();
        if inner.is_current(self.attempt, LoginPhase::Starting) {
            tracing::warn!(
                attempt = self.attempt,
                "Login start abandoned before the order was created"
            );
            self.shared.transition(&mut inner, LoginState::Cancelled);
        }
    }
}

async fn poll_order(
    shared: Weak<Shared>,
    attempt: u64,
    order_ref: String,
    interval: Duration,
    deadline: Option<Instant>,
) {
    loop {
        tokio::time::sleep(interval).await;

        let provider = match shared.upgrade() {
            Some(strong) => {
                if !strong.lock().is_current(attempt, LoginPhase::Polling) {
                    return;
                }
                strong.provider.clone()
            }
            None => return,
        };

        tracing::debug!(attempt, "Querying order {}", order_ref);
        let result = provider.query_order(&order_ref).await;

        let Some(strong) = shared.upgrade() else {
            return;
        };
        if !strong.apply_query(attempt, &order_ref, deadline, result) {
            return;
        }
    }
}

fn spawn_cancel_order(provider: Arc<dyn IdentityProvider>, order_ref: String) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                if let Err(e) = provider.cancel_order(&order_ref).await {
                    tracing::warn!("Failed to cancel order {} at provider: {}", order_ref, e);
                }
            });
        }
        Err(_) => {
            tracing::debug!("No runtime available; order {} left to expire", order_ref);
        }
    }
}
