pub mod mock_openai;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use regent_common::{AuthOrder, IdentityRecord, OrderQuery};
use tokio::sync::Notify;

use crate::identity::{IdentityProvider, ProviderError};

pub fn anna() -> IdentityRecord {
    IdentityRecord {
        personal_number: "199001011234".to_string(),
        name: "Anna Andersson".to_string(),
        given_name: "Anna".to_string(),
        surname: "Andersson".to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Identity provider answering from a script.
///
/// Orders and query results are handed out in the order they were added.
/// Once the query script runs out every query answers `pending`. With
/// `hold_starts`/`hold_queries` each call parks until released, so tests can
/// act while a request is in flight.
#[derive(Default)]
pub struct ScriptedProvider {
    starts: Mutex<VecDeque<Result<AuthOrder, ProviderError>>>,
    queries: Mutex<VecDeque<Result<OrderQuery, ProviderError>>>,
    hold_starts: bool,
    hold_queries: bool,
    start_entered: Notify,
    start_release: Notify,
    query_entered: Notify,
    query_release: Notify,
    query_calls: AtomicUsize,
    start_hints: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(self, order_ref: &str, start_token: &str) -> Self {
        lock(&self.starts).push_back(Ok(AuthOrder {
            order_ref: order_ref.to_string(),
            start_token: start_token.to_string(),
        }));
        self
    }

    pub fn start_error(self, error: ProviderError) -> Self {
        lock(&self.starts).push_back(Err(error));
        self
    }

    pub fn query(self, query: OrderQuery) -> Self {
        lock(&self.queries).push_back(Ok(query));
        self
    }

    pub fn query_error(self, error: ProviderError) -> Self {
        lock(&self.queries).push_back(Err(error));
        self
    }

    pub fn hold_starts(mut self) -> Self {
        self.hold_starts = true;
        self
    }

    pub fn hold_queries(mut self) -> Self {
        self.hold_queries = true;
        self
    }

    /// Resolves once a held `start_order` call is parked.
    pub async fn start_entered(&self) {
        self.start_entered.notified().await;
    }

    pub fn release_start(&self) {
        self.start_release.notify_one();
    }

    /// Resolves once a held `query_order` call is parked.
    pub async fn query_entered(&self) {
        self.query_entered.notified().await;
    }

    pub fn release_query(&self) {
        self.query_release.notify_one();
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn start_hints(&self) -> Vec<String> {
        lock(&self.start_hints).clone()
    }

    pub fn cancelled_orders(&self) -> Vec<String> {
        lock(&self.cancelled).clone()
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    async fn start_order(&self, subject_hint: &str) -> Result<AuthOrder, ProviderError> {
        lock(&self.start_hints).push(subject_hint.to_string());
        if self.hold_starts {
            self.start_entered.notify_one();
            self.start_release.notified().await;
        }
        lock(&self.starts)
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Rejected("no scripted order".to_string())))
    }

    async fn query_order(&self, _order_ref: &str) -> Result<OrderQuery, ProviderError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_queries {
            self.query_entered.notify_one();
            self.query_release.notified().await;
        }
        lock(&self.queries)
            .pop_front()
            .unwrap_or_else(|| Ok(OrderQuery::pending(None)))
    }

    async fn cancel_order(&self, order_ref: &str) -> Result<(), ProviderError> {
        lock(&self.cancelled).push(order_ref.to_string());
        Ok(())
    }
}
