//! Simulated BankID provider.
//!
//! Generates random order references and start tokens, reports a few pending
//! polls, then completes with a configured identity. No signature or OCSP
//! verification happens anywhere.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rand::RngCore;
use regent_common::{AuthOrder, IdentityRecord, OrderQuery};

use super::{IdentityProvider, ProviderError};

const HINT_OUTSTANDING: &str = "outstandingTransaction";
const HINT_USER_SIGN: &str = "userSign";

struct SimulatedOrder {
    subject: String,
    polls: u32,
    cancelled: bool,
}

pub struct SimulatedBankId {
    pending_polls: u32,
    given_name: String,
    surname: String,
    orders: Mutex<HashMap<String, SimulatedOrder>>,
}

impl SimulatedBankId {
    /// Orders answer `pending` `pending_polls` times, then complete.
    pub fn new(pending_polls: u32) -> Self {
        Self {
            pending_polls,
            given_name: "Test".to_string(),
            surname: "Testsson".to_string(),
            orders: Mutex::new(HashMap::new()),
        }
    }

    /// Names reported for every completed order.
    pub fn with_name(mut self, given_name: &str, surname: &str) -> Self {
        self.given_name = given_name.to_string();
        self.surname = surname.to_string();
        self
    }

    fn orders(&self) -> MutexGuard<'_, HashMap<String, SimulatedOrder>> {
        self.orders.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn identity_for(&self, subject: &str) -> IdentityRecord {
        IdentityRecord {
            personal_number: subject.chars().filter(|c| c.is_ascii_digit()).collect(),
            name: format!("{} {}", self.given_name, self.surname),
            given_name: self.given_name.clone(),
            surname: self.surname.clone(),
        }
    }
}

impl Default for SimulatedBankId {
    fn default() -> Self {
        Self::new(1)
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[async_trait]
impl IdentityProvider for SimulatedBankId {
    async fn start_order(&self, subject_hint: &str) -> Result<AuthOrder, ProviderError> {
        let subject = subject_hint.trim();
        if subject.is_empty() {
            return Err(ProviderError::Rejected(
                "Please enter your personal number".to_string(),
            ));
        }

        let order = AuthOrder {
            order_ref: uuid::Uuid::new_v4().to_string(),
            start_token: random_token(),
        };
        self.orders().insert(
            order.order_ref.clone(),
            SimulatedOrder {
                subject: subject.to_string(),
                polls: 0,
                cancelled: false,
            },
        );
        tracing::debug!("Simulated BankID order {} created", order.order_ref);
        Ok(order)
    }

    async fn query_order(&self, order_ref: &str) -> Result<OrderQuery, ProviderError> {
        let mut orders = self.orders();
        let order = orders
            .get_mut(order_ref)
            .ok_or_else(|| ProviderError::Rejected(format!("Unknown order: {}", order_ref)))?;

        if order.cancelled {
            orders.remove(order_ref);
            return Ok(OrderQuery::failed("userCancel"));
        }

        if order.polls < self.pending_polls {
            let hint = if order.polls == 0 {
                HINT_OUTSTANDING
            } else {
                HINT_USER_SIGN
            };
            order.polls += 1;
            return Ok(OrderQuery::pending(Some(hint)));
        }

        let identity = self.identity_for(&order.subject);
        orders.remove(order_ref);
        Ok(OrderQuery::complete(identity))
    }

    async fn cancel_order(&self, order_ref: &str) -> Result<(), ProviderError> {
        if let Some(order) = self.orders().get_mut(order_ref) {
            order.cancelled = true;
        }
        Ok(())
    }
}
