//! Identity assertion types exchanged with an identity provider.

use serde::{Deserialize, Serialize};

/// Verified personal-name attributes returned by a completed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    /// Opaque subject identifier (the personal number for BankID).
    pub personal_number: String,
    /// Display name.
    pub name: String,
    pub given_name: String,
    pub surname: String,
}

/// An authentication order created by the identity provider.
///
/// Lives only as long as one login attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOrder {
    /// Server-assigned reference used for status queries.
    pub order_ref: String,
    /// Client-visible token for launching the authenticator app.
    pub start_token: String,
}

impl AuthOrder {
    /// Deep link that opens the authenticator app on the same device.
    pub fn launch_url(&self) -> String {
        format!("bankid:///?autostarttoken={}&redirect=null", self.start_token)
    }
}

/// Order status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Complete,
    Failed,
}

/// Result of one order status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuery {
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityRecord>,
}

impl OrderQuery {
    pub fn pending(hint_code: Option<&str>) -> Self {
        Self {
            status: OrderStatus::Pending,
            hint_code: hint_code.map(String::from),
            identity: None,
        }
    }

    pub fn complete(identity: IdentityRecord) -> Self {
        Self {
            status: OrderStatus::Complete,
            hint_code: None,
            identity: Some(identity),
        }
    }

    pub fn failed(hint_code: &str) -> Self {
        Self {
            status: OrderStatus::Failed,
            hint_code: Some(hint_code.to_string()),
            identity: None,
        }
    }
}
