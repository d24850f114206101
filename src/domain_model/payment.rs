use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub String);

impl PaymentId {
    pub fn generate() -> Self {
        PaymentId(format!("pay_{}", nanoid::nanoid!(20)))
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Business input of a transfer. Its serialized form is what gets fingerprinted,
/// so field names are part of the idempotency contract.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from_account: String,
    pub to_account: String,
    /// Minor currency units.
    pub amount: u64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Success => "success",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Payment {
    pub payment_id: PaymentId,
    pub from_account: String,
    pub to_account: String,
    pub amount: u64,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

/// What the client gets back, and what is cached against the idempotency key.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub success: bool,
    pub payment_id: PaymentId,
}
