//! Transaction records as they travel over the topic and into storage
use serde::{Deserialize, Serialize};

/// Transactions strictly above this amount are flagged as fraud
pub const FRAUD_THRESHOLD: f64 = 3000.0;

/// Wire form of a transaction event. Anything else in the payload, `is_fraud` included, is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub transaction_id: String,
    pub user_id: i64,
    pub amount: f64,
    /// ISO-8601, passed through untouched
    pub timestamp: String,
}

/// Classified transaction, ready to be persisted
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub transaction_id: String,
    pub user_id: i64,
    pub amount: f64,
    pub timestamp: String,
    pub is_fraud: bool,
}

impl From<TransactionEvent> for Transaction {
    fn from(ev: TransactionEvent) -> Self {
        Transaction {
            is_fraud: is_fraud(ev.amount),
            transaction_id: ev.transaction_id,
            user_id: ev.user_id,
            amount: ev.amount,
            timestamp: ev.timestamp,
        }
    }
}

pub fn is_fraud(amount: f64) -> bool {
    amount > FRAUD_THRESHOLD
}
