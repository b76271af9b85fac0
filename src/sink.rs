//! Where batches end up
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::transaction::Transaction;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to connect to storage: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("{command} query failed: {error}")]
    Query {
        command: String,
        #[source]
        error: sqlx::Error,
    },
}

/// Outcome of one successful flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// rows handed to the sink
    pub rows: u64,
    /// rows that were not already stored
    pub inserted: u64,
    /// rows flagged as fraud
    pub fraud: u64,
}

/// Durable, idempotent batch storage.
///
/// A flush is all-or-nothing from the caller's point of view: on `Err` nothing in the batch
/// may be assumed persisted, and replaying a batch never duplicates rows.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn flush(&self, batch: &[Transaction]) -> Result<FlushReport, SinkError>;
}
