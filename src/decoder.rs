//! Manages decoders
pub mod json;

use thiserror::Error;

use crate::transaction::Transaction;

/// Why a single message could not be turned into a [Transaction].
/// Always scoped to one message, never fatal to the pipeline.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message has no payload")]
    EmptyPayload,
    #[error("malformed transaction payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decoder converts binary message from Kafka into a classified transaction
pub trait Decoder {
    fn get_name(&self) -> String;
    fn decode(&self, message: &[u8]) -> Result<Transaction, DecodeError>;
}
