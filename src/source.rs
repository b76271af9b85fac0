//! Where transaction messages come from
pub mod kafka;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Position of one delivered message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// A message as handed out by an [EventSource]
#[derive(Debug, Clone)]
pub struct Delivery {
    pub key: Option<String>,
    pub payload: Option<Vec<u8>>,
    pub cursor: Cursor,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

/// At-least-once message source with explicit, decoupled cursor advancement
#[async_trait]
pub trait EventSource: Send {
    /// Waits at most `wait` for the next message. `Ok(None)` means nothing arrived in time.
    async fn poll(&mut self, wait: Duration) -> Result<Option<Delivery>, SourceError>;

    /// Synchronously marks every message up to and including each cursor as processed.
    /// Cursors are expected to be per-partition high watermarks.
    async fn commit(&mut self, cursors: &[Cursor]) -> Result<(), SourceError>;

    /// Lets go of the underlying subscription. Called once, after the final flush.
    fn release(&mut self) {}
}
