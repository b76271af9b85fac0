use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::batch::{Batch, Drained};
use crate::decoder::{DecodeError, Decoder};
use crate::retry::RetryPolicy;
use crate::sink::{Sink, SinkError};
use crate::source::{Cursor, Delivery, EventSource};
use crate::trigger::{FlushReason, FlushTrigger};

const SOURCE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("giving up on batch of {rows} rows after {attempts} attempts: {source}")]
    SinkExhausted {
        rows: usize,
        attempts: u32,
        #[source]
        source: SinkError,
    },
}

/// Running totals of one ingester
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// messages decoded into transactions
    pub consumed: u64,
    /// messages dropped because they could not be decoded
    pub discarded: u64,
    pub size_flushes: u64,
    pub timeout_flushes: u64,
    pub shutdown_flushes: u64,
    pub failed_flush_attempts: u64,
    /// rows handed to the sink in successful flushes
    pub persisted: u64,
    /// rows the sink reported as new
    pub inserted: u64,
    pub fraud: u64,
}

impl IngestStats {
    pub fn flushes(&self) -> u64 {
        self.size_flushes + self.timeout_flushes + self.shutdown_flushes
    }
}

/// Pipeline driver: polls the source, decodes, batches, flushes to the sink and commits
/// offsets only for messages whose batch has been persisted.
pub struct Ingester<S, K, D> {
    source: S,
    sink: K,
    decoder: D,
    batch: Batch,
    trigger: FlushTrigger,
    poll_timeout: Duration,
    retry: RetryPolicy,
    stats: IngestStats,
}

impl<S, K, D> Ingester<S, K, D>
where
    S: EventSource,
    K: Sink,
    D: Decoder,
{
    pub fn new(
        source: S,
        sink: K,
        decoder: D,
        batch_size: usize,
        poll_timeout: Duration,
        flush_timeout: Duration,
        retry: RetryPolicy,
    ) -> Ingester<S, K, D> {
        Ingester {
            source,
            sink,
            decoder,
            batch: Batch::new(batch_size),
            trigger: FlushTrigger::new(flush_timeout),
            poll_timeout,
            retry,
            stats: IngestStats::default(),
        }
    }

    /// Runs until `shutdown` flips to true or a flush fails for good. Either way, whatever is
    /// still buffered gets one last flush before the source is released.
    pub async fn run(mut self, shutdown: watch::Receiver<bool>) -> Result<IngestStats, IngestError> {
        info!(decoder = self.decoder.get_name(), "starting ingester");

        let outcome = loop {
            if *shutdown.borrow() {
                info!("shutdown requested, stopping ingester");
                break Ok(());
            }

            match self.source.poll(self.poll_timeout).await {
                Err(e) => {
                    warn!(error = %e, "error receiving message");
                    sleep(SOURCE_ERROR_BACKOFF).await;
                    // no message arrived, so a stale batch is due just like on an idle poll
                    if let Err(e) = self.flush_if_stale().await {
                        break Err(e);
                    }
                }
                Ok(None) => {
                    if let Err(e) = self.flush_if_stale().await {
                        break Err(e);
                    }
                }
                Ok(Some(delivery)) => {
                    if let Some(reason) = self.accept(delivery).await {
                        if let Err(e) = self.flush(reason).await {
                            break Err(e);
                        }
                    }
                }
            }
        };

        if let Err(e) = &outcome {
            error!(error = %e, "unrecoverable pipeline failure, shutting down");
        }
        let drained = if self.batch.is_empty() {
            Ok(())
        } else {
            self.flush(FlushReason::Shutdown).await
        };
        self.source.release();

        info!(
            consumed = self.stats.consumed,
            discarded = self.stats.discarded,
            flushes = self.stats.flushes(),
            persisted = self.stats.persisted,
            fraud = self.stats.fraud,
            "ingester stopped"
        );
        outcome.and(drained).map(|_| self.stats)
    }

    /// Timeout arm of the trigger, only consulted when a poll brought no message
    async fn flush_if_stale(&mut self) -> Result<(), IngestError> {
        match self.trigger.when_idle(Instant::now(), self.batch.len()) {
            Some(reason) => {
                info!(rows = self.batch.len(), "timeout reached, flushing partial batch");
                self.flush(reason).await
            }
            None => Ok(()),
        }
    }

    /// Decodes one delivery into the batch. Returns the reason to flush, if any.
    async fn accept(&mut self, delivery: Delivery) -> Option<FlushReason> {
        let decoded = match &delivery.payload {
            Some(payload) => self.decoder.decode(payload),
            None => Err(DecodeError::EmptyPayload),
        };

        match decoded {
            Ok(tx) => {
                self.stats.consumed += 1;
                if tx.is_fraud {
                    info!(
                        transaction_id = tx.transaction_id,
                        amount = tx.amount,
                        "consumed fraudulent transaction"
                    );
                } else {
                    debug!(
                        transaction_id = tx.transaction_id,
                        amount = tx.amount,
                        "consumed transaction"
                    );
                }
                let full = self.batch.append(tx, delivery.cursor);
                self.trigger.after_append(full)
            }
            Err(e) => {
                self.stats.discarded += 1;
                warn!(
                    error = %e,
                    key = delivery.key.as_deref().unwrap_or_default(),
                    partition = delivery.cursor.partition,
                    offset = delivery.cursor.offset,
                    "failed to decode message, skipping"
                );
                // redelivery cannot fix a malformed message, but its offset must not
                // overtake rows that are still waiting to be flushed
                if self.batch.is_empty() {
                    self.commit(std::slice::from_ref(&delivery.cursor)).await;
                } else {
                    self.batch.defer_ack(delivery.cursor);
                }
                None
            }
        }
    }

    /// Moves the buffered rows to the sink, retrying with backoff, and commits their offsets
    /// once they are stored. If every attempt fails the rows go back into the batch uncommitted.
    async fn flush(&mut self, reason: FlushReason) -> Result<(), IngestError> {
        let drained: Drained = self.batch.drain();
        self.trigger.reset(Instant::now());
        let rows = drained.transactions.len();

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.sink.flush(&drained.transactions).await {
                Ok(report) => {
                    info!(%reason, rows, inserted = report.inserted, "saved batch");
                    match reason {
                        FlushReason::Size => self.stats.size_flushes += 1,
                        FlushReason::Timeout => self.stats.timeout_flushes += 1,
                        FlushReason::Shutdown => self.stats.shutdown_flushes += 1,
                    }
                    self.stats.persisted += report.rows;
                    self.stats.inserted += report.inserted;
                    self.stats.fraud += report.fraud;
                    self.commit(&drained.acks.watermarks()).await;
                    return Ok(());
                }
                Err(e) => {
                    self.stats.failed_flush_attempts += 1;
                    if !self.retry.should_retry(attempts) {
                        self.batch.restore(drained);
                        return Err(IngestError::SinkExhausted {
                            rows,
                            attempts,
                            source: e,
                        });
                    }
                    let backoff = self.retry.time_until_next_retry(attempts);
                    warn!(
                        error = %e,
                        %reason,
                        rows,
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "inserting batch failed, retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }

    async fn commit(&mut self, cursors: &[Cursor]) {
        // rows are already stored; a lost commit only means an idempotent redelivery
        if let Err(e) = self.source.commit(cursors).await {
            warn!(error = %e, partitions = cursors.len(), "failed to commit offsets");
        }
    }
}
