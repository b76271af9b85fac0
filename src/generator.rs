//! Companion producer that keeps the topic fed with synthetic transactions
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::settings::Settings;
use crate::transaction::TransactionEvent;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);
/// generated timestamps fall within this many days before now
const TIMESTAMP_SPREAD_DAYS: i64 = 365;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("failed to serialize transaction: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub fn create_producer(settings: &Settings) -> Result<FutureProducer, KafkaError> {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &settings.kafka_bootstrap_servers)
        .set(
            "message.timeout.ms",
            settings.producer_delivery_timeout_ms.to_string(),
        );
    debug!("rdkafka configuration: {:?}", client_config);
    client_config.create()
}

/// A random transaction: user 1..=100, amount in [10, 5000) rounded to cents
pub fn synthetic_transaction<R: Rng>(rng: &mut R, now: DateTime<Utc>) -> TransactionEvent {
    let amount: f64 = rng.gen_range(10.0..5000.0);
    let age = ChronoDuration::seconds(rng.gen_range(0..TIMESTAMP_SPREAD_DAYS * 86400));
    TransactionEvent {
        transaction_id: Uuid::new_v4().to_string(),
        user_id: rng.gen_range(1..=100),
        amount: (amount * 100.0).round() / 100.0,
        timestamp: (now - age).format("%Y-%m-%dT%H:%M:%S").to_string(),
    }
}

/// Emits one transaction every `interval` until `shutdown` flips, then waits for
/// outstanding deliveries. Returns the number of transactions sent.
pub async fn run(
    producer: FutureProducer,
    topic: &str,
    interval: Duration,
    delivery_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<u64, GeneratorError> {
    info!(topic, "starting transaction producer");
    let mut sent = 0u64;

    while !*shutdown.borrow() {
        let tx = synthetic_transaction(&mut rand::thread_rng(), Utc::now());
        let payload = serde_json::to_vec(&tx)?;
        let record = FutureRecord::to(topic)
            .key(tx.transaction_id.as_str())
            .payload(&payload);

        match producer.send(record, Timeout::After(delivery_timeout)).await {
            Ok((partition, offset)) => {
                sent += 1;
                info!(
                    transaction_id = tx.transaction_id,
                    partition, offset, sent, "produced transaction"
                );
            }
            Err((e, _)) => {
                error!(error = %e, transaction_id = tx.transaction_id, "message failed delivery");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {}
        }
    }

    info!("stopping producer, waiting for outstanding deliveries");
    producer.flush(Timeout::After(FLUSH_TIMEOUT))?;
    info!(sent, "producer stopped");
    Ok(sent)
}
