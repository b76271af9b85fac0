use std::time::Duration;

use async_trait::async_trait;
use rdkafka::{
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::KafkaError,
    ClientConfig, Message, Offset, TopicPartitionList,
};
use tracing::{debug, info};

use super::{Cursor, Delivery, EventSource, SourceError};
use crate::settings::Settings;

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Single-topic Kafka consumer that never commits on its own
pub struct KafkaSource {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaSource {
    pub fn new(settings: &Settings) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &settings.kafka_bootstrap_servers)
            .set("group.id", &settings.consumer_group)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest");
        debug!("rdkafka configuration: {:?}", client_config);

        let consumer: StreamConsumer = client_config.create()?;
        // fail fast if the brokers cannot be reached at all
        consumer.fetch_metadata(Some(settings.topic.as_str()), METADATA_TIMEOUT)?;
        consumer.subscribe(&[settings.topic.as_str()])?;
        info!(
            topic = settings.topic,
            group_id = settings.consumer_group,
            "kafka consumer subscribed"
        );

        Ok(KafkaSource {
            consumer,
            topic: settings.topic.clone(),
        })
    }
}

#[async_trait]
impl EventSource for KafkaSource {
    async fn poll(&mut self, wait: Duration) -> Result<Option<Delivery>, SourceError> {
        match tokio::time::timeout(wait, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(SourceError::Kafka(e)),
            Ok(Ok(msg)) => Ok(Some(Delivery {
                key: msg.key().map(|k| String::from_utf8_lossy(k).into_owned()),
                payload: msg.payload().map(<[u8]>::to_vec),
                cursor: Cursor {
                    topic: msg.topic().to_string(),
                    partition: msg.partition(),
                    offset: msg.offset(),
                },
            })),
        }
    }

    async fn commit(&mut self, cursors: &[Cursor]) -> Result<(), SourceError> {
        if cursors.is_empty() {
            return Ok(());
        }
        let mut tpl = TopicPartitionList::new();
        for c in cursors {
            // committing _next_ message offset as per https://docs.rs/rdkafka/latest/rdkafka/consumer/trait.Consumer.html#tymethod.commit
            tpl.add_partition_offset(&c.topic, c.partition, Offset::Offset(c.offset + 1))?;
        }
        self.consumer.commit(&tpl, CommitMode::Sync)?;
        debug!(partitions = cursors.len(), "committed offsets");
        Ok(())
    }

    fn release(&mut self) {
        self.consumer.unsubscribe();
        info!(topic = self.topic, "kafka consumer released");
    }
}
