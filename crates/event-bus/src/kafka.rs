//! Kafka backend.
//!
//! Producer writes `{key: order id, value: JSON}` with `acks=all`; the
//! consumer commits offsets manually after each record is handled.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{debug, info};

use crate::bus::{BusRecord, EventPublisher, EventSubscriber};
use crate::{BusError, Result};

/// Connection settings for Kafka.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma-separated bootstrap servers.
    pub brokers: String,
    pub group_id: Option<String>,
    pub topics: Vec<String>,
    pub message_timeout: Duration,
}

impl KafkaConfig {
    pub fn publisher(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: None,
            topics: Vec::new(),
            message_timeout: Duration::from_secs(5),
        }
    }

    pub fn subscriber(
        brokers: impl Into<String>,
        group_id: impl Into<String>,
        topics: &[&str],
    ) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: Some(group_id.into()),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            message_timeout: Duration::from_secs(5),
        }
    }

    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.brokers);
        config.set(
            "message.timeout.ms",
            self.message_timeout.as_millis().to_string(),
        );
        config.set("acks", "all");
        config.set("enable.idempotence", "true");
        config
    }

    fn consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.brokers);
        config.set("enable.auto.commit", "false");
        config.set("auto.offset.reset", "earliest");
        if let Some(ref group_id) = self.group_id {
            config.set("group.id", group_id);
        }
        config
    }
}

/// Kafka producer.
pub struct KafkaPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = config
            .producer_config()
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka producer: {e}")))?;
        info!(brokers = %config.brokers, "Kafka producer ready");
        Ok(Self {
            producer,
            timeout: config.message_timeout,
        })
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<()> {
        let record = FutureRecord::to(topic).key(key).payload(&payload);
        let (partition, offset) = self
            .producer
            .send(record, self.timeout)
            .await
            .map_err(|(e, _)| BusError::Publish(format!("Failed to publish: {e}")))?;
        debug!(topic, key, partition, offset, "Published to Kafka");
        Ok(())
    }
}

/// Kafka consumer-group member.
pub struct KafkaSubscriber {
    consumer: StreamConsumer,
}

impl KafkaSubscriber {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        if config.group_id.is_none() {
            return Err(BusError::Subscribe(
                "a consumer group is required to subscribe".to_string(),
            ));
        }
        let consumer: StreamConsumer = config
            .consumer_config()
            .create()
            .map_err(|e| BusError::Connection(format!("Failed to create Kafka consumer: {e}")))?;

        let topics: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topics)
            .map_err(|e| BusError::Subscribe(format!("Failed to subscribe: {e}")))?;
        info!(topics = ?config.topics, group = ?config.group_id, "Subscribed to Kafka topics");

        Ok(Self { consumer })
    }

    fn to_record(message: &impl Message) -> BusRecord {
        BusRecord {
            topic: message.topic().to_string(),
            key: message
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            partition: message.partition(),
            offset: message.offset(),
        }
    }
}

#[async_trait]
impl EventSubscriber for KafkaSubscriber {
    async fn poll(&self, max: usize, timeout: Duration) -> Result<Vec<BusRecord>> {
        let mut batch = Vec::new();

        // Block for the first record, then drain whatever is already buffered.
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => return Ok(batch),
            Ok(Err(e)) => return Err(BusError::Broker(e.to_string())),
            Ok(Ok(message)) => batch.push(Self::to_record(&message)),
        }

        while batch.len() < max {
            match tokio::time::timeout(Duration::from_millis(1), self.consumer.recv()).await {
                Ok(Ok(message)) => batch.push(Self::to_record(&message)),
                Ok(Err(e)) => return Err(BusError::Broker(e.to_string())),
                Err(_) => break,
            }
        }
        Ok(batch)
    }

    async fn commit(&self, record: &BusRecord) -> Result<()> {
        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&record.topic, record.partition, Offset::Offset(record.offset + 1))
            .map_err(|e| BusError::Commit(e.to_string()))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| BusError::Commit(e.to_string()))
    }
}
