//! Kafka publisher
//!
//! Thin wrapper over an rdkafka `FutureProducer`. `send` resolves once
//! the broker acknowledges the record, so backpressure propagates to
//! the feed groups naturally. Retries and batching stay in librdkafka.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{PublishError, Publisher};

pub const PUBLISHER_TYPE: &str = "kafka";

const MESSAGE_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KafkaConfig {
    /// Broker addresses, host:port.
    pub brokers: Vec<String>,
    pub topic: String,
}

pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
}

impl KafkaPublisher {
    pub fn new(brokers: &[String], topic: impl Into<String>) -> Result<Self, PublishError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers.join(","))
            .set("client.id", "feedstock")
            .set("message.timeout.ms", MESSAGE_TIMEOUT_MS.to_string())
            .set("acks", "all")
            .create()
            .map_err(|err| PublishError::Config(err.to_string()))?;

        Ok(Self {
            producer,
            topic: topic.into(),
        })
    }

    pub fn from_config(config: KafkaConfig) -> Result<Self, PublishError> {
        Self::new(&config.brokers, config.topic)
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn send(&self, body: &[u8]) -> Result<(), PublishError> {
        let record = FutureRecord::<(), _>::to(&self.topic).payload(body);
        let timeout = Timeout::After(Duration::from_millis(MESSAGE_TIMEOUT_MS));

        let (partition, offset) = self
            .producer
            .send(record, timeout)
            .await
            .map_err(|(err, _)| PublishError::Delivery(err.to_string()))?;

        debug!(topic = %self.topic, partition, offset, "delivered record to kafka");
        Ok(())
    }

    fn name(&self) -> &'static str {
        PUBLISHER_TYPE
    }
}
