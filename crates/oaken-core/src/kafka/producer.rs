//! Invoice notification producer.

use super::consumer::base_client_config;
use crate::config::KafkaConfig;
use crate::records::InvoiceNotification;
use crate::{Error, KafkaError, Result};
use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{debug, info};

/// Sink for invoice notifications.
#[async_trait]
pub trait InvoicePublisher: Send + Sync {
    /// Publish one notification and wait until the broker acknowledges it.
    async fn publish(&self, notification: &InvoiceNotification) -> Result<()>;

    /// Flush anything still queued and release the client.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Publishes notifications to a Kafka topic, keyed by invoice.
pub struct KafkaInvoicePublisher {
    producer: FutureProducer,
    topic: String,
    delivery_timeout: Duration,
}

impl KafkaInvoicePublisher {
    /// Create the producer.
    pub fn new(config: &KafkaConfig, topic: impl Into<String>) -> Result<Self> {
        let topic = topic.into();
        let producer: FutureProducer = base_client_config(config)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .create()
            .map_err(|e| {
                Error::Kafka(KafkaError::ConnectionFailed {
                    broker: config.bootstrap_servers.join(","),
                    message: e.to_string(),
                })
            })?;

        info!(topic = %topic, "Invoice producer created");

        Ok(Self {
            producer,
            topic,
            delivery_timeout: Duration::from_millis(config.message_timeout_ms),
        })
    }

    /// Output topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl InvoicePublisher for KafkaInvoicePublisher {
    async fn publish(&self, notification: &InvoiceNotification) -> Result<()> {
        let payload = notification.to_json()?;
        let record = FutureRecord::to(&self.topic)
            .key(&notification.invoice)
            .payload(&payload);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.delivery_timeout))
            .await
            .map_err(|(e, _)| {
                Error::Kafka(KafkaError::Delivery {
                    topic: self.topic.clone(),
                    message: e.to_string(),
                })
            })?;

        debug!(
            topic = %self.topic,
            invoice = %notification.invoice,
            partition,
            offset,
            "Invoice notification delivered"
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.producer
            .flush(Timeout::After(self.delivery_timeout))
            .map_err(|e| Error::Kafka(KafkaError::Flush(e.to_string())))?;
        info!(topic = %self.topic, "Invoice producer closed");
        Ok(())
    }
}
