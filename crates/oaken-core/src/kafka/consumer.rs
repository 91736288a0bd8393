//! Kafka consumer with per-message commits and exponential backoff.
//!
//! Offsets are committed manually after each message has been handled, so
//! a message is redelivered only if the worker dies mid-message.
//!
//! ## Exponential Backoff
//!
//! Poll errors are retried with a growing delay:
//! min(max_delay, base_delay * 2^attempt) + jitter

use crate::config::{KafkaConfig, OffsetReset};
use crate::{Error, KafkaError, Result};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for exponential backoff retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Base delay for first retry (default: 100ms)
    pub base_delay: Duration,
    /// Maximum delay cap (default: 30s)
    pub max_delay: Duration,
    /// Whether to add jitter (randomness) to delays (default: true)
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    /// Disable jitter (for testing).
    #[cfg(test)]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Calculate the backoff delay for a given attempt.
    ///
    /// Uses exponential backoff: min(max_delay, base_delay * 2^attempt)
    /// Optionally adds jitter (±25%) to prevent thundering herd.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;

        let delay_ms = base_ms.saturating_mul(1u64 << attempt.min(20));
        let capped_delay_ms = delay_ms.min(max_ms);

        let final_delay_ms = if self.jitter {
            let jitter_range = capped_delay_ms / 4;
            let jitter = (std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos() as u64)
                % (jitter_range * 2 + 1);
            capped_delay_ms.saturating_sub(jitter_range) + jitter
        } else {
            capped_delay_ms
        };

        Duration::from_millis(final_delay_ms)
    }
}

/// Builder for creating a Kafka consumer.
pub struct KafkaConsumerBuilder {
    config: KafkaConfig,
    topic: String,
    group: String,
    retry_config: RetryConfig,
}

impl KafkaConsumerBuilder {
    /// Create a new consumer builder for one topic and consumer group.
    ///
    /// Poll error backoff comes from `retry_backoff_ms` and
    /// `retry_backoff_max_ms`.
    pub fn new(config: KafkaConfig, topic: impl Into<String>, group: impl Into<String>) -> Self {
        let retry_config = RetryConfig::new(
            Duration::from_millis(config.retry_backoff_ms),
            Duration::from_millis(config.retry_backoff_max_ms),
        );
        Self {
            config,
            topic: topic.into(),
            group: group.into(),
            retry_config,
        }
    }

    /// Build the consumer and subscribe to the topic.
    pub fn build(self) -> Result<SmartKafkaConsumer> {
        let mut client_config = base_client_config(&self.config);

        client_config
            .set("group.id", &self.group)
            .set("enable.auto.commit", "false")
            .set(
                "auto.offset.reset",
                match self.config.auto_offset_reset {
                    OffsetReset::Earliest => "earliest",
                    OffsetReset::Latest => "latest",
                },
            )
            .set(
                "session.timeout.ms",
                self.config.session_timeout_ms.to_string(),
            );

        let consumer: StreamConsumer = client_config.create().map_err(|e| {
            Error::Kafka(KafkaError::ConnectionFailed {
                broker: self.config.bootstrap_servers.join(","),
                message: e.to_string(),
            })
        })?;

        consumer
            .subscribe(&[&self.topic])
            .map_err(|e| Error::Kafka(KafkaError::ConsumerGroup(e.to_string())))?;

        info!(
            topic = %self.topic,
            group = %self.group,
            servers = %self.config.bootstrap_servers.join(","),
            "Kafka consumer subscribed"
        );

        Ok(SmartKafkaConsumer {
            consumer,
            topic: self.topic,
            poll_timeout: Duration::from_millis(self.config.poll_timeout_ms),
            retry_config: self.retry_config,
            consecutive_failures: AtomicU32::new(0),
        })
    }
}

/// Client settings shared by consumer and producer.
pub(crate) fn base_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config.set("bootstrap.servers", config.bootstrap_servers.join(","));

    if let Some(ref protocol) = config.security.protocol {
        client_config.set("security.protocol", protocol);
    }
    if let Some(ref mechanism) = config.security.sasl_mechanism {
        client_config.set("sasl.mechanism", mechanism);
    }
    if let Some(ref username) = config.security.sasl_username {
        client_config.set("sasl.username", username);
    }
    if let Some(ref password) = config.security.sasl_password {
        client_config.set("sasl.password", password);
    }
    if let Some(ref path) = config.security.ssl_ca_location {
        client_config.set("ssl.ca.location", path.to_string_lossy().as_ref());
    }

    client_config
}

/// Kafka consumer for a single topic with exponential backoff.
pub struct SmartKafkaConsumer {
    consumer: StreamConsumer,
    topic: String,
    poll_timeout: Duration,
    retry_config: RetryConfig,
    /// Counter for consecutive failures (for backoff calculation)
    consecutive_failures: AtomicU32,
}

impl SmartKafkaConsumer {
    /// Poll for one message with timeout. `None` means the timeout elapsed.
    pub async fn poll(&self, timeout: Duration) -> Option<Result<KafkaMessage>> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Ok(Ok(msg)) => Some(Ok(Self::convert_message(&msg))),
            Ok(Err(e)) => Some(Err(Error::Kafka(KafkaError::ConsumerGroup(e.to_string())))),
            Err(_) => None,
        }
    }

    /// Poll for messages with automatic backoff on errors.
    ///
    /// On error, records the failure and returns a delay recommendation
    /// for the caller to wait out before polling again.
    pub async fn poll_with_backoff(&self) -> PollResult {
        match self.poll(self.poll_timeout).await {
            Some(Ok(msg)) => {
                self.record_success();
                PollResult::Message(msg)
            }
            Some(Err(e)) => {
                let failures = self.record_failure();
                let backoff = self.retry_config.calculate_delay(failures);
                warn!(
                    failures = failures,
                    backoff_ms = backoff.as_millis(),
                    error = %e,
                    "Poll error, backing off"
                );
                PollResult::Error { error: e, backoff }
            }
            None => PollResult::Timeout,
        }
    }

    /// Convert a borrowed message to an owned KafkaMessage.
    fn convert_message(msg: &BorrowedMessage) -> KafkaMessage {
        KafkaMessage {
            value: msg.payload().map(|v| v.to_vec()),
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
        }
    }

    /// Commit the offset following `offset` for a partition.
    pub async fn commit_offset(&self, topic: &str, partition: i32, offset: i64) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        // Committed offset is the next offset to read
        tpl.add_partition_offset(topic, partition, Offset::Offset(offset + 1))
            .map_err(|e| Error::Kafka(KafkaError::OffsetCommit(e.to_string())))?;

        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| Error::Kafka(KafkaError::OffsetCommit(e.to_string())))?;

        debug!(
            topic = %topic,
            partition = %partition,
            offset = %offset,
            "Offset committed"
        );

        Ok(())
    }

    /// Leave the consumer group.
    pub fn close(&self) {
        self.consumer.unsubscribe();
        info!(topic = %self.topic, "Kafka consumer unsubscribed");
    }

    /// Record a successful operation (resets backoff).
    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    /// Record a failure (increments backoff counter).
    fn record_failure(&self) -> u32 {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Result of a poll operation with backoff information.
#[derive(Debug)]
pub enum PollResult {
    /// Successfully received a message.
    Message(KafkaMessage),
    /// Poll timed out (no messages available).
    Timeout,
    /// Poll failed with error and backoff recommendation.
    Error {
        /// The error that occurred.
        error: Error,
        /// Recommended backoff duration before next attempt.
        backoff: Duration,
    },
}

/// A Kafka message with its position.
#[derive(Debug, Clone)]
pub struct KafkaMessage {
    /// Message value (optional)
    pub value: Option<Vec<u8>>,

    /// Topic name
    pub topic: String,

    /// Partition number
    pub partition: i32,

    /// Offset within the partition
    pub offset: i64,
}

impl KafkaMessage {
    /// Build a message carrying only a value.
    #[cfg(test)]
    pub fn with_value(topic: &str, offset: i64, value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: Some(value.into()),
            topic: topic.to_string(),
            partition: 0,
            offset,
        }
    }
}
