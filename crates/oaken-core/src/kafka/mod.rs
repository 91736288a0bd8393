//! Kafka consumer and producer integration.

mod consumer;
mod producer;

pub use consumer::{KafkaConsumerBuilder, KafkaMessage, PollResult, RetryConfig, SmartKafkaConsumer};
pub use producer::{InvoicePublisher, KafkaInvoicePublisher};
