//! Oaken Core - Kafka to MySQL ETL workers
//!
//! Two long-running consumers share one message loop:
//!
//! - The ledger poster turns shipping/sale events into an offsetting
//!   credit/debit pair, written atomically.
//! - The sales ingestor splits point-of-sale records into customer, vendor,
//!   category, product and sales rows, then re-publishes an invoice
//!   notification.
//!
//! Failures are reported per message and per stage; the loop always moves on
//! to the next message.

pub mod config;
pub mod engine;
pub mod error;
pub mod kafka;
pub mod logging;
pub mod metrics;
pub mod records;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{Config, Worker};
pub use engine::{run_worker, MessageReport, Stage};
pub use error::{DatabaseError, KafkaError, RecordError};
pub use error::{Error, Result};
pub use metrics::MetricsSnapshot;
