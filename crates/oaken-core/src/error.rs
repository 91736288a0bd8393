//! Error types for oaken core library.
//!
//! Uses hierarchical domain-specific errors following the thiserror pattern.

use thiserror::Error;

/// Result type alias for oaken operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for oaken.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Kafka-related error
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// Database-related error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Malformed input record
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// Log archive storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Kafka-specific errors.
#[derive(Error, Debug)]
pub enum KafkaError {
    /// Failed to connect to broker
    #[error("Connection failed to {broker}: {message}")]
    ConnectionFailed { broker: String, message: String },

    /// Consumer group error
    #[error("Consumer group error: {0}")]
    ConsumerGroup(String),

    /// Offset commit failed
    #[error("Offset commit failed: {0}")]
    OffsetCommit(String),

    /// Message could not be delivered to the output topic
    #[error("Delivery to {topic} failed: {message}")]
    Delivery { topic: String, message: String },

    /// Producer flush did not complete
    #[error("Producer flush failed: {0}")]
    Flush(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Could not open the connection
    #[error("Connection to {host} failed: {message}")]
    ConnectionFailed { host: String, message: String },

    /// A row with the same key already exists
    #[error("Duplicate key in {table}: {message}")]
    DuplicateKey { table: &'static str, message: String },

    /// Insert statement failed
    #[error("Insert into {table} failed: {message}")]
    Insert { table: &'static str, message: String },

    /// Begin or commit of a transaction failed
    #[error("Transaction failed: {0}")]
    Transaction(String),
}

/// Errors raised while extracting typed fields from an input record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    /// Message carried no value
    #[error("Message has no payload")]
    EmptyPayload,

    /// Payload is not a JSON object
    #[error("Payload is not a JSON object: {0}")]
    NotAnObject(String),

    /// Required field absent or empty
    #[error("Field '{field}' is missing")]
    Missing { field: &'static str },

    /// Field is not an integer
    #[error("Field '{field}' is not an integer: {value:?}")]
    InvalidInteger { field: &'static str, value: String },

    /// Field is not a decimal amount
    #[error("Field '{field}' is not a decimal: {value:?}")]
    InvalidDecimal { field: &'static str, value: String },

    /// Field is not a MM/DD/YYYY date
    #[error("Field '{field}' is not a MM/DD/YYYY date: {value:?}")]
    InvalidDate { field: &'static str, value: String },

    /// Identifier parsed to zero
    #[error("Identifier field '{field}' must be non-zero")]
    ZeroIdentifier { field: &'static str },
}

// Conversion implementations for external error types

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<object_store::Error> for Error {
    fn from(err: object_store::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
