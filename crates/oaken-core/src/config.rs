//! Configuration structures for oaken.
//!
//! Configuration is loaded from a TOML file or built from the environment.
//! Environment variables always override values read from a file, and CLI
//! flags override both.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The two workers this crate can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Worker {
    /// Posts sale credits and shipping debits to the ledger.
    Ledger,
    /// Ingests point-of-sale records into the catalog and sales tables.
    Ingest,
}

impl Worker {
    /// Short name used in logs and file names.
    pub fn name(&self) -> &'static str {
        match self {
            Worker::Ledger => "accounting",
            Worker::Ingest => "mysql-api",
        }
    }

    /// Topic this worker consumes from.
    pub fn input_topic<'a>(&self, topics: &'a TopicConfig) -> &'a str {
        match self {
            Worker::Ledger => &topics.shipping,
            Worker::Ingest => &topics.sales,
        }
    }

    /// Consumer group, falling back to the worker default.
    pub fn consumer_group(&self, kafka: &KafkaConfig) -> String {
        if let Some(ref group) = kafka.consumer_group {
            return group.clone();
        }
        match self {
            Worker::Ledger => "oaken_accounting_group".to_string(),
            Worker::Ingest => "oaken_mysql_group".to_string(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Kafka configuration
    #[serde(default)]
    pub kafka: KafkaConfig,

    /// Topic names
    #[serde(default)]
    pub topics: TopicConfig,

    /// MySQL connection
    #[serde(default)]
    pub mysql: MySqlConfig,

    /// Logging sinks
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Kafka client configuration shared by consumer and producer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers
    #[serde(default)]
    pub bootstrap_servers: Vec<String>,

    /// Consumer group ID (defaults per worker)
    #[serde(default)]
    pub consumer_group: Option<String>,

    /// Auto offset reset strategy
    #[serde(default)]
    pub auto_offset_reset: OffsetReset,

    /// Session timeout in milliseconds
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u32,

    /// How long a single poll waits before reporting idle
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// First backoff after a poll error, doubled per consecutive error
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound on the poll error backoff
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,

    /// Producer delivery timeout in milliseconds
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,

    /// Security configuration
    #[serde(default)]
    pub security: KafkaSecurityConfig,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: Vec::new(),
            consumer_group: None,
            auto_offset_reset: OffsetReset::default(),
            session_timeout_ms: default_session_timeout_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
            message_timeout_ms: default_message_timeout_ms(),
            security: KafkaSecurityConfig::default(),
        }
    }
}

/// Kafka auto offset reset strategy.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    /// Start from earliest offset
    #[default]
    Earliest,
    /// Start from latest offset
    Latest,
}

/// Kafka security configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KafkaSecurityConfig {
    /// Security protocol (PLAINTEXT, SSL, SASL_SSL, SASL_PLAINTEXT)
    pub protocol: Option<String>,

    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512)
    pub sasl_mechanism: Option<String>,

    /// SASL username
    pub sasl_username: Option<String>,

    /// SASL password
    pub sasl_password: Option<String>,

    /// SSL CA certificate location
    pub ssl_ca_location: Option<PathBuf>,
}

/// Topic names for both workers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopicConfig {
    /// Shipping/sale events consumed by the ledger worker
    #[serde(default)]
    pub shipping: String,

    /// Point-of-sale records consumed by the ingest worker
    #[serde(default = "default_sales_topic")]
    pub sales: String,

    /// Invoice notifications produced by the ingest worker
    #[serde(default = "default_invoice_topic")]
    pub invoices: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            shipping: String::new(),
            sales: default_sales_topic(),
            invoices: default_invoice_topic(),
        }
    }
}

/// MySQL connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MySqlConfig {
    /// Server host
    #[serde(default)]
    pub host: String,

    /// Server port
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// User name
    #[serde(default)]
    pub user: String,

    /// Password
    #[serde(default)]
    pub password: String,

    /// Database (schema) name
    #[serde(default)]
    pub database: String,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_mysql_port(),
            user: String::new(),
            password: String::new(),
            database: String::new(),
            connect_timeout_seconds: default_connect_timeout_seconds(),
        }
    }
}

/// Logging configuration: console, rolling file and archive sinks.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Directory for the rolling log file
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// File name prefix (defaults to `<worker>.log`)
    #[serde(default)]
    pub file_prefix: Option<String>,

    /// Number of rotated files to keep
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,

    /// Log level
    #[serde(default)]
    pub level: LogLevel,

    /// Console log format
    #[serde(default)]
    pub format: LogFormat,

    /// Archive sink for error records
    #[serde(default)]
    pub archive: Option<ArchiveConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            file_prefix: None,
            max_log_files: default_max_log_files(),
            level: LogLevel::default(),
            format: LogFormat::default(),
            archive: None,
        }
    }
}

impl LoggingConfig {
    /// File name prefix for the given worker.
    pub fn file_prefix_for(&self, worker: Worker) -> String {
        self.file_prefix
            .clone()
            .unwrap_or_else(|| format!("{}.log", worker.name()))
    }
}

/// Object storage target for archived error logs.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ArchiveConfig {
    /// `s3://bucket/prefix`, a bare bucket name, or a local directory
    pub target: String,

    /// AWS region
    pub aws_region: Option<String>,

    /// AWS access key ID
    pub aws_access_key_id: Option<String>,

    /// AWS secret access key
    pub aws_secret_access_key: Option<String>,

    /// S3 endpoint (for MinIO or other S3-compatible storage)
    pub s3_endpoint: Option<String>,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level
    Trace,
    /// Debug level
    Debug,
    /// Info level (default)
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl LogLevel {
    /// Directive string understood by `EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// Plain text format
    Text,
}

// Default value functions
fn default_session_timeout_ms() -> u32 {
    30000
}
fn default_poll_timeout_ms() -> u64 {
    1000
}
fn default_retry_backoff_ms() -> u64 {
    100
}
fn default_retry_backoff_max_ms() -> u64 {
    30000
}
fn default_message_timeout_ms() -> u64 {
    5000
}
fn default_sales_topic() -> String {
    "mysql".to_string()
}
fn default_invoice_topic() -> String {
    "invoices".to_string()
}
fn default_mysql_port() -> u16 {
    3306
}
fn default_connect_timeout_seconds() -> u64 {
    30
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Build configuration from environment variables alone.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup.
    ///
    /// Empty values are ignored so an exported-but-blank variable does not
    /// wipe a value from the config file.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(servers) = get("KAFKA_SERVER") {
            self.kafka.bootstrap_servers = servers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(group) = get("CONSUMER_GROUP") {
            self.kafka.consumer_group = Some(group);
        }
        if let Some(topic) = get("SHIPPING_TOPIC") {
            self.topics.shipping = topic;
        }
        if let Some(topic) = get("SALES_TOPIC") {
            self.topics.sales = topic;
        }
        if let Some(topic) = get("INVOICE_TOPIC") {
            self.topics.invoices = topic;
        }
        if let Some(host) = get("MYSQL_HOST") {
            self.mysql.host = host;
        }
        if let Some(port) = get("MYSQL_PORT") {
            match port.parse() {
                Ok(port) => self.mysql.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid MYSQL_PORT"),
            }
        }
        if let Some(user) = get("MYSQL_USER") {
            self.mysql.user = user;
        }
        if let Some(password) = get("MYSQL_PASSWORD") {
            self.mysql.password = password;
        }
        if let Some(database) = get("MYSQL_DATABASE") {
            self.mysql.database = database;
        }
        if let Some(dir) = get("LOG_DIR") {
            self.logging.log_dir = PathBuf::from(dir);
        }
        if let Some(target) = get("ACCOUNTING_LOG_BUCKET") {
            match self.logging.archive {
                Some(ref mut archive) => archive.target = target,
                None => {
                    self.logging.archive = Some(ArchiveConfig {
                        target,
                        ..ArchiveConfig::default()
                    })
                }
            }
        }
    }

    /// Validate settings shared by both workers.
    pub fn validate(&self) -> crate::Result<()> {
        if self.kafka.bootstrap_servers.is_empty() {
            return Err(crate::Error::Config(
                "At least one bootstrap server required".into(),
            ));
        }

        if self.mysql.host.is_empty() {
            return Err(crate::Error::Config("MySQL host is required".into()));
        }

        if self.mysql.user.is_empty() {
            return Err(crate::Error::Config("MySQL user is required".into()));
        }

        if self.mysql.database.is_empty() {
            return Err(crate::Error::Config("MySQL database is required".into()));
        }

        match self.logging.archive {
            Some(ref archive) if !archive.target.is_empty() => {}
            _ => {
                return Err(crate::Error::Config(
                    "Log archive target is required".into(),
                ))
            }
        }

        if self.mysql.password.is_empty() {
            tracing::warn!(user = %self.mysql.user, "MySQL password is empty");
        }

        Ok(())
    }

    /// Validate settings for a specific worker.
    pub fn validate_for(&self, worker: Worker) -> crate::Result<()> {
        self.validate()?;

        if worker.input_topic(&self.topics).is_empty() {
            return Err(crate::Error::Config(format!(
                "Input topic is required for the {} worker",
                worker.name()
            )));
        }

        if worker == Worker::Ingest && self.topics.invoices.is_empty() {
            return Err(crate::Error::Config("Invoice topic is required".into()));
        }

        Ok(())
    }
}
