//! Oaken CLI - Kafka to MySQL ledger and sales workers.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use oaken_core::config::LoggingConfig;
use oaken_core::{Config, Worker};
use std::path::{Path, PathBuf};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid config file, missing required fields)
    ConfigError = 1,
    /// Kafka-related error (connection, consumer, producer)
    KafkaError = 2,
    /// MySQL error (connection, statement)
    DatabaseError = 3,
    /// Storage error (log archive, log directory)
    StorageError = 4,
    /// General runtime error
    RuntimeError = 10,
}

impl ExitCode {
    /// Map an error to an exit code by its kind.
    fn from_error(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<oaken_core::Error>() {
            Some(oaken_core::Error::Config(_)) => ExitCode::ConfigError,
            Some(oaken_core::Error::Kafka(_)) => ExitCode::KafkaError,
            Some(oaken_core::Error::Database(_)) => ExitCode::DatabaseError,
            Some(oaken_core::Error::Storage(_)) | Some(oaken_core::Error::Io(_)) => {
                ExitCode::StorageError
            }
            _ => ExitCode::RuntimeError,
        }
    }
}

mod commands;

#[derive(Parser)]
#[command(name = "oaken")]
#[command(about = "Kafka to MySQL ledger and sales ingestion workers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Post shipping/sale events to the ledger
    Ledger {
        /// Override Kafka bootstrap servers
        #[arg(long)]
        bootstrap_servers: Option<String>,

        /// Override the shipping topic
        #[arg(long)]
        topic: Option<String>,

        /// Override consumer group
        #[arg(long)]
        consumer_group: Option<String>,
    },

    /// Ingest point-of-sale records and publish invoice notifications
    Ingest {
        /// Override Kafka bootstrap servers
        #[arg(long)]
        bootstrap_servers: Option<String>,

        /// Override the sales topic
        #[arg(long)]
        topic: Option<String>,

        /// Override consumer group
        #[arg(long)]
        consumer_group: Option<String>,

        /// Override the invoice notification topic
        #[arg(long)]
        invoice_topic: Option<String>,
    },

    /// Validate configuration
    Validate {
        /// Also check the settings this worker needs
        #[arg(long, value_enum)]
        worker: Option<WorkerArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum WorkerArg {
    Ledger,
    Ingest,
}

impl From<WorkerArg> for Worker {
    fn from(arg: WorkerArg) -> Self {
        match arg {
            WorkerArg::Ledger => Worker::Ledger,
            WorkerArg::Ingest => Worker::Ingest,
        }
    }
}

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code as i32);
}

/// Main CLI execution logic with proper error handling.
async fn run_cli() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            let _ = oaken_core::logging::init_console(&LoggingConfig::default(), cli.verbose);
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::ConfigError;
        }
    };

    match execute_command(cli, config).await {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Execute the CLI command.
async fn execute_command(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Ledger {
            bootstrap_servers,
            topic,
            consumer_group,
        } => {
            let overrides = commands::Overrides {
                bootstrap_servers,
                topic,
                consumer_group,
            };
            commands::ledger::run(config, overrides, cli.verbose).await?;
        }

        Commands::Ingest {
            bootstrap_servers,
            topic,
            consumer_group,
            invoice_topic,
        } => {
            let overrides = commands::Overrides {
                bootstrap_servers,
                topic,
                consumer_group,
            };
            commands::ingest::run(config, overrides, invoice_topic, cli.verbose).await?;
        }

        Commands::Validate { worker } => {
            oaken_core::logging::init_console(&config.logging, cli.verbose)?;
            match worker {
                Some(worker) => config.validate_for(worker.into())?,
                None => config.validate()?,
            }
            println!("Configuration is valid");
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> oaken_core::Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::from_env()),
    }
}
