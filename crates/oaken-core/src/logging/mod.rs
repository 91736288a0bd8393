//! Subscriber setup: console, rolling local file, and the error archive.

mod archive;

pub use archive::{
    create_object_store, ArchiveHandle, ArchiveLayer, ArchiveRecord, ArchiveSink, ArchiveTarget,
};

use crate::config::{LogFormat, LoggingConfig, Worker};
use crate::{Error, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Keeps the log writers alive. Call [`LoggingGuard::shutdown`] before exit
/// so buffered records reach the file and the archive.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    archive: Option<ArchiveHandle>,
}

impl LoggingGuard {
    /// Wait for pending archive uploads.
    pub async fn shutdown(self) {
        if let Some(archive) = &self.archive {
            archive.flush().await;
            info!(
                uploads = archive.uploads(),
                dropped = archive.dropped(),
                "Log archive flushed"
            );
        }
    }
}

/// Filter from `RUST_LOG`, else the `-v` count, else the configured level.
pub fn build_filter(config: &LoggingConfig, verbosity: u8) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    match verbosity {
        0 => EnvFilter::new(config.level.as_directive()),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// Console-only logging for commands that run no worker.
pub fn init_console(config: &LoggingConfig, verbosity: u8) -> Result<()> {
    let filter = build_filter(config, verbosity);
    let init = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init(),
    };
    init.map_err(|e| Error::Config(format!("Failed to initialize logging: {e}")))
}

/// Install the worker subscriber.
///
/// Must be called inside a tokio runtime: the archive upload task is spawned
/// here. Fails if the log directory or the archive store cannot be opened.
pub fn init_logging(config: &LoggingConfig, worker: Worker, verbosity: u8) -> Result<LoggingGuard> {
    let file_prefix = config.file_prefix_for(worker);

    std::fs::create_dir_all(&config.log_dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&file_prefix)
        .max_log_files(config.max_log_files)
        .build(&config.log_dir)
        .map_err(|e| Error::Config(format!("Failed to open log file: {e}")))?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);

    let archive = match &config.archive {
        Some(archive_config) => {
            let target = ArchiveTarget::parse(&archive_config.target)?;
            let store = create_object_store(&target, archive_config)?;
            let sink = ArchiveSink::new(store, target.prefix(), file_prefix.as_str());
            let (handle, _task) = ArchiveHandle::spawn(sink);
            Some(handle)
        }
        None => None,
    };
    let archive_layer = archive.as_ref().map(|handle| handle.layer(worker.name()));

    let filter = build_filter(config, verbosity);

    let init = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .with(fmt::layer().with_writer(file_writer).with_ansi(false))
            .with(archive_layer)
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .with(fmt::layer().with_writer(file_writer).with_ansi(false))
            .with(archive_layer)
            .try_init(),
    };
    init.map_err(|e| Error::Config(format!("Failed to initialize logging: {e}")))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        archive,
    })
}
