//! Worker command implementations.

pub mod ingest;
pub mod ledger;

use anyhow::Result;
use oaken_core::logging;
use oaken_core::{Config, Worker};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Command-line overrides shared by both workers.
#[derive(Debug, Default)]
pub struct Overrides {
    pub bootstrap_servers: Option<String>,
    pub topic: Option<String>,
    pub consumer_group: Option<String>,
}

impl Overrides {
    /// Apply the Kafka overrides; the topic is worker specific.
    fn apply_kafka(&self, config: &mut Config) {
        if let Some(ref servers) = self.bootstrap_servers {
            config.kafka.bootstrap_servers = servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(ref group) = self.consumer_group {
            config.kafka.consumer_group = Some(group.clone());
        }
    }
}

/// Install logging, run the worker until a signal arrives, then flush logs.
async fn run(config: Config, worker: Worker, verbose: u8) -> Result<()> {
    let guard = match logging::init_logging(&config.logging, worker, verbose) {
        Ok(guard) => guard,
        Err(e) => {
            let _ = logging::init_console(&config.logging, verbose);
            return Err(e.into());
        }
    };

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(shutdown_on_signal(shutdown_tx));

    let result = oaken_core::run_worker(&config, worker, shutdown_rx).await;
    match result {
        Ok(ref summary) => info!(
            worker = worker.name(),
            messages = summary.messages_total,
            failed = summary.messages_failed,
            "Worker exited"
        ),
        Err(ref e) => error!(worker = worker.name(), error = %e, "Worker failed to start"),
    }

    guard.shutdown().await;
    result.map(|_| ()).map_err(Into::into)
}

/// Send the shutdown signal on SIGINT or SIGTERM.
///
/// A handler that cannot be installed never fires; it does not stop the worker.
async fn shutdown_on_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        let sigterm = async {
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
            }
            _ = sigterm => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
        info!("Received Ctrl+C, initiating graceful shutdown");
    }

    let _ = shutdown_tx.send(());
}

/// Resolve on Ctrl+C. Waits forever if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}
