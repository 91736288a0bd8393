//! Ingest command implementation.

use super::Overrides;
use anyhow::Result;
use oaken_core::{Config, Worker};
use tracing::info;

/// Run the catalog and sales ingestor.
pub async fn run(
    mut config: Config,
    overrides: Overrides,
    invoice_topic: Option<String>,
    verbose: u8,
) -> Result<()> {
    overrides.apply_kafka(&mut config);
    if let Some(topic) = overrides.topic {
        config.topics.sales = topic;
    }
    if let Some(topic) = invoice_topic {
        config.topics.invoices = topic;
    }

    super::run(config, Worker::Ingest, verbose).await?;

    info!("Sales ingestor stopped");
    Ok(())
}
