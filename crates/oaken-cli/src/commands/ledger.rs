//! Ledger command implementation.

use super::Overrides;
use anyhow::Result;
use oaken_core::{Config, Worker};
use tracing::info;

/// Run the ledger poster.
pub async fn run(mut config: Config, overrides: Overrides, verbose: u8) -> Result<()> {
    overrides.apply_kafka(&mut config);
    if let Some(topic) = overrides.topic {
        config.topics.shipping = topic;
    }

    super::run(config, Worker::Ledger, verbose).await?;

    info!("Ledger poster stopped");
    Ok(())
}
