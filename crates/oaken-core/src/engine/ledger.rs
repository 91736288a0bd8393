//! Ledger poster: shipping/sale events into credit/debit ledger rows.

use super::{MessageHandler, MessageReport, Stage};
use crate::config::{Config, Worker};
use crate::records::{Fields, LedgerPair, ShippingEvent};
use crate::store::{LedgerStore, MySqlStore};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Posts one offsetting ledger pair per event.
pub struct LedgerPoster {
    store: Arc<dyn LedgerStore>,
}

impl LedgerPoster {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Open the MySQL connection described by `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let store = MySqlStore::connect(&config.mysql).await?;
        Ok(Self::new(Arc::new(store)))
    }

    fn extract(payload: Option<&[u8]>) -> Result<LedgerPair> {
        let fields = Fields::from_payload(payload)?;
        Ok(ShippingEvent::from_fields(&fields).ledger_pair()?)
    }
}

#[async_trait]
impl MessageHandler for LedgerPoster {
    fn worker(&self) -> Worker {
        Worker::Ledger
    }

    async fn handle(&self, payload: Option<&[u8]>) -> MessageReport {
        let pair = match Self::extract(payload) {
            Ok(pair) => pair,
            Err(e) => return MessageReport::rejected(e),
        };

        let result = self.store.post_pair(&pair).await;
        if result.is_ok() {
            debug!(invoice = %pair.credit.invoice, "Ledger pair posted");
        }

        let mut report = MessageReport::new();
        report.record(Stage::LedgerPair, result);
        report
    }

    async fn close(&self) {
        self.store.close().await;
    }
}
