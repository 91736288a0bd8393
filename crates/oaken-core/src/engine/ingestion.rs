//! Catalog and sales ingestion.
//!
//! Each point-of-sale record fans out into five inserts, applied in
//! dependency order: customer, vendor, category, product, sale. Every insert
//! is its own unit; a duplicate customer does not stop the sale from being
//! written. Once all five have been attempted an invoice notification is
//! published, whatever their outcome.

use super::{MessageHandler, MessageReport, Stage};
use crate::config::{Config, Worker};
use crate::kafka::{InvoicePublisher, KafkaInvoicePublisher};
use crate::records::{Fields, PointOfSaleRecord};
use crate::store::{CatalogStore, MySqlStore};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Writes catalog and sales rows and re-publishes invoice notifications.
pub struct SalesIngestor {
    store: Arc<dyn CatalogStore>,
    publisher: Arc<dyn InvoicePublisher>,
}

impl SalesIngestor {
    pub fn new(store: Arc<dyn CatalogStore>, publisher: Arc<dyn InvoicePublisher>) -> Self {
        Self { store, publisher }
    }

    /// Open the MySQL connection and the invoice producer.
    pub async fn connect(config: &Config) -> Result<Self> {
        let store = MySqlStore::connect(&config.mysql).await?;
        let publisher = KafkaInvoicePublisher::new(&config.kafka, config.topics.invoices.clone())?;
        Ok(Self::new(Arc::new(store), Arc::new(publisher)))
    }

    fn extract(payload: Option<&[u8]>) -> Result<PointOfSaleRecord> {
        let fields = Fields::from_payload(payload)?;
        Ok(PointOfSaleRecord::from_fields(&fields)?)
    }
}

#[async_trait]
impl MessageHandler for SalesIngestor {
    fn worker(&self) -> Worker {
        Worker::Ingest
    }

    async fn handle(&self, payload: Option<&[u8]>) -> MessageReport {
        let record = match Self::extract(payload) {
            Ok(record) => record,
            Err(e) => return MessageReport::rejected(e),
        };

        let mut report = MessageReport::new();
        report.record(Stage::Customer, self.store.insert_customer(&record.customer).await);
        report.record(Stage::Vendor, self.store.insert_vendor(&record.vendor).await);
        report.record(Stage::Category, self.store.insert_category(&record.category).await);
        report.record(Stage::Product, self.store.insert_product(&record.product).await);
        report.record(Stage::Sale, self.store.insert_sale(&record.sale).await);

        report.record(Stage::Publish, self.publisher.publish(&record.notification).await);

        debug!(
            invoice = %record.sale.invoice,
            clean = report.is_clean(),
            "Sale ingested"
        );
        report
    }

    async fn close(&self) {
        self.store.close().await;
        if let Err(e) = self.publisher.close().await {
            warn!(error = %e, "Invoice notifications may be lost");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryStore, RecordingPublisher};
    use crate::{DatabaseError, Error};
    use serde_json::{json, Value};

    fn sample() -> Value {
        json!({
            "StoreNumber": "2190",
            "StoreName": "Central City Liquor",
            "Address": "1460 2nd Ave",
            "City": "Des Moines",
            "County": "Polk",
            "State": "IA",
            "ZipCode": "50314",
            "VendorNumber": "370.0",
            "VendorName": "Pernod Ricard USA",
            "Category": "1031200.0",
            "CategoryName": "American Flavored Vodka",
            "ItemNumber": "41846",
            "ItemDescription": "Absolut Citron",
            "Pack": "12",
            "BottleVolumeML": "750",
            "BottleCost": "$11.49",
            "BottleRetail": "$17.24",
            "Invoice": "INV-16681900011",
            "Date": "11/20/2015",
            "BottlesSold": "6",
            "VolumeSoldLiters": "4.5",
            "SaleDollars": "$103.44"
        })
    }

    fn ingestor() -> (SalesIngestor, Arc<InMemoryStore>, Arc<RecordingPublisher>) {
        let store = Arc::new(InMemoryStore::new());
        let publisher = Arc::new(RecordingPublisher::sharing_journal(&store));
        (
            SalesIngestor::new(store.clone(), publisher.clone()),
            store,
            publisher,
        )
    }

    fn bytes(value: &Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    #[tokio::test]
    async fn test_complete_record() {
        let (ingestor, store, publisher) = ingestor();

        let report = ingestor.handle(Some(&bytes(&sample()))).await;
        assert!(report.is_clean());
        assert_eq!(report.outcomes().len(), 6);

        {
            let state = store.state();
            assert!(state.customers.contains_key(&2190));
            assert!(state.vendors.contains_key(&370));
            assert!(state.categories.contains_key(&1031200));
            assert_eq!(state.products[&41846].category_number, 1031200);
            assert_eq!(state.sales.len(), 1);
        }

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].invoice, "INV-16681900011");
        assert_eq!(published[0].sale_date, "11/20/2015");
        assert_eq!(published[0].sale_dollars, "103.44");

        // All five inserts are attempted before the notification goes out
        assert_eq!(
            store.journal(),
            vec!["customer", "vendor", "category", "product", "sales", "publish"]
        );
    }

    #[tokio::test]
    async fn test_bad_date_writes_nothing() {
        let (ingestor, store, publisher) = ingestor();
        let mut value = sample();
        value["Date"] = json!("2015-11-20");

        let report = ingestor.handle(Some(&bytes(&value))).await;
        assert!(report.is_rejected());
        assert!(store.journal().is_empty());
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_customer_does_not_block_sale() {
        let (ingestor, store, publisher) = ingestor();
        ingestor.handle(Some(&bytes(&sample()))).await;

        let mut second = sample();
        second["Invoice"] = json!("INV-2");
        second["ItemNumber"] = json!("41847");
        second["VendorNumber"] = json!("371");
        second["Category"] = json!("1031201");

        let report = ingestor.handle(Some(&bytes(&second))).await;
        assert!(!report.is_clean());
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, Stage::Customer);
        assert!(matches!(
            failures[0].1,
            Error::Database(DatabaseError::DuplicateKey { table: "customer", .. })
        ));

        assert!(report.succeeded(Stage::Sale));
        assert!(report.succeeded(Stage::Publish));
        assert_eq!(store.state().sales.len(), 2);
        assert_eq!(publisher.published().len(), 2);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_rows() {
        let (ingestor, store, publisher) = ingestor();
        publisher.fail_next();

        let report = ingestor.handle(Some(&bytes(&sample()))).await;
        assert!(!report.succeeded(Stage::Publish));
        assert!(report.succeeded(Stage::Sale));
        assert_eq!(store.state().sales.len(), 1);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_replay_duplicates_sales_rows() {
        let (ingestor, store, publisher) = ingestor();
        let body = bytes(&sample());

        ingestor.handle(Some(&body)).await;
        let report = ingestor.handle(Some(&body)).await;

        // Catalog rows collide on their keys, the sale row does not
        assert_eq!(report.failures().count(), 4);
        assert_eq!(store.state().sales.len(), 2);
        assert_eq!(publisher.published().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_category_fails_dependent_rows() {
        let (ingestor, store, publisher) = ingestor();
        store.fail_table("category");

        let report = ingestor.handle(Some(&bytes(&sample()))).await;
        let failed: Vec<_> = report.failures().map(|(stage, _)| stage).collect();
        assert_eq!(failed, vec![Stage::Category, Stage::Product, Stage::Sale]);
        assert!(store.state().sales.is_empty());
        assert_eq!(publisher.published().len(), 1);
    }

    #[tokio::test]
    async fn test_close_releases_store_and_producer() {
        let (ingestor, store, publisher) = ingestor();
        ingestor.close().await;
        assert_eq!(store.state().closed, 1);
        assert!(publisher.is_closed());
    }

    #[tokio::test]
    async fn test_close_survives_unflushed_producer() {
        let (ingestor, store, publisher) = ingestor();
        publisher.fail_flush();
        ingestor.close().await;
        assert_eq!(store.state().closed, 1);
        assert!(publisher.is_closed());
    }
}
