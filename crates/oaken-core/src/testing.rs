//! In-memory doubles for the store, publisher and message source.

use crate::config::Worker;
use crate::engine::{Delivery, MessageHandler, MessageReport, MessageSource, Stage};
use crate::kafka::{InvoicePublisher, KafkaMessage};
use crate::records::{
    Category, Customer, InvoiceNotification, LedgerEntry, LedgerPair, Product, SaleRecord, Vendor,
};
use crate::store::{CatalogStore, LedgerStore};
use crate::{DatabaseError, Error, KafkaError, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ordered log of write attempts shared between doubles.
pub(crate) type Journal = Arc<Mutex<Vec<&'static str>>>;

#[derive(Default)]
pub(crate) struct StoreState {
    pub ledger: Vec<LedgerEntry>,
    pub customers: BTreeMap<i64, Customer>,
    pub vendors: BTreeMap<i64, Vendor>,
    pub categories: BTreeMap<i64, Category>,
    pub products: BTreeMap<i64, Product>,
    pub sales: Vec<SaleRecord>,
    pub closed: u32,
    failing: HashSet<&'static str>,
}

/// Store that enforces primary and foreign keys like the MySQL schema.
///
/// `fail_table` makes every insert into that table fail. The ledger
/// accepts `ledger_credit` and `ledger_debit` to fail one half of a pair.
#[derive(Default)]
pub(crate) struct InMemoryStore {
    state: Mutex<StoreState>,
    journal: Journal,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock()
    }

    pub fn fail_table(&self, table: &'static str) {
        self.state.lock().failing.insert(table);
    }

    pub fn journal(&self) -> Vec<&'static str> {
        self.journal.lock().clone()
    }

    fn attempt(&self, table: &'static str) -> MutexGuard<'_, StoreState> {
        self.journal.lock().push(table);
        self.state.lock()
    }
}

fn injected(table: &'static str) -> Error {
    DatabaseError::Insert {
        table,
        message: "injected failure".into(),
    }
    .into()
}

fn duplicate(table: &'static str, key: i64) -> Error {
    DatabaseError::DuplicateKey {
        table,
        message: format!("Duplicate entry '{key}' for key 'PRIMARY'"),
    }
    .into()
}

fn missing_parent(table: &'static str, parent: &str) -> Error {
    DatabaseError::Insert {
        table,
        message: format!("foreign key constraint fails: no {parent} row"),
    }
    .into()
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn post_pair(&self, pair: &LedgerPair) -> Result<()> {
        let mut state = self.attempt("ledger");
        for table in ["ledger", "ledger_credit", "ledger_debit"] {
            if state.failing.contains(table) {
                return Err(injected("ledger"));
            }
        }
        state.ledger.push(pair.credit.clone());
        state.ledger.push(pair.debit.clone());
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().closed += 1;
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        let mut state = self.attempt("customer");
        if state.failing.contains("customer") {
            return Err(injected("customer"));
        }
        if state.customers.contains_key(&customer.store_number) {
            return Err(duplicate("customer", customer.store_number));
        }
        state.customers.insert(customer.store_number, customer.clone());
        Ok(())
    }

    async fn insert_vendor(&self, vendor: &Vendor) -> Result<()> {
        let mut state = self.attempt("vendor");
        if state.failing.contains("vendor") {
            return Err(injected("vendor"));
        }
        if state.vendors.contains_key(&vendor.vendor_number) {
            return Err(duplicate("vendor", vendor.vendor_number));
        }
        state.vendors.insert(vendor.vendor_number, vendor.clone());
        Ok(())
    }

    async fn insert_category(&self, category: &Category) -> Result<()> {
        let mut state = self.attempt("category");
        if state.failing.contains("category") {
            return Err(injected("category"));
        }
        if state.categories.contains_key(&category.category_number) {
            return Err(duplicate("category", category.category_number));
        }
        state
            .categories
            .insert(category.category_number, category.clone());
        Ok(())
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut state = self.attempt("product");
        if state.failing.contains("product") {
            return Err(injected("product"));
        }
        if !state.categories.contains_key(&product.category_number) {
            return Err(missing_parent("product", "category"));
        }
        if state.products.contains_key(&product.item_number) {
            return Err(duplicate("product", product.item_number));
        }
        state.products.insert(product.item_number, product.clone());
        Ok(())
    }

    async fn insert_sale(&self, sale: &SaleRecord) -> Result<()> {
        let mut state = self.attempt("sales");
        if state.failing.contains("sales") {
            return Err(injected("sales"));
        }
        if !state.customers.contains_key(&sale.store_number) {
            return Err(missing_parent("sales", "customer"));
        }
        if !state.vendors.contains_key(&sale.vendor_number) {
            return Err(missing_parent("sales", "vendor"));
        }
        if !state.products.contains_key(&sale.item_number) {
            return Err(missing_parent("sales", "product"));
        }
        state.sales.push(sale.clone());
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().closed += 1;
    }
}

/// Publisher that keeps what it was given.
#[derive(Default)]
pub(crate) struct RecordingPublisher {
    published: Mutex<Vec<InvoiceNotification>>,
    fail_next: AtomicBool,
    fail_flush: AtomicBool,
    closed: AtomicBool,
    journal: Journal,
}

impl RecordingPublisher {
    /// Record publish attempts in the store's journal.
    pub fn sharing_journal(store: &InMemoryStore) -> Self {
        Self {
            journal: Arc::clone(&store.journal),
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<InvoiceNotification> {
        self.published.lock().clone()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Make `close` report undelivered notifications.
    pub fn fail_flush(&self) {
        self.fail_flush.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InvoicePublisher for RecordingPublisher {
    async fn publish(&self, notification: &InvoiceNotification) -> Result<()> {
        self.journal.lock().push("publish");
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(KafkaError::Delivery {
                topic: "invoices".into(),
                message: "broker unavailable".into(),
            }
            .into());
        }
        self.published.lock().push(notification.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_flush.load(Ordering::SeqCst) {
            return Err(KafkaError::Flush("Operation timed out".into()).into());
        }
        Ok(())
    }
}

/// What a [`ScriptedSource`] saw, readable after the loop consumed it.
#[derive(Default)]
pub(crate) struct SourceProbe {
    pub acknowledged: Mutex<Vec<i64>>,
    pub closed: Mutex<u32>,
}

/// Source that replays a fixed list of deliveries.
pub(crate) struct ScriptedSource {
    script: VecDeque<Delivery>,
    hang_when_empty: bool,
    fail_acknowledge: bool,
    probe: Arc<SourceProbe>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Delivery>) -> Self {
        Self {
            script: script.into(),
            hang_when_empty: false,
            fail_acknowledge: false,
            probe: Arc::default(),
        }
    }

    /// Block forever once the script runs out instead of closing.
    pub fn hang_when_empty(mut self) -> Self {
        self.hang_when_empty = true;
        self
    }

    pub fn fail_acknowledge(mut self) -> Self {
        self.fail_acknowledge = true;
        self
    }

    pub fn probe(&self) -> Arc<SourceProbe> {
        Arc::clone(&self.probe)
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn next_delivery(&mut self) -> Delivery {
        match self.script.pop_front() {
            Some(delivery) => delivery,
            None if self.hang_when_empty => futures::future::pending().await,
            None => Delivery::Closed,
        }
    }

    async fn acknowledge(&mut self, message: &KafkaMessage) -> Result<()> {
        if self.fail_acknowledge {
            return Err(KafkaError::OffsetCommit("group rebalancing".into()).into());
        }
        self.probe.acknowledged.lock().push(message.offset);
        Ok(())
    }

    async fn close(&mut self) {
        *self.probe.closed.lock() += 1;
    }
}

#[derive(Default)]
pub(crate) struct HandlerProbe {
    pub closed: Mutex<u32>,
}

/// Handler that fails the customer stage for the payload `fail`.
#[derive(Default)]
pub(crate) struct StubHandler {
    probe: Arc<HandlerProbe>,
}

impl StubHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> Arc<HandlerProbe> {
        Arc::clone(&self.probe)
    }
}

#[async_trait]
impl MessageHandler for StubHandler {
    fn worker(&self) -> Worker {
        Worker::Ingest
    }

    async fn handle(&self, payload: Option<&[u8]>) -> MessageReport {
        let mut report = MessageReport::new();
        if payload == Some(b"fail".as_slice()) {
            report.record(Stage::Customer, Err(duplicate("customer", 1)));
        } else {
            report.record(Stage::Customer, Ok(()));
        }
        report
    }

    async fn close(&self) {
        *self.probe.closed.lock() += 1;
    }
}
