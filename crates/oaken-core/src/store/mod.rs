//! Relational storage for ledger, catalog and sales rows.
//!
//! All writes are inserts; nothing here updates or deletes a row.

pub mod mysql;

use crate::records::{Category, Customer, LedgerPair, Product, SaleRecord, Vendor};
use crate::Result;
use async_trait::async_trait;

pub use mysql::MySqlStore;

/// Destination for ledger postings.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert the credit then the debit in one transaction.
    ///
    /// Either both rows are committed or neither is.
    async fn post_pair(&self, pair: &LedgerPair) -> Result<()>;

    /// Release the underlying connection.
    async fn close(&self) {}
}

/// Destination for catalog and sales rows.
///
/// Each insert commits on its own; a failure in one leaves the others
/// untouched.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_customer(&self, customer: &Customer) -> Result<()>;

    async fn insert_vendor(&self, vendor: &Vendor) -> Result<()>;

    async fn insert_category(&self, category: &Category) -> Result<()>;

    /// The referenced category must have been inserted first.
    async fn insert_product(&self, product: &Product) -> Result<()>;

    async fn insert_sale(&self, sale: &SaleRecord) -> Result<()>;

    /// Release the underlying connection.
    async fn close(&self) {}
}
