//! MySQL-backed store using a single pooled connection.

use super::{CatalogStore, LedgerStore};
use crate::config::MySqlConfig;
use crate::records::{Category, Customer, LedgerPair, Product, SaleRecord, Vendor};
use crate::{DatabaseError, Error, Result};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::time::Duration;
use tracing::{debug, info};

const LEDGER_CREDIT: &str = "INSERT INTO ledger (InvoiceItemNumber, credit, note) VALUES (?, ?, ?)";

const LEDGER_DEBIT: &str = "INSERT INTO ledger (InvoiceItemNumber, debit, note) VALUES (?, ?, ?)";

const CUSTOMER_INSERT: &str = "INSERT INTO customer \
    (StoreNumber, StoreName, Address, City, CountyName, State, ZipCode) \
    VALUES (?, ?, ?, ?, ?, ?, ?)";

const VENDOR_INSERT: &str = "INSERT INTO vendor (VendorNumber, VendorName) VALUES (?, ?)";

const CATEGORY_INSERT: &str =
    "INSERT INTO category (CategoryNumber, CategoryName) VALUES (?, ?)";

const PRODUCT_INSERT: &str = "INSERT INTO product \
    (ItemNumber, CategoryNumber, ItemDescription, BottleVolumeML, Pack, BottleCost, BottleRetail) \
    VALUES (?, ?, ?, ?, ?, ?, ?)";

const SALES_INSERT: &str = "INSERT INTO sales \
    (Invoice, StoreNumber, VendorNumber, SaleDate, SaleDollars, ItemNumber, VolumeSoldLiters, BottlesSold) \
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)";

/// Store backed by a MySQL pool capped at one connection.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    /// Connect to the configured database.
    pub async fn connect(config: &MySqlConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                host: format!("{}:{}", config.host, config.port),
                message: e.to_string(),
            })?;

        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Connected to MySQL"
        );

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

/// Classify an insert failure, separating duplicate keys from other errors.
fn insert_error(table: &'static str, err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(ref db) = err {
        if db.is_unique_violation() {
            return DatabaseError::DuplicateKey {
                table,
                message: db.message().to_string(),
            }
            .into();
        }
    }
    DatabaseError::Insert {
        table,
        message: err.to_string(),
    }
    .into()
}

fn transaction_error(err: sqlx::Error) -> Error {
    DatabaseError::Transaction(err.to_string()).into()
}

#[async_trait]
impl LedgerStore for MySqlStore {
    async fn post_pair(&self, pair: &LedgerPair) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(transaction_error)?;

        // Dropping `tx` on an early return rolls back the credit.
        sqlx::query(LEDGER_CREDIT)
            .bind(&pair.credit.invoice)
            .bind(pair.credit.credit)
            .bind(pair.credit.note.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| insert_error("ledger", e))?;

        sqlx::query(LEDGER_DEBIT)
            .bind(&pair.debit.invoice)
            .bind(pair.debit.debit)
            .bind(pair.debit.note.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| insert_error("ledger", e))?;

        tx.commit().await.map_err(transaction_error)?;

        debug!(invoice = %pair.credit.invoice, "Ledger pair committed");
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("MySQL connection closed");
    }
}

#[async_trait]
impl CatalogStore for MySqlStore {
    async fn insert_customer(&self, c: &Customer) -> Result<()> {
        sqlx::query(CUSTOMER_INSERT)
            .bind(c.store_number)
            .bind(&c.store_name)
            .bind(&c.address)
            .bind(&c.city)
            .bind(&c.county)
            .bind(&c.state)
            .bind(c.zip_code)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error("customer", e))?;
        Ok(())
    }

    async fn insert_vendor(&self, v: &Vendor) -> Result<()> {
        sqlx::query(VENDOR_INSERT)
            .bind(v.vendor_number)
            .bind(&v.vendor_name)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error("vendor", e))?;
        Ok(())
    }

    async fn insert_category(&self, c: &Category) -> Result<()> {
        sqlx::query(CATEGORY_INSERT)
            .bind(c.category_number)
            .bind(&c.category_name)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error("category", e))?;
        Ok(())
    }

    async fn insert_product(&self, p: &Product) -> Result<()> {
        sqlx::query(PRODUCT_INSERT)
            .bind(p.item_number)
            .bind(p.category_number)
            .bind(&p.description)
            .bind(p.volume_ml)
            .bind(p.pack)
            .bind(p.cost)
            .bind(p.retail)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error("product", e))?;
        Ok(())
    }

    async fn insert_sale(&self, s: &SaleRecord) -> Result<()> {
        sqlx::query(SALES_INSERT)
            .bind(&s.invoice)
            .bind(s.store_number)
            .bind(s.vendor_number)
            .bind(s.sale_date)
            .bind(s.sale_dollars)
            .bind(s.item_number)
            .bind(s.liters_sold)
            .bind(s.bottles_sold)
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error("sales", e))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("MySQL connection closed");
    }
}
