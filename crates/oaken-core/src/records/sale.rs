//! Point-of-sale records and the catalog/sales rows derived from them.

use super::fields::{strip_currency, Fields};
use super::invoice::InvoiceNotification;
use crate::RecordError;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Row of the `customer` table (one store).
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub store_number: i64,
    pub store_name: String,
    pub address: String,
    pub city: String,
    pub county: String,
    pub state: String,
    pub zip_code: i64,
}

/// Row of the `vendor` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Vendor {
    pub vendor_number: i64,
    pub vendor_name: String,
}

/// Row of the `category` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub category_number: i64,
    pub category_name: String,
}

/// Row of the `product` table. `category_number` references [`Category`].
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub item_number: i64,
    pub category_number: i64,
    pub description: String,
    pub volume_ml: i64,
    pub pack: i64,
    pub cost: Decimal,
    pub retail: Decimal,
}

/// Row of the `sales` table.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleRecord {
    pub invoice: String,
    pub store_number: i64,
    pub vendor_number: i64,
    pub sale_date: NaiveDate,
    pub sale_dollars: Decimal,
    pub item_number: i64,
    pub liters_sold: Decimal,
    pub bottles_sold: i64,
}

/// A fully typed point-of-sale record.
#[derive(Debug, Clone, PartialEq)]
pub struct PointOfSaleRecord {
    pub customer: Customer,
    pub vendor: Vendor,
    pub category: Category,
    pub product: Product,
    pub sale: SaleRecord,
    /// Notification to publish once the rows above have been written
    pub notification: InvoiceNotification,
}

impl PointOfSaleRecord {
    /// Extract and validate every field. Any failure rejects the whole record.
    pub fn from_fields(f: &Fields) -> Result<Self, RecordError> {
        let customer = Customer {
            store_number: f.identifier("StoreNumber")?,
            store_name: f.text("StoreName"),
            address: f.text("Address"),
            city: f.text("City"),
            county: f.text("County"),
            state: f.text("State"),
            zip_code: f.integer("ZipCode")?,
        };

        let vendor = Vendor {
            vendor_number: f.truncated_identifier("VendorNumber")?,
            vendor_name: f.text("VendorName"),
        };

        let category = Category {
            category_number: f.truncated_identifier("Category")?,
            category_name: f.text("CategoryName"),
        };

        let product = Product {
            item_number: f.identifier("ItemNumber")?,
            category_number: category.category_number,
            description: f.text("ItemDescription"),
            pack: f.integer("Pack")?,
            volume_ml: f.integer("BottleVolumeML")?,
            cost: f.currency("BottleCost")?,
            retail: f.currency("BottleRetail")?,
        };

        let invoice = f.required_text("Invoice")?;
        let date_text = f.text("Date");
        let sale_dollars_text = f.text("SaleDollars");

        let sale = SaleRecord {
            invoice: invoice.clone(),
            store_number: customer.store_number,
            vendor_number: vendor.vendor_number,
            sale_date: f.date("Date")?,
            bottles_sold: f.integer("BottlesSold")?,
            liters_sold: f.decimal("VolumeSoldLiters")?,
            sale_dollars: f.currency("SaleDollars")?,
            item_number: product.item_number,
        };

        let notification = InvoiceNotification {
            invoice,
            sale_date: date_text,
            sale_dollars: strip_currency(&sale_dollars_text).to_string(),
        };

        Ok(Self {
            customer,
            vendor,
            category,
            product,
            sale,
            notification,
        })
    }
}
