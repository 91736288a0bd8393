//! Input records and the rows derived from them.

pub mod fields;
pub mod invoice;
pub mod sale;
pub mod shipping;

pub use fields::Fields;
pub use invoice::InvoiceNotification;
pub use sale::{Category, Customer, PointOfSaleRecord, Product, SaleRecord, Vendor};
pub use shipping::{LedgerEntry, LedgerNote, LedgerPair, ShippingEvent};
