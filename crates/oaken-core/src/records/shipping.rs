//! Shipping/sale events and the ledger entries derived from them.

use super::fields::{parse_currency, Fields};
use crate::RecordError;
use rust_decimal::Decimal;

/// Field holding the invoice/item identifier.
pub const INVOICE_FIELD: &str = "Invoice/Item Number";
/// Field holding the shipping cost.
pub const SHIPPING_COST_FIELD: &str = "Shipping Cost";
/// Field holding the sale amount.
pub const SALES_FIELD: &str = "sales";

/// Tag stored in the ledger `note` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerNote {
    /// Sale credit
    Sale,
    /// Shipping debit
    Shipping,
}

impl LedgerNote {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerNote::Sale => "sale",
            LedgerNote::Shipping => "shipping",
        }
    }
}

/// One row of the `ledger` table.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub invoice: String,
    pub credit: Option<Decimal>,
    pub debit: Option<Decimal>,
    pub note: LedgerNote,
}

/// Offsetting credit and debit for one event. Always written together.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerPair {
    pub credit: LedgerEntry,
    pub debit: LedgerEntry,
}

impl LedgerPair {
    /// Entries in write order: credit first.
    pub fn entries(&self) -> [&LedgerEntry; 2] {
        [&self.credit, &self.debit]
    }
}

/// A shipping/sale event as received, all fields kept as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShippingEvent {
    pub invoice: String,
    pub shipping_cost: String,
    pub sales: String,
}

impl ShippingEvent {
    /// Read the event fields, defaulting each to empty.
    pub fn from_fields(fields: &Fields) -> Self {
        Self {
            invoice: fields.text(INVOICE_FIELD),
            shipping_cost: fields.text(SHIPPING_COST_FIELD),
            sales: fields.text(SALES_FIELD),
        }
    }

    /// Derive the ledger pair: `sales` as credit, negated shipping cost as debit.
    pub fn ledger_pair(&self) -> Result<LedgerPair, RecordError> {
        if self.invoice.trim().is_empty() {
            return Err(RecordError::Missing {
                field: INVOICE_FIELD,
            });
        }

        let sales = amount(SALES_FIELD, &self.sales)?;
        let shipping_cost = amount(SHIPPING_COST_FIELD, &self.shipping_cost)?;

        Ok(LedgerPair {
            credit: LedgerEntry {
                invoice: self.invoice.clone(),
                credit: Some(sales),
                debit: None,
                note: LedgerNote::Sale,
            },
            debit: LedgerEntry {
                invoice: self.invoice.clone(),
                credit: None,
                debit: Some(-shipping_cost),
                note: LedgerNote::Shipping,
            },
        })
    }
}

fn amount(field: &'static str, value: &str) -> Result<Decimal, RecordError> {
    if value.trim().is_empty() {
        return Err(RecordError::Missing { field });
    }
    parse_currency(value).ok_or_else(|| RecordError::InvalidDecimal {
        field,
        value: value.to_string(),
    })
}
