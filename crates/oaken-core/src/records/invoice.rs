//! Invoice notification published after a sale has been ingested.

use serde::{Deserialize, Serialize};

/// Message written to the invoices topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceNotification {
    #[serde(rename = "Invoice")]
    pub invoice: String,

    /// Sale date exactly as received
    #[serde(rename = "SaleDate")]
    pub sale_date: String,

    /// Sale amount as received, without the `$`
    #[serde(rename = "saleDollars")]
    pub sale_dollars: String,
}

impl InvoiceNotification {
    /// JSON encoding used on the wire.
    pub fn to_json(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
