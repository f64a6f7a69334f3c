//! Rust models matching the database schema.

use earsiv_common::InvoiceStatus;
use serde::{Deserialize, Serialize};

/// A cached Etsy receipt without its raw payload (dashboard rows).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub receipt_id: String,
    pub buyer_name: String,
    pub total: f64,
    pub currency: String,
    pub status: String,
    pub updated_epoch: i64,
}

/// A cached Etsy receipt including the receipt JSON as Etsy returned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub receipt_id: String,
    pub buyer_name: String,
    pub total: f64,
    pub currency: String,
    pub status: String,
    pub updated_epoch: i64,
    pub raw_json: serde_json::Value,
}

/// Values written by an order upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub receipt_id: String,
    pub buyer_name: String,
    pub total: f64,
    pub currency: String,
    pub status: String,
    pub updated_epoch: i64,
    pub raw_json: serde_json::Value,
}

/// Invoice state for one receipt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub receipt_id: String,
    pub ettn: Option<String>,
    pub invoice_number: Option<String>,
    pub url: Option<String>,
    pub status: InvoiceStatus,
    pub error: Option<String>,
}

impl Invoice {
    /// Placeholder for receipts without an invoice row.
    pub fn none(receipt_id: &str) -> Self {
        Self {
            receipt_id: receipt_id.to_string(),
            ..Self::default()
        }
    }

    /// The ETTN, if one was assigned and is non-empty.
    pub fn ettn(&self) -> Option<&str> {
        self.ettn.as_deref().filter(|e| !e.is_empty())
    }
}

/// A partial update of an invoice row.
///
/// `None` leaves the column untouched; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceUpdate {
    pub status: Option<InvoiceStatus>,
    pub ettn: Option<Option<String>>,
    pub invoice_number: Option<Option<String>>,
    pub url: Option<Option<String>>,
    pub error: Option<Option<String>>,
}

impl InvoiceUpdate {
    /// Invoice saved in Luca: new ETTN and number, no URL yet, error cleared.
    pub fn created(ettn: &str, invoice_number: &str) -> Self {
        Self {
            status: Some(InvoiceStatus::Created),
            ettn: Some(Some(ettn.to_string())),
            invoice_number: Some(Some(invoice_number.to_string())),
            url: Some(None),
            error: Some(None),
        }
    }

    /// Invoice sent; its public document URL is known.
    pub fn sent(url: &str) -> Self {
        Self {
            status: Some(InvoiceStatus::Sent),
            url: Some(Some(url.to_string())),
            error: Some(None),
            ..Self::default()
        }
    }

    /// The last operation failed with `message`; other fields are kept.
    pub fn failed(message: &str) -> Self {
        Self {
            status: Some(InvoiceStatus::Error),
            error: Some(Some(message.to_string())),
            ..Self::default()
        }
    }

    /// Only refresh the document URL.
    pub fn url(url: &str) -> Self {
        Self {
            url: Some(Some(url.to_string())),
            ..Self::default()
        }
    }

    /// Apply this update on top of `invoice`.
    pub fn apply(&self, invoice: &mut Invoice) {
        if let Some(status) = self.status {
            invoice.status = status;
        }
        if let Some(ref ettn) = self.ettn {
            invoice.ettn = ettn.clone();
        }
        if let Some(ref number) = self.invoice_number {
            invoice.invoice_number = number.clone();
        }
        if let Some(ref url) = self.url {
            invoice.url = url.clone();
        }
        if let Some(ref error) = self.error {
            invoice.error = error.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_keeps_ettn() {
        let mut inv = Invoice::none("1");
        InvoiceUpdate::created("ettn-1", "ABC2024000000001").apply(&mut inv);
        InvoiceUpdate::failed("timeout").apply(&mut inv);

        assert_eq!(inv.status, InvoiceStatus::Error);
        assert_eq!(inv.ettn(), Some("ettn-1"));
        assert_eq!(inv.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn sent_clears_error() {
        let mut inv = Invoice::none("1");
        InvoiceUpdate::failed("timeout").apply(&mut inv);
        InvoiceUpdate::sent("https://example.test/doc").apply(&mut inv);

        assert_eq!(inv.status, InvoiceStatus::Sent);
        assert_eq!(inv.error, None);
        assert_eq!(inv.url.as_deref(), Some("https://example.test/doc"));
    }

    #[test]
    fn empty_ettn_is_absent() {
        let mut inv = Invoice::none("1");
        InvoiceUpdate::created("", "").apply(&mut inv);
        assert_eq!(inv.ettn(), None);
    }
}
