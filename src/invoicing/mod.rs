//! Order sync and invoice actions.
//!
//! [`InvoiceService`] ties the database, Etsy and Luca together. The poller
//! and the HTTP handlers share one instance; sync cycles are serialized by an
//! internal mutex.

use std::fmt;

use earsiv_common::{Error, InvoiceStatus, Result};
use earsiv_db::models::{Invoice, InvoiceUpdate, NewOrder};
use earsiv_db::pool::{get_conn, DbPool};
use earsiv_db::queries::{invoices, orders, settings as db_settings};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{Config, SettingDefaults};
use crate::etsy::{EtsyClient, Receipt};
use crate::luca::{build_archive_payload, LucaClient};
use crate::settings::{Settings, LAST_SYNC_EPOCH};

/// Window used when no sync has run yet.
const FIRST_SYNC_WINDOW_SECS: i64 = 24 * 3600;

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub orders: usize,
    pub invoices_created: usize,
    pub errors: usize,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Synced {} order(s), created {} invoice(s), {} error(s)",
            self.orders, self.invoices_created, self.errors
        )
    }
}

/// Outcome of a bulk action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub errors: usize,
}

/// What `GET /invoice/pdf` should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvoiceDocument {
    Pdf(Vec<u8>),
    Url(String),
}

/// Split a comma separated id list, dropping blanks.
pub fn parse_ids(ids: &str) -> Vec<String> {
    ids.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Cache row for a receipt.
pub fn order_from_receipt(receipt: &Receipt, currency_fallback: &str, now: i64) -> Result<NewOrder> {
    let receipt_id = receipt
        .receipt_key()
        .ok_or_else(|| Error::validation("Receipt has no receipt_id"))?;
    Ok(NewOrder {
        receipt_id,
        buyer_name: receipt.buyer_name(),
        total: receipt.total(),
        currency: receipt
            .currency()
            .unwrap_or(currency_fallback)
            .to_string(),
        status: receipt.status_upper(),
        updated_epoch: receipt.updated_epoch(now),
        raw_json: receipt.raw_json().clone(),
    })
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub struct InvoiceService {
    pool: DbPool,
    defaults: SettingDefaults,
    etsy: EtsyClient,
    luca: LucaClient,
    sync_lock: Mutex<()>,
}

impl InvoiceService {
    pub fn new(pool: DbPool, config: &Config) -> Self {
        Self {
            pool,
            defaults: config.defaults.clone(),
            etsy: EtsyClient::new(&config.etsy),
            luca: LucaClient::new(&config.luca),
            sync_lock: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn defaults(&self) -> &SettingDefaults {
        &self.defaults
    }

    /// Current runtime settings.
    pub fn settings(&self) -> Result<Settings> {
        let conn = get_conn(&self.pool)?;
        Settings::load(&conn, &self.defaults)
    }

    fn store_last_sync(&self, epoch: i64) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        db_settings::set_setting(&conn, LAST_SYNC_EPOCH, &epoch.to_string())
    }

    fn update_invoice(&self, receipt_id: &str, update: &InvoiceUpdate) -> Result<Invoice> {
        let conn = get_conn(&self.pool)?;
        invoices::upsert_invoice(&conn, receipt_id, update)
    }

    fn find_invoice(&self, receipt_id: &str) -> Result<Option<Invoice>> {
        let conn = get_conn(&self.pool)?;
        invoices::get_invoice(&conn, receipt_id)
    }

    /// Store a failure on the invoice row; the original error is what callers see.
    fn record_failure(&self, receipt_id: &str, error: &Error) {
        warn!(receipt_id, error = %error, "Invoice operation failed");
        if let Err(e) = self.update_invoice(receipt_id, &InvoiceUpdate::failed(&error.to_string())) {
            warn!(receipt_id, error = %e, "Failed to record invoice error");
        }
    }

    fn cached_receipt(&self, receipt_id: &str) -> Result<Receipt> {
        let conn = get_conn(&self.pool)?;
        let order = orders::get_order(&conn, receipt_id)?
            .ok_or_else(|| Error::not_found("order", receipt_id))?;
        drop(conn);

        Receipt::from_value(order.raw_json)
            .map_err(|e| Error::internal(format!("Stored receipt {receipt_id} is unreadable: {e}")))
    }

    /// Fetch receipts modified since the last sync, cache them, and create
    /// and send invoices when auto-invoicing is on.
    ///
    /// Failures to obtain tokens or list receipts abort the cycle and leave
    /// the sync position unchanged.
    pub async fn sync_orders(&self) -> Result<SyncReport> {
        let _guard = self.sync_lock.lock().await;
        let settings = self.settings()?;
        let now = unix_now();

        let last_sync = match settings.last_sync_epoch {
            0 => now - FIRST_SYNC_WINDOW_SECS,
            epoch => epoch,
        };

        let access = self.etsy.refresh_access_token(&settings).await?;
        let receipts = self.etsy.receipts(&settings, &access, last_sync).await?;

        if receipts.is_empty() {
            self.store_last_sync(last_sync + 1)?;
            debug!(last_sync, "No receipts modified since last sync");
            return Ok(SyncReport::default());
        }

        let luca_token = if settings.auto_invoice {
            Some(self.luca.login(&settings).await?)
        } else {
            None
        };

        let mut report = SyncReport {
            orders: receipts.len(),
            ..SyncReport::default()
        };
        let mut max_updated = last_sync;

        for receipt in &receipts {
            max_updated = max_updated.max(receipt.updated_epoch(now));

            let Some(receipt_id) = receipt.receipt_key() else {
                warn!("Skipping receipt without receipt_id");
                report.errors += 1;
                continue;
            };

            match self
                .sync_receipt(&settings, &access, luca_token.as_deref(), receipt, &receipt_id, now)
                .await
            {
                Ok(created) => {
                    if created {
                        report.invoices_created += 1;
                    }
                }
                Err(e) => {
                    report.errors += 1;
                    self.record_failure(&receipt_id, &e);
                }
            }
        }

        self.store_last_sync(max_updated + 1)?;
        info!(
            orders = report.orders,
            invoices_created = report.invoices_created,
            errors = report.errors,
            "Sync finished"
        );
        Ok(report)
    }

    /// Cache one receipt and, with a Luca token, invoice it.
    ///
    /// Returns whether a new invoice was created.
    async fn sync_receipt(
        &self,
        settings: &Settings,
        access: &str,
        luca_token: Option<&str>,
        receipt: &Receipt,
        receipt_id: &str,
        now: i64,
    ) -> Result<bool> {
        let order = order_from_receipt(receipt, &settings.currency_fallback, now)?;
        {
            let conn = get_conn(&self.pool)?;
            orders::upsert_order(&conn, &order)?;
        }

        let Some(token) = luca_token else {
            return Ok(false);
        };

        let existing = self.find_invoice(receipt_id)?;
        let existing_ettn = match &existing {
            Some(inv) if inv.status == InvoiceStatus::Sent => {
                debug!(receipt_id, "Invoice already sent");
                return Ok(false);
            }
            Some(inv) => inv.ettn().map(str::to_string),
            None => None,
        };

        let (ettn, created) = match existing_ettn {
            Some(ettn) => (ettn, false),
            None => {
                let txs = self.etsy.transactions(settings, access, receipt_id).await?;
                let payload = build_archive_payload(settings, receipt, &txs, now)?;
                let saved = self.luca.save_archive(settings, token, &payload).await?;
                self.update_invoice(
                    receipt_id,
                    &InvoiceUpdate::created(&saved.ettn, &saved.invoice_number),
                )?;
                (saved.ettn, true)
            }
        };

        if !ettn.is_empty() {
            self.luca.send_archive(settings, token, &ettn).await?;
            let url = self.luca.external_url(settings, token, &ettn).await?;
            self.update_invoice(receipt_id, &InvoiceUpdate::sent(&url))?;
        }

        Ok(created)
    }

    async fn create_with(
        &self,
        settings: &Settings,
        access: &str,
        token: &str,
        receipt_id: &str,
        receipt: &Receipt,
    ) -> Result<Invoice> {
        let txs = self.etsy.transactions(settings, access, receipt_id).await?;
        let payload = build_archive_payload(settings, receipt, &txs, unix_now())?;
        let saved = self.luca.save_archive(settings, token, &payload).await?;
        self.update_invoice(
            receipt_id,
            &InvoiceUpdate::created(&saved.ettn, &saved.invoice_number),
        )
    }

    async fn send_with(
        &self,
        settings: &Settings,
        token: &str,
        receipt_id: &str,
        ettn: &str,
    ) -> Result<Invoice> {
        self.luca.send_archive(settings, token, ettn).await?;
        let url = self.luca.external_url(settings, token, ettn).await?;
        self.update_invoice(receipt_id, &InvoiceUpdate::sent(&url))
    }

    /// Save an invoice for a cached order in Luca.
    pub async fn create_invoice(&self, receipt_id: &str) -> Result<Invoice> {
        let settings = self.settings()?;
        let receipt = self.cached_receipt(receipt_id)?;

        let result = async {
            let token = self.luca.login(&settings).await?;
            let access = self.etsy.refresh_access_token(&settings).await?;
            self.create_with(&settings, &access, &token, receipt_id, &receipt)
                .await
        }
        .await;

        match result {
            Ok(invoice) => {
                info!(receipt_id, ettn = ?invoice.ettn, "Invoice created");
                Ok(invoice)
            }
            Err(e) => {
                self.record_failure(receipt_id, &e);
                Err(e)
            }
        }
    }

    /// Issue a previously created invoice.
    pub async fn send_invoice(&self, receipt_id: &str) -> Result<Invoice> {
        let settings = self.settings()?;
        let ettn = self
            .find_invoice(receipt_id)?
            .and_then(|inv| inv.ettn().map(str::to_string))
            .ok_or_else(|| Error::validation("No invoice ETTN found. Create invoice first."))?;

        let result = async {
            let token = self.luca.login(&settings).await?;
            self.send_with(&settings, &token, receipt_id, &ettn).await
        }
        .await;

        match result {
            Ok(invoice) => {
                info!(receipt_id, "Invoice sent");
                Ok(invoice)
            }
            Err(e) => {
                self.record_failure(receipt_id, &e);
                Err(e)
            }
        }
    }

    fn invoice_with_ettn(&self, receipt_id: &str) -> Result<(Invoice, String)> {
        let invoice = self
            .find_invoice(receipt_id)?
            .ok_or_else(|| Error::not_found("invoice", receipt_id))?;
        let ettn = invoice
            .ettn()
            .map(str::to_string)
            .ok_or_else(|| Error::not_found("invoice", receipt_id))?;
        Ok((invoice, ettn))
    }

    /// Public document URL, fetched from Luca and stored when not known yet.
    pub async fn invoice_url(&self, receipt_id: &str) -> Result<String> {
        let (invoice, ettn) = self.invoice_with_ettn(receipt_id)?;
        if let Some(url) = invoice.url.filter(|u| !u.is_empty()) {
            return Ok(url);
        }

        let settings = self.settings()?;
        let token = self.luca.login(&settings).await?;
        let url = self.luca.external_url(&settings, &token, &ettn).await?;
        if !url.is_empty() {
            self.update_invoice(receipt_id, &InvoiceUpdate::url(&url))?;
        }
        Ok(url)
    }

    /// Invoice PDF, or the document URL when Luca offers no PDF.
    pub async fn invoice_pdf(&self, receipt_id: &str) -> Result<InvoiceDocument> {
        let (_, ettn) = self.invoice_with_ettn(receipt_id)?;
        let settings = self.settings()?;
        let token = self.luca.login(&settings).await?;

        match self.luca.pdf(&settings, &token, &ettn).await {
            Some(bytes) => Ok(InvoiceDocument::Pdf(bytes)),
            None => {
                debug!(receipt_id, "No PDF available, falling back to document URL");
                let url = self.luca.external_url(&settings, &token, &ettn).await?;
                Ok(InvoiceDocument::Url(url))
            }
        }
    }

    /// Create invoices for a comma separated list of receipt ids.
    pub async fn bulk_create(&self, ids: &str) -> Result<BatchReport> {
        let ids = parse_ids(ids);
        let mut report = BatchReport::default();
        if ids.is_empty() {
            return Ok(report);
        }

        let settings = self.settings()?;
        let access = self.etsy.refresh_access_token(&settings).await?;
        let token = self.luca.login(&settings).await?;

        for receipt_id in &ids {
            let receipt = match self.cached_receipt(receipt_id) {
                Ok(r) => r,
                Err(e) => {
                    debug!(receipt_id, error = %e, "Skipping receipt");
                    report.errors += 1;
                    continue;
                }
            };
            match self
                .create_with(&settings, &access, &token, receipt_id, &receipt)
                .await
            {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    report.errors += 1;
                    self.record_failure(receipt_id, &e);
                }
            }
        }

        info!(created = report.succeeded, errors = report.errors, "Bulk create finished");
        Ok(report)
    }

    /// Send invoices for a comma separated list of receipt ids.
    pub async fn bulk_send(&self, ids: &str) -> Result<BatchReport> {
        let ids = parse_ids(ids);
        let mut report = BatchReport::default();
        if ids.is_empty() {
            return Ok(report);
        }

        let settings = self.settings()?;
        let token = self.luca.login(&settings).await?;

        for receipt_id in &ids {
            let ettn = match self.find_invoice(receipt_id) {
                Ok(invoice) => invoice.and_then(|inv| inv.ettn().map(str::to_string)),
                Err(e) => {
                    warn!(receipt_id, error = %e, "Failed to read invoice");
                    report.errors += 1;
                    continue;
                }
            };
            let Some(ettn) = ettn else {
                debug!(receipt_id, "Skipping receipt without ETTN");
                report.errors += 1;
                continue;
            };
            match self.send_with(&settings, &token, receipt_id, &ettn).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    report.errors += 1;
                    self.record_failure(receipt_id, &e);
                }
            }
        }

        info!(sent = report.succeeded, errors = report.errors, "Bulk send finished");
        Ok(report)
    }

    /// Check the Etsy credentials with a token refresh and a small listing.
    pub async fn test_etsy(&self) -> Result<()> {
        let settings = self.settings()?;
        let access = self.etsy.refresh_access_token(&settings).await?;
        self.etsy
            .receipts(&settings, &access, unix_now() - FIRST_SYNC_WINDOW_SECS)
            .await?;
        Ok(())
    }

    /// Check the Luca credentials with a login.
    pub async fn test_luca(&self) -> Result<()> {
        let settings = self.settings()?;
        self.luca.login(&settings).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_are_trimmed_and_blanks_dropped() {
        assert_eq!(parse_ids(" 1, 2,,3 ,"), vec!["1", "2", "3"]);
        assert!(parse_ids("").is_empty());
        assert!(parse_ids(" , ").is_empty());
    }

    #[test]
    fn order_row_from_receipt() {
        let receipt = Receipt::from_value(json!({
            "receipt_id": 42,
            "name": " Jane ",
            "status": "paid",
            "total_price": {"amount": 1500, "divisor": 100},
            "last_modified_tsz": 1_700_000_100
        }))
        .unwrap();

        let order = order_from_receipt(&receipt, "TRY", 5).unwrap();
        assert_eq!(order.receipt_id, "42");
        assert_eq!(order.buyer_name, "Jane");
        assert_eq!(order.total, 15.0);
        assert_eq!(order.currency, "TRY");
        assert_eq!(order.status, "PAID");
        assert_eq!(order.updated_epoch, 1_700_000_100);
        assert_eq!(order.raw_json["receipt_id"], 42);
    }

    #[test]
    fn receipt_without_id_is_rejected() {
        let err = order_from_receipt(&Receipt::default(), "TRY", 0).unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn report_message() {
        let report = SyncReport {
            orders: 3,
            invoices_created: 2,
            errors: 1,
        };
        assert_eq!(
            report.to_string(),
            "Synced 3 order(s), created 2 invoice(s), 1 error(s)"
        );
    }
}
