//! Invoice state queries.
//!
//! Updates are partial: only the fields named by an [`InvoiceUpdate`] change.
//! A receipt without a row is reported as status `NONE` by callers.

use std::collections::HashMap;

use earsiv_common::{Error, InvoiceStatus, Result};
use rusqlite::{Connection, Row};

use crate::models::{Invoice, InvoiceUpdate};
use crate::now_local_iso;

/// Apply `update` to the invoice for `receipt_id`, creating the row if needed.
///
/// Returns the invoice as stored after the update.
pub fn upsert_invoice(conn: &Connection, receipt_id: &str, update: &InvoiceUpdate) -> Result<Invoice> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let existing = get_invoice(&tx, receipt_id)?;
    let now = now_local_iso();

    let invoice = match existing {
        Some(mut invoice) => {
            update.apply(&mut invoice);
            tx.execute(
                "UPDATE invoices
                 SET ettn = :ettn, invoice_number = :invoice_number, url = :url,
                     status = :status, error = :error, updated_at = :now
                 WHERE receipt_id = :receipt_id",
                rusqlite::named_params! {
                    ":ettn": invoice.ettn,
                    ":invoice_number": invoice.invoice_number,
                    ":url": invoice.url,
                    ":status": invoice.status.as_str(),
                    ":error": invoice.error,
                    ":now": now,
                    ":receipt_id": receipt_id,
                },
            )
            .map_err(|e| Error::database(e.to_string()))?;
            invoice
        }
        None => {
            let mut invoice = Invoice::none(receipt_id);
            update.apply(&mut invoice);
            tx.execute(
                "INSERT INTO invoices (receipt_id, ettn, invoice_number, url, status, error,
                                       created_at, updated_at)
                 VALUES (:receipt_id, :ettn, :invoice_number, :url, :status, :error, :now, :now)",
                rusqlite::named_params! {
                    ":receipt_id": receipt_id,
                    ":ettn": invoice.ettn,
                    ":invoice_number": invoice.invoice_number,
                    ":url": invoice.url,
                    ":status": invoice.status.as_str(),
                    ":error": invoice.error,
                    ":now": now,
                },
            )
            .map_err(|e| Error::database(e.to_string()))?;
            invoice
        }
    };

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(invoice)
}

/// Get the invoice for one receipt.
pub fn get_invoice(conn: &Connection, receipt_id: &str) -> Result<Option<Invoice>> {
    let result = conn.query_row(
        "SELECT receipt_id, ettn, invoice_number, url, status, error
         FROM invoices WHERE receipt_id = :receipt_id",
        rusqlite::named_params! { ":receipt_id": receipt_id },
        invoice_from_row,
    );

    match result {
        Ok(invoice) => Ok(Some(invoice)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// All invoices keyed by receipt id.
pub fn invoices_by_receipt(conn: &Connection) -> Result<HashMap<String, Invoice>> {
    let mut stmt = conn
        .prepare("SELECT receipt_id, ettn, invoice_number, url, status, error FROM invoices")
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map([], invoice_from_row)
        .map_err(|e| Error::database(e.to_string()))?;

    let mut map = HashMap::new();
    for row in rows {
        let invoice = row.map_err(|e| Error::database(e.to_string()))?;
        map.insert(invoice.receipt_id.clone(), invoice);
    }
    Ok(map)
}

fn invoice_from_row(row: &Row<'_>) -> rusqlite::Result<Invoice> {
    let status: Option<String> = row.get(4)?;
    Ok(Invoice {
        receipt_id: row.get(0)?,
        ettn: row.get(1)?,
        invoice_number: row.get(2)?,
        url: row.get(3)?,
        status: status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(InvoiceStatus::None),
        error: row.get(5)?,
    })
}
