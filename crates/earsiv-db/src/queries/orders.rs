//! Cached Etsy order queries.

use earsiv_common::{Error, Result};
use rusqlite::{Connection, Row};

use crate::models::{NewOrder, Order, OrderSummary};
use crate::now_local_iso;

/// Insert an order or refresh every column except `created_at`.
pub fn upsert_order(conn: &Connection, order: &NewOrder) -> Result<()> {
    let now = now_local_iso();
    let raw = serde_json::to_string(&order.raw_json)
        .map_err(|e| Error::internal(format!("Failed to serialize receipt: {e}")))?;

    conn.execute(
        "INSERT INTO orders (receipt_id, buyer_name, total, currency, status, updated_epoch,
                             raw_json, created_at, updated_at)
         VALUES (:receipt_id, :buyer_name, :total, :currency, :status, :updated_epoch,
                 :raw_json, :now, :now)
         ON CONFLICT(receipt_id) DO UPDATE SET
             buyer_name    = excluded.buyer_name,
             total         = excluded.total,
             currency      = excluded.currency,
             status        = excluded.status,
             updated_epoch = excluded.updated_epoch,
             raw_json      = excluded.raw_json,
             updated_at    = excluded.updated_at",
        rusqlite::named_params! {
            ":receipt_id": order.receipt_id,
            ":buyer_name": order.buyer_name,
            ":total": order.total,
            ":currency": order.currency,
            ":status": order.status,
            ":updated_epoch": order.updated_epoch,
            ":raw_json": raw,
            ":now": now,
        },
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}

/// Get one order with its raw receipt JSON.
pub fn get_order(conn: &Connection, receipt_id: &str) -> Result<Option<Order>> {
    let result = conn.query_row(
        "SELECT receipt_id, buyer_name, total, currency, status, updated_epoch, raw_json
         FROM orders WHERE receipt_id = :receipt_id",
        rusqlite::named_params! { ":receipt_id": receipt_id },
        |row| {
            let summary = summary_from_row(row)?;
            let raw: Option<String> = row.get(6)?;
            Ok((summary, raw))
        },
    );

    let (summary, raw) = match result {
        Ok(found) => found,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(Error::database(e.to_string())),
    };

    let raw_json = match raw.as_deref().filter(|r| !r.is_empty()) {
        Some(r) => serde_json::from_str(r)
            .map_err(|e| Error::database(format!("Corrupt raw_json for {receipt_id}: {e}")))?,
        None => serde_json::Value::Object(Default::default()),
    };

    Ok(Some(Order {
        receipt_id: summary.receipt_id,
        buyer_name: summary.buyer_name,
        total: summary.total,
        currency: summary.currency,
        status: summary.status,
        updated_epoch: summary.updated_epoch,
        raw_json,
    }))
}

/// Orders updated at or after `cutoff_epoch`, newest first.
pub fn recent_orders(conn: &Connection, cutoff_epoch: i64, limit: usize) -> Result<Vec<OrderSummary>> {
    let mut stmt = conn
        .prepare(
            "SELECT receipt_id, buyer_name, total, currency, status, updated_epoch
             FROM orders
             WHERE updated_epoch >= :cutoff
             ORDER BY updated_epoch DESC
             LIMIT :limit",
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map(
            rusqlite::named_params! { ":cutoff": cutoff_epoch, ":limit": limit as i64 },
            summary_from_row,
        )
        .map_err(|e| Error::database(e.to_string()))?;

    let orders = rows
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(orders)
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<OrderSummary> {
    Ok(OrderSummary {
        receipt_id: row.get(0)?,
        buyer_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        total: row.get::<_, Option<f64>>(2)?.unwrap_or_default(),
        currency: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        status: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        updated_epoch: row.get::<_, Option<i64>>(5)?.unwrap_or_default(),
    })
}
