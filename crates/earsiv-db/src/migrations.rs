//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.
//!
//! V1 uses `IF NOT EXISTS` so that databases created before migrations were
//! tracked are adopted without touching their data.

use earsiv_common::{Error, Result};
use rusqlite::Connection;

/// V1: settings, cached Etsy orders, and invoice state.
const V1_INITIAL: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY,
    value TEXT
);

CREATE TABLE IF NOT EXISTS orders (
    receipt_id    TEXT PRIMARY KEY,
    buyer_name    TEXT,
    total         REAL,
    currency      TEXT,
    status        TEXT,
    updated_epoch INTEGER,
    raw_json      TEXT,
    created_at    TEXT,
    updated_at    TEXT
);

-- status: NONE | CREATED | SENT | ERROR
CREATE TABLE IF NOT EXISTS invoices (
    receipt_id     TEXT PRIMARY KEY,
    ettn           TEXT,
    invoice_number TEXT,
    url            TEXT,
    status         TEXT,
    error          TEXT,
    created_at     TEXT,
    updated_at     TEXT
);

INSERT OR IGNORE INTO settings (key, value) VALUES ('last_sync_epoch', '0');
"#;

/// V2: index backing the dashboard's lookback window.
const V2_ORDERS_UPDATED_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_orders_updated_epoch ON orders(updated_epoch);
"#;

/// Ordered list of (version, sql) pairs.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL), (2, V2_ORDERS_UPDATED_INDEX)];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;
    }

    Ok(())
}
