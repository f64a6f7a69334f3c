//! Settings key/value queries.
//!
//! Settings are plain strings; typed interpretation lives in the application.

use std::collections::BTreeMap;

use earsiv_common::{Error, Result};
use rusqlite::Connection;

/// Key holding the epoch of the last successful Etsy sync.
pub const LAST_SYNC_EPOCH: &str = "last_sync_epoch";

/// Read a setting, returning `default` when the key is absent or NULL.
pub fn get_setting(conn: &Connection, key: &str, default: &str) -> Result<String> {
    let result = conn.query_row(
        "SELECT value FROM settings WHERE key = :key",
        rusqlite::named_params! { ":key": key },
        |row| row.get::<_, Option<String>>(0),
    );

    match result {
        Ok(Some(value)) => Ok(value),
        Ok(None) | Err(rusqlite::Error::QueryReturnedNoRows) => Ok(default.to_string()),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Insert or replace a setting.
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (:key, :value)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::named_params! { ":key": key, ":value": value },
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}

/// Insert settings that do not exist yet; existing values are kept.
///
/// Returns the number of keys that were inserted.
pub fn seed_settings<'a, I>(conn: &Connection, pairs: I) -> Result<usize>
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    let mut inserted = 0;
    {
        let mut stmt = tx
            .prepare("INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)")
            .map_err(|e| Error::database(e.to_string()))?;
        for (key, value) in pairs {
            inserted += stmt
                .execute(rusqlite::params![key, value])
                .map_err(|e| Error::database(e.to_string()))?;
        }
    }

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(inserted)
}

/// All settings as a sorted map. NULL values read as empty strings.
pub fn all_settings(conn: &Connection) -> Result<BTreeMap<String, String>> {
    let mut stmt = conn
        .prepare("SELECT key, value FROM settings")
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            ))
        })
        .map_err(|e| Error::database(e.to_string()))?;

    let map = rows
        .collect::<rusqlite::Result<BTreeMap<_, _>>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(map)
}
