//! Earsiv-DB: Database schema, migrations, and query operations
//!
//! This crate provides database functionality for earsiv using SQLite
//! with rusqlite and r2d2 connection pooling.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `models` - Rust models matching database schema
//! - `queries` - Database query operations
//!
//! # Example
//!
//! ```no_run
//! use earsiv_db::pool::{init_pool, get_conn};
//! use earsiv_db::queries::settings;
//!
//! let pool = init_pool("/data/app.sqlite3").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! settings::set_setting(&conn, "poll_minutes", "10").unwrap();
//! println!("{}", settings::get_setting(&conn, "poll_minutes", "5").unwrap());
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

/// Local wall-clock timestamp with second precision, as stored in
/// `created_at` / `updated_at` columns.
///
/// The zone comes from the process environment (`TZ`).
pub fn now_local_iso() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}
