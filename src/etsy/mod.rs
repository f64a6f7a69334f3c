//! Etsy Open API v3 integration: OAuth refresh, paid receipts, transactions.

mod client;
mod types;

pub use client::EtsyClient;
pub use types::{EtsyId, Receipt, Transaction};
