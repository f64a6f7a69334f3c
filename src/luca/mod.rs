//! Luca e-Archive (e-Arşiv) API integration and invoice payload mapping.

mod client;
pub mod payload;

pub use client::{LucaClient, SavedInvoice};
pub use payload::{build_archive_payload, ArchiveInvoice};
