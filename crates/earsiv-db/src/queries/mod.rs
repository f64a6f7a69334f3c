//! Query modules, one per table.

pub mod invoices;
pub mod orders;
pub mod settings;
