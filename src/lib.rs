//! Earsiv - Etsy orders to Luca e-Arşiv invoices
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod dashboard;
pub mod etsy;
pub mod invoicing;
pub mod luca;
pub mod poller;
pub mod server;
pub mod settings;
pub mod web;
