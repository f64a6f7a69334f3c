//! Earsiv-Common: Shared types and utilities.
//!
//! This crate provides common functionality used across earsiv:
//!
//! - **Error Handling**: Common error type, result alias, and HTTP status mapping
//! - **Money**: Etsy money values and two-decimal rounding
//! - **Statuses**: Invoice lifecycle status
//!
//! # Examples
//!
//! ```
//! use earsiv_common::{money::round2, Error, InvoiceStatus, Result};
//!
//! assert_eq!(round2(10.005_1), 10.01);
//! assert_eq!("sent".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::Sent);
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("order", "42"))
//! }
//! assert!(example().is_err());
//! ```

pub mod error;
pub mod money;
pub mod types;

pub use error::{Error, Result};
pub use money::Money;
pub use types::*;
