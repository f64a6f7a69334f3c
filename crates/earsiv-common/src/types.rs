//! Core enums shared across earsiv crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of an e-Archive invoice for one Etsy receipt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    /// No invoice has been created.
    #[default]
    None,
    /// Saved as a draft archive invoice in Luca.
    Created,
    /// Sent from the staging area; the invoice is issued.
    Sent,
    /// The last attempt failed.
    Error,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 4] = [
        InvoiceStatus::None,
        InvoiceStatus::Created,
        InvoiceStatus::Sent,
        InvoiceStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::None => "NONE",
            InvoiceStatus::Created => "CREATED",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" | "" => Ok(InvoiceStatus::None),
            "CREATED" => Ok(InvoiceStatus::Created),
            "SENT" => Ok(InvoiceStatus::Sent),
            "ERROR" => Ok(InvoiceStatus::Error),
            other => Err(format!("unknown invoice status: {other}")),
        }
    }
}
