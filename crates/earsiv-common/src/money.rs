//! Etsy money values.
//!
//! Etsy reports amounts as `{ "amount": 1999, "divisor": 100, "currency_code": "USD" }`,
//! but older payloads and some transaction fields carry bare numbers. [`Money`]
//! accepts both shapes and serializes back to the shape it was read from.

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Default divisor when Etsy omits it or sends zero.
const DEFAULT_DIVISOR: f64 = 100.0;

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A monetary value as reported by Etsy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Money {
    /// A plain number, already in major units.
    Plain(Number),
    /// An Etsy money object in minor units.
    Object {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<Number>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        divisor: Option<Number>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        currency_code: Option<String>,
    },
}

impl Money {
    /// Convert to a value in major units.
    ///
    /// Plain numbers are returned unchanged; money objects are divided and
    /// rounded to two decimals.
    pub fn to_f64(&self) -> f64 {
        match self {
            Money::Plain(n) => n.as_f64().unwrap_or(0.0),
            Money::Object {
                amount, divisor, ..
            } => {
                let amount = amount.as_ref().and_then(Number::as_f64).unwrap_or(0.0);
                let divisor = divisor
                    .as_ref()
                    .and_then(Number::as_f64)
                    .filter(|d| *d != 0.0)
                    .unwrap_or(DEFAULT_DIVISOR);
                round2(amount / divisor)
            }
        }
    }

    /// Currency code, when the value carries one.
    pub fn currency_code(&self) -> Option<&str> {
        match self {
            Money::Object {
                currency_code: Some(code),
                ..
            } if !code.is_empty() => Some(code),
            _ => None,
        }
    }
}

/// Convert an optional money value, treating a missing value as zero.
pub fn money_to_f64(money: Option<&Money>) -> f64 {
    money.map(Money::to_f64).unwrap_or(0.0)
}
