//! Etsy Open API v3 payloads.
//!
//! Only the fields used for caching and invoicing are typed. A receipt also
//! keeps the JSON object Etsy sent, which is what gets cached.

use std::fmt;

use earsiv_common::money::money_to_f64;
use earsiv_common::Money;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_BUYER_NAME: &str = "Etsy Buyer";

/// Etsy ids arrive as numbers but older exports carry strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EtsyId {
    Number(i64),
    Text(String),
}

impl fmt::Display for EtsyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EtsyId::Number(n) => write!(f, "{n}"),
            EtsyId::Text(s) => f.write_str(s),
        }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Deserialize)]
pub(crate) struct Page<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
}

/// A shop receipt (an order).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Receipt {
    #[serde(default)]
    pub receipt_id: Option<EtsyId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub buyer_email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub first_line: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub country_iso: Option<String>,
    #[serde(default)]
    pub grandtotal: Option<Money>,
    #[serde(default)]
    pub total_price: Option<Money>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub updated_timestamp: Option<i64>,
    #[serde(default)]
    pub last_modified_tsz: Option<i64>,
    #[serde(default)]
    pub created_timestamp: Option<i64>,
    #[serde(default)]
    pub seller_user_id: Option<EtsyId>,

    #[serde(skip)]
    raw: Value,
}

/// An empty money object counts as absent.
fn present(money: &Option<Money>) -> Option<&Money> {
    money.as_ref().filter(|m| {
        !matches!(
            m,
            Money::Object {
                amount: None,
                divisor: None,
                currency_code: None
            }
        )
    })
}

fn first_nonzero(values: &[Option<i64>]) -> Option<i64> {
    values.iter().flatten().copied().find(|v| *v != 0)
}

impl Receipt {
    /// Parse a receipt, keeping `value` as its raw JSON.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        let mut receipt: Receipt = serde_json::from_value(value.clone())?;
        receipt.raw = value;
        Ok(receipt)
    }

    /// The receipt exactly as Etsy sent it.
    pub fn raw_json(&self) -> &Value {
        &self.raw
    }

    /// The receipt id as text, if present.
    pub fn receipt_key(&self) -> Option<String> {
        self.receipt_id
            .as_ref()
            .map(ToString::to_string)
            .filter(|id| !id.is_empty())
    }

    /// Buyer name, or a placeholder when Etsy has none.
    pub fn buyer_name(&self) -> String {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_BUYER_NAME)
            .trim()
            .to_string()
    }

    /// The order total: `grandtotal`, else `total_price`.
    pub fn total_money(&self) -> Option<&Money> {
        present(&self.grandtotal).or_else(|| present(&self.total_price))
    }

    /// Order total in major units.
    pub fn total(&self) -> f64 {
        money_to_f64(self.total_money())
    }

    /// Currency of `grandtotal`, else of `total_price`.
    pub fn currency(&self) -> Option<&str> {
        self.grandtotal
            .as_ref()
            .and_then(Money::currency_code)
            .or_else(|| self.total_price.as_ref().and_then(Money::currency_code))
    }

    /// Upper-cased order status.
    pub fn status_upper(&self) -> String {
        self.status.as_deref().unwrap_or_default().to_uppercase()
    }

    /// Last modification time used for sync bookkeeping.
    pub fn updated_epoch(&self, now: i64) -> i64 {
        first_nonzero(&[
            self.updated_timestamp,
            self.last_modified_tsz,
            self.created_timestamp,
        ])
        .unwrap_or(now)
    }

    /// Time used for the invoice date.
    pub fn invoice_epoch(&self, now: i64) -> i64 {
        first_nonzero(&[self.updated_timestamp, self.created_timestamp]).unwrap_or(now)
    }
}

/// A line of a receipt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub transaction_id: Option<EtsyId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub price: Option<Money>,
    #[serde(default)]
    pub amount_paid: Option<Money>,
}

impl Transaction {
    pub fn quantity(&self) -> f64 {
        self.quantity.unwrap_or(1.0)
    }

    /// Unit price: `price`, else `amount_paid`.
    pub fn unit_money(&self) -> Option<&Money> {
        present(&self.price).or_else(|| present(&self.amount_paid))
    }

    /// Product name, falling back to the transaction id.
    pub fn product_name(&self) -> String {
        match self.title.as_deref().filter(|t| !t.is_empty()) {
            Some(title) => title.to_string(),
            None => format!(
                "Etsy Item #{}",
                self.transaction_id
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "None".to_string())
            ),
        }
    }
}
