//! Runtime settings stored in the database.
//!
//! The settings table is seeded from [`SettingDefaults`] on startup and then
//! edited through the settings page. [`Settings`] is the typed view used by
//! the sync and invoicing code; unparsable values fall back to the defaults.

use std::collections::BTreeMap;

use earsiv_common::{Error, Result};
use earsiv_db::queries::settings as db_settings;
use rusqlite::Connection;
use serde::Deserialize;

use crate::config::{SettingDefaults, DEFAULT_LUCA_BASE};

pub const POLL_MINUTES: &str = "poll_minutes";
pub const LOOKBACK_DAYS: &str = "lookback_days";
pub const DEFAULT_KDV_RATE: &str = "default_kdv_rate";
pub const CURRENCY_FALLBACK: &str = "currency_fallback";
pub const AUTO_INVOICE: &str = "auto_invoice";
pub const ETSY_CLIENT_ID: &str = "etsy_client_id";
pub const ETSY_REFRESH_TOKEN: &str = "etsy_refresh_token";
pub const ETSY_SHOP_ID: &str = "etsy_shop_id";
pub const LUCA_IDENTITY: &str = "luca_identity";
pub const LUCA_PASSWORD: &str = "luca_password";
pub const LUCA_COMPANY_ID: &str = "luca_company_id";
pub const LUCA_BASE: &str = "luca_base";
pub use earsiv_db::queries::settings::LAST_SYNC_EPOCH;

/// Keys whose values are credentials and must not be printed.
pub const SECRET_KEYS: &[&str] = &[ETSY_REFRESH_TOKEN, LUCA_PASSWORD];

/// Pairs used to seed the settings table.
pub fn seed_pairs(defaults: &SettingDefaults) -> Vec<(&'static str, String)> {
    vec![
        (POLL_MINUTES, defaults.poll_minutes.to_string()),
        (LOOKBACK_DAYS, defaults.lookback_days.to_string()),
        (DEFAULT_KDV_RATE, defaults.default_kdv_rate.to_string()),
        (CURRENCY_FALLBACK, defaults.currency_fallback.clone()),
        (AUTO_INVOICE, "false".to_string()),
        (ETSY_CLIENT_ID, defaults.etsy_client_id.clone()),
        (ETSY_REFRESH_TOKEN, defaults.etsy_refresh_token.clone()),
        (ETSY_SHOP_ID, defaults.etsy_shop_id.clone()),
        (LUCA_IDENTITY, defaults.luca_identity.clone()),
        (LUCA_PASSWORD, defaults.luca_password.clone()),
        (LUCA_COMPANY_ID, defaults.luca_company_id.clone()),
        (LUCA_BASE, defaults.luca_base.clone()),
    ]
}

/// Seed missing settings; returns how many keys were added.
pub fn seed(conn: &Connection, defaults: &SettingDefaults) -> Result<usize> {
    db_settings::seed_settings(conn, seed_pairs(defaults))
}

/// Typed snapshot of the settings table.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub poll_minutes: u64,
    pub lookback_days: i64,
    pub default_kdv_rate: f64,
    pub currency_fallback: String,
    pub auto_invoice: bool,
    pub etsy_client_id: String,
    pub etsy_refresh_token: String,
    pub etsy_shop_id: String,
    pub luca_identity: String,
    pub luca_password: String,
    pub luca_company_id: String,
    pub luca_base: String,
    pub last_sync_epoch: i64,
}

impl Settings {
    /// Read all settings from the database.
    pub fn load(conn: &Connection, defaults: &SettingDefaults) -> Result<Self> {
        let map = db_settings::all_settings(conn)?;
        Ok(Self::from_map(&map, defaults))
    }

    /// Build from raw key/value pairs.
    pub fn from_map(map: &BTreeMap<String, String>, defaults: &SettingDefaults) -> Self {
        let text = |key: &str| map.get(key).map(|v| v.trim().to_string()).unwrap_or_default();
        let parsed = |key: &str| map.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let currency_fallback = match text(CURRENCY_FALLBACK) {
            c if c.is_empty() => defaults.currency_fallback.clone(),
            c => c,
        };
        let luca_base = match text(LUCA_BASE) {
            b if b.is_empty() => DEFAULT_LUCA_BASE.to_string(),
            b => b,
        };

        Self {
            poll_minutes: parsed(POLL_MINUTES)
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.poll_minutes)
                .max(1),
            lookback_days: parsed(LOOKBACK_DAYS)
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.lookback_days),
            default_kdv_rate: parsed(DEFAULT_KDV_RATE)
                .and_then(|v| v.replace(',', ".").parse().ok())
                .unwrap_or(defaults.default_kdv_rate),
            currency_fallback,
            auto_invoice: text(AUTO_INVOICE).eq_ignore_ascii_case("true"),
            etsy_client_id: text(ETSY_CLIENT_ID),
            etsy_refresh_token: text(ETSY_REFRESH_TOKEN),
            etsy_shop_id: text(ETSY_SHOP_ID),
            luca_identity: text(LUCA_IDENTITY),
            luca_password: map.get(LUCA_PASSWORD).cloned().unwrap_or_default(),
            luca_company_id: text(LUCA_COMPANY_ID),
            luca_base,
            last_sync_epoch: parsed(LAST_SYNC_EPOCH)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }

    /// Luca expects the company id as a JSON number.
    pub fn luca_company_id_number(&self) -> Result<f64> {
        self.luca_company_id.parse::<f64>().map_err(|_| {
            Error::validation(format!(
                "Luca company id is missing or not numeric: {:?}",
                self.luca_company_id
            ))
        })
    }

    /// Base URL of the Luca API without a trailing slash.
    pub fn luca_base_url(&self) -> &str {
        self.luca_base.trim_end_matches('/')
    }
}

/// Mask credentials for display.
pub fn masked(map: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    map.iter()
        .map(|(k, v)| {
            let value = if SECRET_KEYS.contains(&k.as_str()) && !v.is_empty() {
                "********".to_string()
            } else {
                v.clone()
            };
            (k.clone(), value)
        })
        .collect()
}

fn default_luca_base_form() -> String {
    DEFAULT_LUCA_BASE.to_string()
}
fn default_poll_form() -> String {
    "5".to_string()
}
fn default_lookback_form() -> String {
    "60".to_string()
}
fn default_kdv_form() -> String {
    "0".to_string()
}
fn default_currency_form() -> String {
    "TRY".to_string()
}
fn default_auto_invoice_form() -> String {
    "off".to_string()
}

/// Settings page submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    pub etsy_client_id: String,
    #[serde(default)]
    pub etsy_refresh_token: String,
    #[serde(default)]
    pub etsy_shop_id: String,
    #[serde(default)]
    pub luca_identity: String,
    #[serde(default)]
    pub luca_password: String,
    #[serde(default)]
    pub luca_company_id: String,
    #[serde(default = "default_luca_base_form")]
    pub luca_base: String,
    #[serde(default = "default_poll_form")]
    pub poll_minutes: String,
    #[serde(default = "default_lookback_form")]
    pub lookback_days: String,
    #[serde(default = "default_kdv_form")]
    pub default_kdv_rate: String,
    #[serde(default = "default_currency_form")]
    pub currency_fallback: String,
    #[serde(default = "default_auto_invoice_form")]
    pub auto_invoice: String,
}

impl SettingsForm {
    /// Key/value pairs to store. Text is trimmed; the checkbox becomes
    /// `"true"` or `"false"`.
    pub fn into_pairs(self) -> Vec<(&'static str, String)> {
        let auto = matches!(self.auto_invoice.trim(), "on" | "true");
        vec![
            (ETSY_CLIENT_ID, self.etsy_client_id.trim().to_string()),
            (ETSY_REFRESH_TOKEN, self.etsy_refresh_token.trim().to_string()),
            (ETSY_SHOP_ID, self.etsy_shop_id.trim().to_string()),
            (LUCA_IDENTITY, self.luca_identity.trim().to_string()),
            (LUCA_PASSWORD, self.luca_password.trim().to_string()),
            (LUCA_COMPANY_ID, self.luca_company_id.trim().to_string()),
            (LUCA_BASE, self.luca_base.trim().to_string()),
            (POLL_MINUTES, self.poll_minutes.trim().to_string()),
            (LOOKBACK_DAYS, self.lookback_days.trim().to_string()),
            (DEFAULT_KDV_RATE, self.default_kdv_rate.trim().to_string()),
            (CURRENCY_FALLBACK, self.currency_fallback.trim().to_string()),
            (AUTO_INVOICE, if auto { "true" } else { "false" }.to_string()),
        ]
    }

    /// Store every field.
    pub fn save(self, conn: &Connection) -> Result<()> {
        for (key, value) in self.into_pairs() {
            db_settings::set_setting(conn, key, &value)?;
        }
        Ok(())
    }
}
