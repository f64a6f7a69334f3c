use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_APP_SECRET: &str = "change-me-please";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";
pub const DEFAULT_LUCA_BASE: &str = "https://einvoiceapiturmob.luca.com.tr";
pub const DEFAULT_ETSY_OAUTH_URL: &str = "https://api.etsy.com/v3/public/oauth/token";
pub const DEFAULT_ETSY_API_BASE: &str = "https://openapi.etsy.com/v3/application";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub etsy: EtsyConfig,

    #[serde(default)]
    pub luca: LucaConfig,

    /// Initial values for the runtime settings table.
    #[serde(default)]
    pub defaults: SettingDefaults,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory served under `/static` when it exists.
    #[serde(default = "default_static_dir")]
    pub static_dir: Option<PathBuf>,

    /// Take the client address from `X-Forwarded-For` (behind a reverse proxy).
    #[serde(default = "default_true")]
    pub trust_proxy_headers: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_static_dir() -> Option<PathBuf> {
    Some(PathBuf::from("static"))
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            trust_proxy_headers: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite database file (`DB_PATH`).
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("app.sqlite3")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Key used to sign session cookies (`APP_SECRET`).
    #[serde(default = "default_app_secret")]
    pub app_secret: String,

    /// Plain admin password (`ADMIN_PASSWORD`).
    #[serde(default = "default_admin_password")]
    pub admin_password: String,

    /// Bcrypt hash of the admin password (generate with `earsiv hash-password`).
    /// Takes precedence over `admin_password` when set.
    #[serde(default)]
    pub admin_password_hash: Option<String>,

    /// Session lifetime in hours (default: 14 days)
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: u64,
}

fn default_app_secret() -> String {
    DEFAULT_APP_SECRET.to_string()
}
fn default_admin_password() -> String {
    DEFAULT_ADMIN_PASSWORD.to_string()
}
fn default_session_ttl() -> u64 {
    14 * 24
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            app_secret: default_app_secret(),
            admin_password: default_admin_password(),
            admin_password_hash: None,
            session_ttl_hours: default_session_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EtsyConfig {
    #[serde(default = "default_etsy_oauth_url")]
    pub oauth_url: String,

    #[serde(default = "default_etsy_api_base")]
    pub api_base: String,

    #[serde(default = "default_etsy_timeout")]
    pub timeout_secs: u64,
}

fn default_etsy_oauth_url() -> String {
    DEFAULT_ETSY_OAUTH_URL.to_string()
}
fn default_etsy_api_base() -> String {
    DEFAULT_ETSY_API_BASE.to_string()
}
fn default_etsy_timeout() -> u64 {
    30
}

impl Default for EtsyConfig {
    fn default() -> Self {
        Self {
            oauth_url: default_etsy_oauth_url(),
            api_base: default_etsy_api_base(),
            timeout_secs: default_etsy_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LucaConfig {
    /// Timeout for login and document lookups.
    #[serde(default = "default_luca_timeout")]
    pub timeout_secs: u64,

    /// Timeout for save/send/PDF calls.
    #[serde(default = "default_luca_long_timeout")]
    pub long_timeout_secs: u64,
}

fn default_luca_timeout() -> u64 {
    30
}
fn default_luca_long_timeout() -> u64 {
    45
}

impl Default for LucaConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_luca_timeout(),
            long_timeout_secs: default_luca_long_timeout(),
        }
    }
}

/// Seed values for the settings table. Values already stored in the
/// database win over these.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettingDefaults {
    #[serde(default = "default_poll_minutes")]
    pub poll_minutes: u64,

    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,

    #[serde(default)]
    pub default_kdv_rate: f64,

    #[serde(default = "default_currency")]
    pub currency_fallback: String,

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

    #[serde(default = "default_luca_base")]
    pub luca_base: String,
}

fn default_poll_minutes() -> u64 {
    5
}
fn default_lookback_days() -> i64 {
    60
}
fn default_currency() -> String {
    "TRY".to_string()
}
fn default_luca_base() -> String {
    DEFAULT_LUCA_BASE.to_string()
}

impl Default for SettingDefaults {
    fn default() -> Self {
        Self {
            poll_minutes: default_poll_minutes(),
            lookback_days: default_lookback_days(),
            default_kdv_rate: 0.0,
            currency_fallback: default_currency(),
            etsy_client_id: String::new(),
            etsy_refresh_token: String::new(),
            etsy_shop_id: String::new(),
            luca_identity: String::new(),
            luca_password: String::new(),
            luca_company_id: String::new(),
            luca_base: default_luca_base(),
        }
    }
}
