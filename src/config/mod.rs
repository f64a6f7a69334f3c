mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./earsiv.toml",
        "~/.config/earsiv/config.toml",
        "/etc/earsiv/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Load the effective configuration: file (or defaults), then environment
/// overrides, then validation.
pub fn load(custom_path: Option<&Path>) -> Result<Config> {
    let mut config = load_config_or_default(custom_path)?;
    apply_env(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Override config values from environment variables.
///
/// `lookup` returns the value of a variable; empty values count as unset
/// except for credentials, which may legitimately be cleared.
pub fn apply_env<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("HOST") {
        config.server.host = v;
    }
    if let Some(v) = get("PORT") {
        config.server.port = parse_env("PORT", &v)?;
    }
    if let Some(v) = get("STATIC_DIR") {
        config.server.static_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = get("TRUST_PROXY_HEADERS") {
        config.server.trust_proxy_headers = parse_bool(&v);
    }

    if let Some(v) = get("DB_PATH") {
        config.database.path = PathBuf::from(shellexpand::tilde(&v).as_ref());
    }

    if let Some(v) = get("APP_SECRET") {
        config.auth.app_secret = v;
    }
    if let Some(v) = get("ADMIN_PASSWORD") {
        config.auth.admin_password = v;
    }
    if let Some(v) = get("ADMIN_PASSWORD_HASH") {
        config.auth.admin_password_hash = Some(v);
    }
    if let Some(v) = get("SESSION_TTL_HOURS") {
        config.auth.session_ttl_hours = parse_env("SESSION_TTL_HOURS", &v)?;
    }

    if let Some(v) = get("ETSY_OAUTH_URL") {
        config.etsy.oauth_url = v;
    }
    if let Some(v) = get("ETSY_API_BASE") {
        config.etsy.api_base = v;
    }

    let defaults = &mut config.defaults;
    if let Some(v) = get("POLL_INTERVAL_MINUTES") {
        defaults.poll_minutes = parse_env("POLL_INTERVAL_MINUTES", &v)?;
    }
    if let Some(v) = get("ORDERS_LOOKBACK_DAYS") {
        defaults.lookback_days = parse_env("ORDERS_LOOKBACK_DAYS", &v)?;
    }
    if let Some(v) = get("DEFAULT_KDV_RATE") {
        defaults.default_kdv_rate = parse_env("DEFAULT_KDV_RATE", &v)?;
    }
    if let Some(v) = get("CURRENCY_FALLBACK") {
        defaults.currency_fallback = v;
    }
    if let Some(v) = get("LUCA_BASE") {
        defaults.luca_base = v;
    }

    let credentials: [(&str, &mut String); 6] = [
        ("ETSY_CLIENT_ID", &mut defaults.etsy_client_id),
        ("ETSY_REFRESH_TOKEN", &mut defaults.etsy_refresh_token),
        ("ETSY_SHOP_ID", &mut defaults.etsy_shop_id),
        ("LUCA_IDENTITY", &mut defaults.luca_identity),
        ("LUCA_PASSWORD", &mut defaults.luca_password),
        ("LUCA_COMPANY_ID", &mut defaults.luca_company_id),
    ];
    for (key, slot) in credentials {
        if let Some(v) = lookup(key) {
            *slot = v.trim().to_string();
        }
    }

    Ok(())
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {key}: {value:?}"))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.auth.app_secret.is_empty() {
        anyhow::bail!("APP_SECRET cannot be empty");
    }

    if config.auth.session_ttl_hours == 0 {
        anyhow::bail!("Session lifetime must be at least one hour");
    }

    if config.auth.app_secret == DEFAULT_APP_SECRET {
        tracing::warn!("APP_SECRET is not set; sessions are signed with the default secret");
    }

    if config.auth.admin_password_hash.is_none()
        && config.auth.admin_password == DEFAULT_ADMIN_PASSWORD
    {
        tracing::warn!("ADMIN_PASSWORD is not set; the default password is in use");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_container_layout() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert!(config.server.trust_proxy_headers);
        assert_eq!(config.database.path, PathBuf::from("app.sqlite3"));
        assert_eq!(config.defaults.poll_minutes, 5);
        assert_eq!(config.defaults.lookback_days, 60);
        assert_eq!(config.defaults.currency_fallback, "TRY");
        assert_eq!(config.defaults.luca_base, DEFAULT_LUCA_BASE);
        assert_eq!(config.auth.session_ttl_hours, 336);
    }

    #[test]
    fn env_overrides() {
        let mut config = Config::default();
        apply_env(
            &mut config,
            env(&[
                ("DB_PATH", "/data/app.sqlite3"),
                ("APP_SECRET", "s3cret"),
                ("ADMIN_PASSWORD", "hunter2"),
                ("POLL_INTERVAL_MINUTES", "10"),
                ("ORDERS_LOOKBACK_DAYS", "30"),
                ("DEFAULT_KDV_RATE", "20"),
                ("CURRENCY_FALLBACK", "EUR"),
                ("ETSY_SHOP_ID", " 12345 "),
                ("LUCA_COMPANY_ID", "777"),
                ("PORT", "9000"),
            ]),
        )
        .unwrap();

        assert_eq!(config.database.path, PathBuf::from("/data/app.sqlite3"));
        assert_eq!(config.auth.app_secret, "s3cret");
        assert_eq!(config.auth.admin_password, "hunter2");
        assert_eq!(config.defaults.poll_minutes, 10);
        assert_eq!(config.defaults.lookback_days, 30);
        assert_eq!(config.defaults.default_kdv_rate, 20.0);
        assert_eq!(config.defaults.currency_fallback, "EUR");
        assert_eq!(config.defaults.etsy_shop_id, "12345");
        assert_eq!(config.defaults.luca_company_id, "777");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = Config::default();
        apply_env(&mut config, env(&[("APP_SECRET", ""), ("PORT", " ")])).unwrap();
        assert_eq!(config.auth.app_secret, DEFAULT_APP_SECRET);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn invalid_number_is_an_error() {
        let mut config = Config::default();
        let err = apply_env(&mut config, env(&[("POLL_INTERVAL_MINUTES", "often")])).unwrap_err();
        assert!(err.to_string().contains("POLL_INTERVAL_MINUTES"));
    }

    #[test]
    fn proxy_header_flag() {
        let mut config = Config::default();
        apply_env(&mut config, env(&[("TRUST_PROXY_HEADERS", "false")])).unwrap();
        assert!(!config.server.trust_proxy_headers);
    }

    #[test]
    fn toml_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("earsiv.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 8081

[database]
path = "/tmp/earsiv.sqlite3"

[defaults]
poll_minutes = 2
auto_invoice_ignored = true
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.path, PathBuf::from("/tmp/earsiv.sqlite3"));
        assert_eq!(config.defaults.poll_minutes, 2);
        assert_eq!(config.defaults.lookback_days, 60);
    }

    #[test]
    fn validation() {
        let mut config = Config::default();
        assert!(validate_config(&config).is_ok());

        config.server.port = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.auth.app_secret.clear();
        assert!(validate_config(&config).is_err());
    }
}
