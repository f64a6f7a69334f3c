//! Admin login, signed session cookies, and the auth middleware.

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::AuthConfig;
use crate::server::AppContext;
use crate::web::{pages, quote_path};

pub const SESSION_COOKIE_NAME: &str = "earsiv_session";

type HmacSha256 = Hmac<Sha256>;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Session data stored in the cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub auth: bool,
    pub expires_at: u64,
}

impl SessionData {
    pub fn new(ttl_hours: u64) -> Self {
        Self {
            auth: true,
            expires_at: unix_now() + ttl_hours * 3600,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.auth && unix_now() < self.expires_at
    }

    /// `base64(json).hex(hmac)`.
    pub fn encode(&self, secret: &str) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        format!("{payload}.{}", sign(secret, payload.as_bytes()))
    }

    /// Decode a cookie value, rejecting bad signatures.
    pub fn decode(secret: &str, value: &str) -> Option<Self> {
        let (payload, signature) = value.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }
}

fn sign(secret: &str, data: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Check a submitted password against the configured hash or plain password.
pub fn verify_password(auth: &AuthConfig, candidate: &str) -> bool {
    match auth.admin_password_hash.as_deref().filter(|h| !h.is_empty()) {
        Some(hash) => bcrypt::verify(candidate, hash).unwrap_or(false),
        None => {
            // Compare HMACs rather than the raw strings.
            let expected = sign(&auth.app_secret, auth.admin_password.as_bytes());
            sign(&auth.app_secret, candidate.as_bytes()) == expected
        }
    }
}

/// Generate a bcrypt password hash
pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

/// Generate a random session signing secret
pub fn generate_secret() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

/// Only local paths are accepted as post-login targets.
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.contains('\\') => n,
        _ => "/",
    }
}

/// Client address for logs, from `X-Forwarded-For` when proxy headers are
/// trusted.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.map(|p| p.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn session_cookie(value: String, ttl_hours: u64) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(ttl_hours as i64))
        .build()
}

/// Whether the request carries a valid session.
pub fn is_authenticated(jar: &CookieJar, secret: &str) -> bool {
    jar.get(SESSION_COOKIE_NAME)
        .and_then(|c| SessionData::decode(secret, c.value()))
        .map(|s| s.is_valid())
        .unwrap_or(false)
}

/// Redirect unauthenticated requests to the login page, remembering where
/// they were going.
pub async fn require_auth(
    State(ctx): State<AppContext>,
    jar: CookieJar,
    request: Request<Body>,
    next: Next,
) -> Response {
    if is_authenticated(&jar, &ctx.config.auth.app_secret) {
        return next.run(request).await;
    }

    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    Redirect::to(&format!("/login?next={}", quote_path(&target))).into_response()
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

pub async fn login_page(Query(query): Query<LoginQuery>) -> Html<String> {
    Html(pages::login_page(None, query.next.as_deref()))
}

pub async fn login(
    State(ctx): State<AppContext>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let auth = &ctx.config.auth;
    let ip = client_ip(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        ctx.config.server.trust_proxy_headers,
    );

    if !verify_password(auth, &form.password) {
        tracing::warn!(client = %ip, "Failed login attempt");
        return Html(pages::login_page(Some("Wrong password"), form.next.as_deref()))
            .into_response();
    }

    tracing::info!(client = %ip, "Admin logged in");
    let session = SessionData::new(auth.session_ttl_hours);
    let cookie = session_cookie(session.encode(&auth.app_secret), auth.session_ttl_hours);
    let target = safe_next(form.next.as_deref()).to_string();
    (jar.add(cookie), Redirect::to(&target)).into_response()
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Redirect) {
    let cookie = Cookie::build((SESSION_COOKIE_NAME, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();

    (jar.remove(cookie), Redirect::to("/login"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn session_round_trip() {
        let session = SessionData::new(1);
        let value = session.encode(SECRET);
        let decoded = SessionData::decode(SECRET, &value).unwrap();
        assert_eq!(decoded, session);
        assert!(decoded.is_valid());
    }

    #[test]
    fn tampered_or_foreign_sessions_are_rejected() {
        let value = SessionData::new(1).encode(SECRET);
        assert!(SessionData::decode("other-secret", &value).is_none());

        let forged = SessionData {
            auth: true,
            expires_at: u64::MAX,
        };
        let (_, sig) = value.rsplit_once('.').unwrap();
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_string(&forged).unwrap());
        assert!(SessionData::decode(SECRET, &format!("{payload}.{sig}")).is_none());
        assert!(SessionData::decode(SECRET, "garbage").is_none());
    }

    #[test]
    fn expired_session_is_invalid() {
        let session = SessionData {
            auth: true,
            expires_at: 1,
        };
        let decoded = SessionData::decode(SECRET, &session.encode(SECRET)).unwrap();
        assert!(!decoded.is_valid());
    }

    #[test]
    fn plain_and_hashed_passwords() {
        let mut auth = AuthConfig {
            admin_password: "hunter2".to_string(),
            ..AuthConfig::default()
        };
        assert!(verify_password(&auth, "hunter2"));
        assert!(!verify_password(&auth, "hunter3"));

        auth.admin_password_hash = Some(bcrypt::hash("s3cret", 4).unwrap());
        assert!(verify_password(&auth, "s3cret"));
        assert!(!verify_password(&auth, "hunter2"));
    }

    #[test]
    fn next_must_be_local() {
        assert_eq!(safe_next(Some("/settings?msg=x")), "/settings?msg=x");
        assert_eq!(safe_next(Some("//evil.example")), "/");
        assert_eq!(safe_next(Some("https://evil.example")), "/");
        assert_eq!(safe_next(Some("/\\evil")), "/");
        assert_eq!(safe_next(None), "/");
    }

    #[test]
    fn forwarded_client_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "10.0.0.1:5555".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer), true), "203.0.113.7");
        assert_eq!(client_ip(&headers, Some(peer), false), "10.0.0.1");
        assert_eq!(client_ip(&HeaderMap::new(), None, true), "unknown");
    }

    #[test]
    fn generated_secrets_are_random_hex() {
        let a = generate_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, generate_secret());
    }
}
