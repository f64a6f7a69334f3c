use std::time::Duration;

use earsiv_common::{Error, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::payload::ArchiveInvoice;
use crate::config::LucaConfig;
use crate::settings::Settings;

const SERVICE: &str = "Luca";

/// PDF endpoints, tried in order.
const PDF_PATHS: [&str; 2] = ["/api/Invoice/GetDocumentPdf", "/api/Invoice/GetInvoicePdf"];

/// Identifiers Luca returns for a saved archive invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedInvoice {
    pub ettn: String,
    pub invoice_number: String,
}

impl SavedInvoice {
    fn from_value(value: &Value) -> Self {
        let field = |names: &[&str]| {
            names
                .iter()
                .filter_map(|n| value.get(*n))
                .find_map(|v| match v {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .unwrap_or_default()
        };
        Self {
            ettn: field(&["Ettn", "ETTN"]),
            invoice_number: field(&["InvoiceNumber"]),
        }
    }
}

/// Client for the Luca e-Archive API. The base URL and credentials come from
/// the runtime settings, so each call takes them.
pub struct LucaClient {
    client: Client,
    timeout: Duration,
    long_timeout: Duration,
}

impl LucaClient {
    pub fn new(config: &LucaConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let long_timeout = Duration::from_secs(config.long_timeout_secs);
        let client = Client::builder()
            .timeout(long_timeout.max(timeout))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });

        Self {
            client,
            timeout,
            long_timeout,
        }
    }

    fn url(settings: &Settings, path: &str) -> String {
        format!("{}{}", settings.luca_base_url(), path)
    }

    async fn send(request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::upstream(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::upstream(SERVICE, format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        settings: &Settings,
        token: &str,
        path: &str,
        body: &T,
    ) -> Result<Value> {
        let response = Self::send(
            self.client
                .post(Self::url(settings, path))
                .bearer_auth(token)
                .timeout(self.long_timeout)
                .json(body),
        )
        .await?;
        response
            .json()
            .await
            .map_err(|e| Error::upstream(SERVICE, format!("invalid response: {e}")))
    }

    /// Log in and return the bearer token.
    pub async fn login(&self, settings: &Settings) -> Result<String> {
        if settings.luca_identity.is_empty() {
            return Err(Error::validation("Luca identification number must be set"));
        }

        let response = Self::send(
            self.client
                .post(Self::url(settings, "/api/Account/Login"))
                .timeout(self.timeout)
                .json(&json!({
                    "IdentificationNumber": settings.luca_identity,
                    "Password": settings.luca_password,
                })),
        )
        .await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::upstream(SERVICE, format!("invalid login response: {e}")))?;
        match body.get("Token").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => {
                debug!("Logged in to Luca");
                Ok(token.to_string())
            }
            _ => Err(Error::upstream(SERVICE, "login response has no Token")),
        }
    }

    /// Save an archive invoice as a draft.
    pub async fn save_archive(
        &self,
        settings: &Settings,
        token: &str,
        payload: &ArchiveInvoice,
    ) -> Result<SavedInvoice> {
        let body = self
            .post_json(settings, token, "/api/Invoice/SaveArchive", payload)
            .await?;
        let saved = SavedInvoice::from_value(&body);
        debug!(ettn = %saved.ettn, number = %saved.invoice_number, "Saved archive invoice");
        Ok(saved)
    }

    /// Issue a saved archive invoice.
    pub async fn send_archive(&self, settings: &Settings, token: &str, ettn: &str) -> Result<Value> {
        let company_id = settings.luca_company_id_number()?;
        self.post_json(
            settings,
            token,
            "/api/Invoice/SendStagingArchive",
            &json!({ "CompanyId": company_id, "ETTN": ettn }),
        )
        .await
    }

    /// Public view URL of an issued invoice.
    pub async fn external_url(&self, settings: &Settings, token: &str, ettn: &str) -> Result<String> {
        let response = Self::send(
            self.client
                .get(Self::url(settings, "/api/Invoice/GetDocumentExternalUrl"))
                .bearer_auth(token)
                .timeout(self.timeout)
                .query(&[
                    ("companyId", settings.luca_company_id.as_str()),
                    ("ettn", ettn),
                ]),
        )
        .await?;

        let text = response
            .text()
            .await
            .map_err(|e| Error::upstream(SERVICE, e))?;
        Ok(url_from_body(&text))
    }

    /// Invoice PDF, or `None` when no endpoint returns one.
    pub async fn pdf(&self, settings: &Settings, token: &str, ettn: &str) -> Option<Vec<u8>> {
        for path in PDF_PATHS {
            let result = self
                .client
                .get(Self::url(settings, path))
                .bearer_auth(token)
                .timeout(self.long_timeout)
                .query(&[
                    ("companyId", settings.luca_company_id.as_str()),
                    ("ettn", ettn),
                ])
                .send()
                .await;

            let response = match result {
                Ok(r) => r,
                Err(e) => {
                    debug!(path, error = %e, "PDF request failed");
                    continue;
                }
            };

            let is_pdf = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_ascii_lowercase().starts_with("application/pdf"))
                .unwrap_or(false);

            if response.status() == reqwest::StatusCode::OK && is_pdf {
                match response.bytes().await {
                    Ok(bytes) => return Some(bytes.to_vec()),
                    Err(e) => debug!(path, error = %e, "PDF body could not be read"),
                }
            }
        }
        None
    }
}

/// `Url` or `url` from a JSON object, else the JSON itself, else the raw text.
fn url_from_body(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => {
            let url = ["Url", "url"]
                .iter()
                .filter_map(|k| value.get(*k).and_then(Value::as_str))
                .find(|s| !s.is_empty())
                .map(str::to_string);
            match (url, value) {
                (Some(url), _) => url,
                (None, Value::String(s)) => s,
                (None, other) => other.to_string(),
            }
        }
        Err(_) => text.to_string(),
    }
}
