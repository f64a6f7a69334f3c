use std::time::Duration;

use earsiv_common::{Error, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{Page, Receipt, TokenResponse, Transaction};
use crate::config::EtsyConfig;
use crate::settings::Settings;

const SERVICE: &str = "Etsy";

/// Receipts requested per page.
pub const PAGE_LIMIT: usize = 100;

/// Pagination stops once the offset passes this value.
pub const MAX_OFFSET: usize = 2000;

/// Client for the Etsy Open API v3.
pub struct EtsyClient {
    client: Client,
    oauth_url: String,
    api_base: String,
}

impl EtsyClient {
    pub fn new(config: &EtsyConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });

        Self {
            client,
            oauth_url: config.oauth_url.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    fn shop_url(&self, settings: &Settings, path: &str) -> String {
        format!(
            "{}/shops/{}{}",
            self.api_base, settings.etsy_shop_id, path
        )
    }

    /// Exchange the stored refresh token for an access token.
    pub async fn refresh_access_token(&self, settings: &Settings) -> Result<String> {
        if settings.etsy_client_id.is_empty() || settings.etsy_refresh_token.is_empty() {
            return Err(Error::validation(
                "Etsy client id and refresh token must be set",
            ));
        }

        let response = self
            .client
            .post(&self.oauth_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", settings.etsy_client_id.as_str()),
                ("refresh_token", settings.etsy_refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::upstream(SERVICE, e))?;

        let token: TokenResponse = json_or_error(response).await?;
        debug!("Refreshed Etsy access token");
        Ok(token.access_token)
    }

    /// Paid receipts modified since `since_epoch`, following pagination.
    pub async fn receipts(
        &self,
        settings: &Settings,
        access_token: &str,
        since_epoch: i64,
    ) -> Result<Vec<Receipt>> {
        let url = self.shop_url(settings, "/receipts");
        let mut out = Vec::new();
        let mut offset = 0usize;

        loop {
            let response = self
                .client
                .get(&url)
                .bearer_auth(access_token)
                .header("x-api-key", &settings.etsy_client_id)
                .query(&[
                    ("limit", PAGE_LIMIT.to_string()),
                    ("min_last_modified", since_epoch.to_string()),
                    ("status", "paid".to_string()),
                    ("offset", offset.to_string()),
                ])
                .send()
                .await
                .map_err(|e| Error::upstream(SERVICE, e))?;

            let page: Page<Value> = json_or_error(response).await?;
            let count = page.results.len();
            for value in page.results {
                let receipt = Receipt::from_value(value)
                    .map_err(|e| Error::upstream(SERVICE, format!("Malformed receipt: {e}")))?;
                out.push(receipt);
            }

            if count < PAGE_LIMIT {
                break;
            }
            offset += PAGE_LIMIT;
            if offset > MAX_OFFSET {
                warn!(offset, "Stopping Etsy receipt pagination");
                break;
            }
        }

        debug!(count = out.len(), since_epoch, "Fetched Etsy receipts");
        Ok(out)
    }

    /// Transactions of one receipt. Any non-200 answer yields no lines, so
    /// the invoice falls back to a single whole-order line.
    pub async fn transactions(
        &self,
        settings: &Settings,
        access_token: &str,
        receipt_id: &str,
    ) -> Result<Vec<Transaction>> {
        let url = self.shop_url(settings, &format!("/receipts/{receipt_id}/transactions"));
        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .header("x-api-key", &settings.etsy_client_id)
            .send()
            .await
            .map_err(|e| Error::upstream(SERVICE, e))?;

        if response.status() != reqwest::StatusCode::OK {
            debug!(receipt_id, status = %response.status(), "No transactions for receipt");
            return Ok(Vec::new());
        }

        let page: Page<Transaction> = response
            .json()
            .await
            .map_err(|e| Error::upstream(SERVICE, e))?;
        Ok(page.results)
    }
}

/// Decode a JSON body, turning non-2xx answers into upstream errors.
async fn json_or_error<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::upstream(SERVICE, format!("HTTP {status}: {body}")));
    }
    response
        .json()
        .await
        .map_err(|e| Error::upstream(SERVICE, format!("invalid response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettingDefaults;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> Settings {
        let map: BTreeMap<String, String> = [
            ("etsy_client_id", "key123"),
            ("etsy_refresh_token", "refresh"),
            ("etsy_shop_id", "42"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Settings::from_map(&map, &SettingDefaults::default())
    }

    fn client(server: &MockServer) -> EtsyClient {
        EtsyClient::new(&EtsyConfig {
            oauth_url: format!("{}/oauth/token", server.uri()),
            api_base: format!("{}/v3/application", server.uri()),
            timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn refresh_token_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("client_id=key123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok"})))
            .mount(&server)
            .await;

        let token = client(&server).refresh_access_token(&settings()).await.unwrap();
        assert_eq!(token, "tok");
    }

    #[tokio::test]
    async fn refresh_token_failure_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let err = client(&server)
            .refresh_access_token(&settings())
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 502);
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn missing_credentials_are_rejected_locally() {
        let server = MockServer::start().await;
        let empty = Settings::from_map(&BTreeMap::new(), &SettingDefaults::default());
        let err = client(&server).refresh_access_token(&empty).await.unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[tokio::test]
    async fn receipts_follow_pages() {
        let server = MockServer::start().await;
        let full: Vec<_> = (0..100).map(|i| json!({"receipt_id": i})).collect();
        Mock::given(method("GET"))
            .and(path("/v3/application/shops/42/receipts"))
            .and(query_param("offset", "0"))
            .and(query_param("status", "paid"))
            .and(query_param("min_last_modified", "1000"))
            .and(header("x-api-key", "key123"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": full})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v3/application/shops/42/receipts"))
            .and(query_param("offset", "100"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"results": [{"receipt_id": 100}]})),
            )
            .mount(&server)
            .await;

        let receipts = client(&server)
            .receipts(&settings(), "tok", 1000)
            .await
            .unwrap();
        assert_eq!(receipts.len(), 101);
        assert_eq!(receipts[100].receipt_key().as_deref(), Some("100"));
    }

    async fn sent_offsets(server: &MockServer) -> Vec<usize> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter_map(|req| {
                req.url
                    .query_pairs()
                    .find(|(k, _)| k == "offset")
                    .and_then(|(_, v)| v.parse().ok())
            })
            .collect()
    }

    #[tokio::test]
    async fn receipts_stop_after_offset_cap() {
        let server = MockServer::start().await;
        let full: Vec<_> = (0..PAGE_LIMIT).map(|i| json!({"receipt_id": i})).collect();
        Mock::given(method("GET"))
            .and(path("/v3/application/shops/42/receipts"))
            .and(query_param("limit", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": full})))
            .mount(&server)
            .await;

        let receipts = client(&server)
            .receipts(&settings(), "tok", 1000)
            .await
            .unwrap();

        let offsets = sent_offsets(&server).await;
        let expected: Vec<usize> = (0..=MAX_OFFSET).step_by(PAGE_LIMIT).collect();
        assert_eq!(offsets.len(), 21);
        assert_eq!(offsets, expected);
        assert_eq!(receipts.len(), 21 * PAGE_LIMIT);
    }

    #[tokio::test]
    async fn short_first_page_is_a_single_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/application/shops/42/receipts"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"results": [{"receipt_id": 1}, {"receipt_id": 2}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipts = client(&server)
            .receipts(&settings(), "tok", 1000)
            .await
            .unwrap();
        assert_eq!(receipts.len(), 2);
        assert_eq!(sent_offsets(&server).await, vec![0]);
    }

    #[tokio::test]
    async fn receipts_keep_null_fields_in_raw_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/application/shops/42/receipts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"receipt_id": 7, "buyer_email": null, "gift_message": ""}]
            })))
            .mount(&server)
            .await;

        let receipts = client(&server)
            .receipts(&settings(), "tok", 1000)
            .await
            .unwrap();
        assert_eq!(
            receipts[0].raw_json(),
            &json!({"receipt_id": 7, "buyer_email": null, "gift_message": ""})
        );
    }

    #[tokio::test]
    async fn transactions_non_200_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/application/shops/42/receipts/7/transactions"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let txs = client(&server)
            .transactions(&settings(), "tok", "7")
            .await
            .unwrap();
        assert!(txs.is_empty());
    }
}
