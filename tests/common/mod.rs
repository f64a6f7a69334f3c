//! Shared test harness for integration tests.
//!
//! [`TestHarness`] builds an [`AppContext`] over an in-memory database whose
//! settings point both Etsy and Luca at one wiremock server.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use earsiv::config::Config;
use earsiv::poller::PollerHandle;
use earsiv::server::auth::{SessionData, SESSION_COOKIE_NAME};
use earsiv::server::{create_router, AppContext};
use earsiv_db::models::{Invoice, InvoiceUpdate, NewOrder, Order};
use earsiv_db::pool::{get_conn, init_memory_pool};
use earsiv_db::queries::{invoices, orders, settings as db_settings};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ADMIN_PASSWORD: &str = "letmein";
pub const APP_SECRET: &str = "integration-secret";
pub const SHOP: &str = "shop1";

pub struct TestHarness {
    pub ctx: AppContext,
    pub server: MockServer,
}

impl TestHarness {
    pub async fn new() -> Self {
        let server = MockServer::start().await;

        let mut config = Config::default();
        config.auth.app_secret = APP_SECRET.to_string();
        config.auth.admin_password = ADMIN_PASSWORD.to_string();
        config.etsy.oauth_url = format!("{}/oauth/token", server.uri());
        config.etsy.api_base = format!("{}/v3/application", server.uri());

        let defaults = &mut config.defaults;
        defaults.etsy_client_id = "client-1".to_string();
        defaults.etsy_refresh_token = "refresh-1".to_string();
        defaults.etsy_shop_id = SHOP.to_string();
        defaults.luca_identity = "1234567890".to_string();
        defaults.luca_password = "luca-pass".to_string();
        defaults.luca_company_id = "77".to_string();
        defaults.luca_base = server.uri();
        defaults.default_kdv_rate = 20.0;

        let pool = init_memory_pool().expect("failed to create in-memory pool");
        {
            let conn = get_conn(&pool).unwrap();
            earsiv::settings::seed(&conn, &config.defaults).unwrap();
        }

        let ctx = AppContext::new(config, pool, PollerHandle::detached());
        Self { ctx, server }
    }

    pub fn app(&self) -> Router {
        create_router(self.ctx.clone())
    }

    pub fn set_setting(&self, key: &str, value: &str) {
        let conn = get_conn(self.ctx.db()).unwrap();
        db_settings::set_setting(&conn, key, value).unwrap();
    }

    pub fn setting(&self, key: &str) -> String {
        let conn = get_conn(self.ctx.db()).unwrap();
        db_settings::get_setting(&conn, key, "").unwrap()
    }

    /// Cache an order as a sync would.
    pub fn seed_order(&self, receipt_id: &str, buyer: &str, updated_epoch: i64) {
        let order = NewOrder {
            receipt_id: receipt_id.to_string(),
            buyer_name: buyer.to_string(),
            total: 150.0,
            currency: "TRY".to_string(),
            status: "PAID".to_string(),
            updated_epoch,
            raw_json: receipt_json(receipt_id, buyer, updated_epoch),
        };
        let conn = get_conn(self.ctx.db()).unwrap();
        orders::upsert_order(&conn, &order).unwrap();
    }

    /// Run raw SQL against the database.
    pub fn execute(&self, sql: &str) {
        let conn = get_conn(self.ctx.db()).unwrap();
        conn.execute_batch(sql).unwrap();
    }

    pub fn order(&self, receipt_id: &str) -> Option<Order> {
        let conn = get_conn(self.ctx.db()).unwrap();
        orders::get_order(&conn, receipt_id).unwrap()
    }

    /// `min_last_modified` of every receipts listing Etsy received.
    pub async fn receipts_since(&self) -> Vec<i64> {
        self.server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|req| req.url.path().ends_with("/receipts"))
            .filter_map(|req| {
                req.url
                    .query_pairs()
                    .find(|(k, _)| k == "min_last_modified")
                    .and_then(|(_, v)| v.parse().ok())
            })
            .collect()
    }

    pub fn update_invoice(&self, receipt_id: &str, update: &InvoiceUpdate) {
        let conn = get_conn(self.ctx.db()).unwrap();
        invoices::upsert_invoice(&conn, receipt_id, update).unwrap();
    }

    pub fn invoice(&self, receipt_id: &str) -> Option<Invoice> {
        let conn = get_conn(self.ctx.db()).unwrap();
        invoices::get_invoice(&conn, receipt_id).unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        let request = Request::get(uri)
            .header(header::COOKIE, session_cookie(APP_SECRET))
            .body(Body::empty())
            .unwrap();
        self.app().oneshot(request).await.unwrap()
    }

    pub async fn post_form(&self, uri: &str, form: &str) -> Response<Body> {
        let request = Request::post(uri)
            .header(header::COOKIE, session_cookie(APP_SECRET))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.to_string()))
            .unwrap();
        self.app().oneshot(request).await.unwrap()
    }

    // Upstream mocks

    pub async fn mock_etsy_token(&self) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "etsy-tok"})))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_receipts(&self, receipts: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(format!("/v3/application/shops/{SHOP}/receipts")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": receipts })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_transactions(&self, receipt_id: &str) {
        Mock::given(method("GET"))
            .and(path(format!(
                "/v3/application/shops/{SHOP}/receipts/{receipt_id}/transactions"
            )))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "transaction_id": 9,
                    "title": "Ceramic mug",
                    "quantity": 2,
                    "price": {"amount": 7500, "divisor": 100, "currency_code": "TRY"}
                }]
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_luca_login(&self) {
        Mock::given(method("POST"))
            .and(path("/api/Account/Login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Token": "luca-tok"})))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_save_archive(&self, ettn: &str, number: &str) {
        Mock::given(method("POST"))
            .and(path("/api/Invoice/SaveArchive"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"Ettn": ettn, "InvoiceNumber": number})),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mock_send_archive(&self) {
        Mock::given(method("POST"))
            .and(path("/api/Invoice/SendStagingArchive"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"IsSuccess": true})))
            .mount(&self.server)
            .await;
    }

    pub async fn mock_external_url(&self, url: &str) {
        Mock::given(method("GET"))
            .and(path("/api/Invoice/GetDocumentExternalUrl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Url": url})))
            .mount(&self.server)
            .await;
    }
}

/// An Etsy receipt as returned by the receipts endpoint.
pub fn receipt_json(receipt_id: &str, buyer: &str, updated_epoch: i64) -> Value {
    json!({
        "receipt_id": receipt_id.parse::<i64>().unwrap_or_default(),
        "name": buyer,
        "buyer_email": "buyer@example.com",
        "first_line": "Bağdat Cd. 1",
        "city": "İstanbul",
        "state": "Kadıköy",
        "country_iso": "TR",
        "status": "paid",
        "seller_user_id": 555,
        "grandtotal": {"amount": 15000, "divisor": 100, "currency_code": "TRY"},
        "updated_timestamp": updated_epoch,
        "created_timestamp": updated_epoch - 60
    })
}

/// `Cookie` header value carrying a valid session.
pub fn session_cookie(secret: &str) -> String {
    format!("{}={}", SESSION_COOKIE_NAME, SessionData::new(1).encode(secret))
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}
