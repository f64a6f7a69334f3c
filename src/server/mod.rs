use crate::config::Config;
use crate::invoicing::InvoiceService;
use crate::poller::{spawn_poller, PollerHandle};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use earsiv_db::pool::{get_conn, init_pool, DbPool};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub mod auth;
pub mod error;
pub mod routes_dashboard;
pub mod routes_invoice;
pub mod routes_settings;

pub use error::AppError;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Database, Etsy and Luca access, and the sync lock.
    pub service: Arc<InvoiceService>,
    /// Background poller (rescheduled when settings change).
    pub poller: PollerHandle,
}

impl AppContext {
    pub fn new(config: Config, pool: DbPool, poller: PollerHandle) -> Self {
        let service = Arc::new(InvoiceService::new(pool, &config));
        Self {
            config: Arc::new(config),
            service,
            poller,
        }
    }

    pub fn db(&self) -> &DbPool {
        self.service.pool()
    }
}

/// A 302 redirect, used for links that leave the application.
pub(crate) fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let protected = Router::new()
        .merge(routes_dashboard::dashboard_routes())
        .merge(routes_invoice::invoice_routes())
        .merge(routes_settings::settings_routes())
        .layer(middleware::from_fn_with_state(ctx.clone(), auth::require_auth));

    let mut app = Router::new()
        .route("/healthz", get(health_check))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout))
        .merge(protected);

    if let Some(dir) = ctx.config.server.static_dir.as_ref() {
        if dir.exists() {
            tracing::info!("Serving static files from {:?}", dir);
            app = app.nest_service("/static", ServeDir::new(dir));
        }
    }

    let trust_proxy = ctx.config.server.trust_proxy_headers;
    let trace = TraceLayer::new_for_http().make_span_with(move |request: &Request<Body>| {
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            client = %request_client(request, trust_proxy)
        )
    });

    app.layer(trace).with_state(ctx)
}

/// Client address recorded on the request span.
fn request_client<B>(request: &Request<B>, trust_proxy: bool) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    auth::client_ip(request.headers(), peer, trust_proxy)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// Open the database, start the poller and serve HTTP until shutdown.
pub async fn start_server(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let db_path = config.database.path.to_string_lossy().to_string();
    let pool = init_pool(&db_path)
        .with_context(|| format!("Failed to open database at {db_path}"))?;
    {
        let conn = get_conn(&pool)?;
        let added = crate::settings::seed(&conn, &config.defaults)?;
        if added > 0 {
            tracing::info!(added, "Seeded settings");
        }
    }

    let cancel = CancellationToken::new();
    let service = Arc::new(InvoiceService::new(pool, &config));
    let (poller, poller_task) = spawn_poller(service.clone(), cancel.clone());

    let ctx = AppContext {
        config: Arc::new(config),
        service,
        poller,
    };
    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    cancel.cancel();
    if let Err(e) = poller_task.await {
        tracing::warn!("Poller task ended abnormally: {}", e);
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
