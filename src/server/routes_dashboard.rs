//! Order dashboard and manual sync.

use crate::dashboard::{self, DashboardQuery};
use crate::server::{AppContext, AppError};
use crate::web::{pages, urlencoded};
use axum::{
    extract::{Query, RawQuery, State},
    response::{Html, Redirect},
    routing::{get, post},
    Router,
};
use earsiv_db::pool::get_conn;

pub fn dashboard_routes() -> Router<AppContext> {
    Router::new()
        .route("/", get(dashboard))
        .route("/sync-now", post(sync_now))
}

pub async fn dashboard(
    State(ctx): State<AppContext>,
    RawQuery(raw): RawQuery,
    Query(query): Query<DashboardQuery>,
) -> Result<Html<String>, AppError> {
    let settings = ctx.service.settings()?;
    let now = chrono::Utc::now().timestamp();

    let conn = get_conn(ctx.db())?;
    let page = dashboard::load_page(&conn, settings.lookback_days, now, &query)?;
    drop(conn);

    let query_no_page = dashboard::query_without_page(raw.as_deref());
    let view = pages::DashboardView {
        page: &page,
        query: &query,
        query_no_page: &query_no_page,
        last_sync_epoch: settings.last_sync_epoch,
        poll_minutes: settings.poll_minutes,
        auto_invoice: settings.auto_invoice,
    };
    Ok(Html(pages::dashboard_page(&view)))
}

/// Run one sync cycle. Failures come back as a flash message rather than an
/// error page.
pub async fn sync_now(State(ctx): State<AppContext>) -> Redirect {
    match ctx.service.sync_orders().await {
        Ok(report) => {
            tracing::info!(%report, "Manual sync finished");
            Redirect::to(&format!("/?msg={}", urlencoded(&report.to_string())))
        }
        Err(e) => {
            tracing::error!("Manual sync failed: {}", e);
            Redirect::to(&format!("/?err={}", urlencoded(&format!("Sync failed: {e}"))))
        }
    }
}
