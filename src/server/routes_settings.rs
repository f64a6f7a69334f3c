//! Settings form and connectivity checks.

use crate::server::{AppContext, AppError};
use crate::settings::SettingsForm;
use crate::web::{pages, urlencoded};
use axum::{
    extract::{Query, State},
    response::{Html, Redirect},
    routing::{get, post},
    Form, Router,
};
use earsiv_db::pool::get_conn;
use earsiv_db::queries::settings::all_settings;
use serde::Deserialize;

pub fn settings_routes() -> Router<AppContext> {
    Router::new()
        .route("/settings", get(settings_page).post(save_settings))
        .route("/settings/test/etsy", post(test_etsy))
        .route("/settings/test/luca", post(test_luca))
}

#[derive(Debug, Default, Deserialize)]
struct Flash {
    msg: Option<String>,
    err: Option<String>,
}

async fn settings_page(
    State(ctx): State<AppContext>,
    Query(flash): Query<Flash>,
) -> Result<Html<String>, AppError> {
    let conn = get_conn(ctx.db())?;
    let values = all_settings(&conn)?;
    drop(conn);

    Ok(Html(pages::settings_page(
        &values,
        flash.msg.as_deref(),
        flash.err.as_deref(),
    )))
}

async fn save_settings(
    State(ctx): State<AppContext>,
    Form(form): Form<SettingsForm>,
) -> Result<Redirect, AppError> {
    let conn = get_conn(ctx.db())?;
    form.save(&conn)?;
    drop(conn);

    tracing::info!("Settings saved");
    ctx.poller.reschedule();
    Ok(Redirect::to("/settings?msg=Saved"))
}

fn check_redirect(service: &str, result: earsiv_common::Result<()>) -> Redirect {
    match result {
        Ok(()) => Redirect::to(&format!("/settings?msg={service}+OK")),
        Err(e) => {
            tracing::warn!("{} connectivity check failed: {}", service, e);
            Redirect::to(&format!(
                "/settings?err={}",
                urlencoded(&format!("{service} Error: {e}"))
            ))
        }
    }
}

async fn test_etsy(State(ctx): State<AppContext>) -> Redirect {
    check_redirect("Etsy", ctx.service.test_etsy().await)
}

async fn test_luca(State(ctx): State<AppContext>) -> Redirect {
    check_redirect("Luca", ctx.service.test_luca().await)
}
