//! Invoice actions: create, send, view, PDF download and bulk variants.

use crate::invoicing::{BatchReport, InvoiceDocument};
use crate::server::{found, AppContext, AppError};
use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;

pub fn invoice_routes() -> Router<AppContext> {
    Router::new()
        .route("/invoice/create/:id", post(create_invoice))
        .route("/invoice/send/:id", post(send_invoice))
        .route("/invoice/view/:id", get(view_invoice))
        .route("/invoice/pdf/:id", get(invoice_pdf))
        .route("/invoice/bulk/create", post(bulk_create))
        .route("/invoice/bulk/send", post(bulk_send))
}

async fn create_invoice(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Redirect, AppError> {
    ctx.service.create_invoice(&id).await?;
    Ok(Redirect::to("/"))
}

async fn send_invoice(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Redirect, AppError> {
    ctx.service.send_invoice(&id).await?;
    Ok(Redirect::to("/"))
}

async fn view_invoice(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let url = ctx.service.invoice_url(&id).await?;
    Ok(found(&url))
}

async fn invoice_pdf(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    match ctx.service.invoice_pdf(&id).await? {
        InvoiceDocument::Pdf(bytes) => Ok((
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=invoice-{id}.pdf"),
                ),
            ],
            bytes,
        )
            .into_response()),
        InvoiceDocument::Url(url) => Ok(found(&url)),
    }
}

#[derive(Debug, Deserialize)]
struct BulkForm {
    #[serde(default)]
    ids: String,
}

fn bulk_redirect(verb: &str, report: BatchReport) -> Redirect {
    Redirect::to(&format!(
        "/?msg={verb}+{}+invoice(s)&err={}+error(s)",
        report.succeeded, report.errors
    ))
}

async fn bulk_create(
    State(ctx): State<AppContext>,
    Form(form): Form<BulkForm>,
) -> Result<Redirect, AppError> {
    let report = ctx.service.bulk_create(&form.ids).await?;
    Ok(bulk_redirect("Created", report))
}

async fn bulk_send(
    State(ctx): State<AppContext>,
    Form(form): Form<BulkForm>,
) -> Result<Redirect, AppError> {
    let report = ctx.service.bulk_send(&form.ids).await?;
    Ok(bulk_redirect("Sent", report))
}
