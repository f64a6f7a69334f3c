use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use earsiv_common::InvoiceStatus;

use super::{html_escape as esc, urlencoded};
use crate::dashboard::{invoice_status_options, DashboardPage, DashboardQuery, SortKey};
use crate::settings;

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:0;background:#f6f7f9;color:#222}\
header{background:#233;color:#fff;padding:.6rem 1rem;display:flex;gap:1rem;align-items:center}\
header a{color:#fff}main{padding:1rem}table{border-collapse:collapse;width:100%;background:#fff}\
th,td{border-bottom:1px solid #ddd;padding:.35rem .5rem;text-align:left;font-size:.9rem}\
.msg{background:#e3f6e5;padding:.5rem;margin-bottom:.5rem}.err{background:#fbe4e4;padding:.5rem;margin-bottom:.5rem}\
.st-SENT{color:#176b2c}.st-ERROR{color:#a11}.st-CREATED{color:#8a5a00}\
form.inline{display:inline}label{display:block;margin:.4rem 0}input[type=text],input[type=password]{width:24rem}";

fn layout(title: &str, nav: bool, body: &str) -> String {
    let nav = if nav {
        r#"<a href="/">Orders</a><a href="/settings">Settings</a><a href="/logout">Logout</a>"#
    } else {
        ""
    };
    format!(
        "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\
         <title>{title}</title><style>{STYLE}</style></head>\
         <body><header><strong>Etsy → Luca e-Arşiv</strong>{nav}</header><main>{body}</main></body></html>",
        title = esc(title),
    )
}

fn flash(msg: Option<&str>, err: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(m) = msg.filter(|m| !m.is_empty()) {
        let _ = write!(out, r#"<div class="msg">{}</div>"#, esc(m));
    }
    if let Some(e) = err.filter(|e| !e.is_empty()) {
        let _ = write!(out, r#"<div class="err">{}</div>"#, esc(e));
    }
    out
}

fn format_epoch(epoch: i64) -> String {
    if epoch <= 0 {
        return "never".to_string();
    }
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| epoch.to_string())
}

/// The login form.
pub fn login_page(error: Option<&str>, next: Option<&str>) -> String {
    let next_field = next
        .filter(|n| !n.is_empty())
        .map(|n| format!(r#"<input type="hidden" name="next" value="{}">"#, esc(n)))
        .unwrap_or_default();
    let body = format!(
        r#"{flash}<form method="post" action="/login">
<label>Password <input type="password" name="password" autofocus required></label>
{next_field}<button type="submit">Log in</button></form>"#,
        flash = flash(None, error),
    );
    layout("Login", false, &body)
}

/// Values shown on the dashboard besides the order rows.
pub struct DashboardView<'a> {
    pub page: &'a DashboardPage,
    pub query: &'a DashboardQuery,
    pub query_no_page: &'a str,
    pub last_sync_epoch: i64,
    pub poll_minutes: u64,
    pub auto_invoice: bool,
}

fn select(name: &str, current: &str, options: &[(&str, &str)]) -> String {
    let mut out = format!(r#"<select name="{name}">"#);
    for (value, label) in options {
        let selected = if value.eq_ignore_ascii_case(current) { " selected" } else { "" };
        let _ = write!(
            out,
            r#"<option value="{}"{selected}>{}</option>"#,
            esc(value),
            esc(label)
        );
    }
    out.push_str("</select>");
    out
}

fn pager_href(query_no_page: &str, page: usize) -> String {
    if query_no_page.is_empty() {
        format!("/?page={page}")
    } else {
        format!("/?{query_no_page}&page={page}")
    }
}

/// The order list with invoice actions.
pub fn dashboard_page(view: &DashboardView<'_>) -> String {
    let q = view.query;
    let mut body = flash(q.msg.as_deref(), q.err.as_deref());

    let _ = write!(
        body,
        r#"<p>Last sync: {last} · Poll every {poll} min · Auto-invoice: {auto}</p>
<form method="post" action="/sync-now" class="inline"><button type="submit">Sync now</button></form>"#,
        last = esc(&format_epoch(view.last_sync_epoch)),
        poll = view.poll_minutes,
        auto = if view.auto_invoice { "on" } else { "off" },
    );

    let mut istatus: Vec<(&str, &str)> = vec![("", "Any invoice")];
    istatus.extend(invoice_status_options().iter().map(|s| (*s, *s)));
    let sorts: Vec<(&str, &str)> = SortKey::ALL
        .iter()
        .map(|k| (k.as_str(), k.as_str()))
        .collect();

    let _ = write!(
        body,
        r#"<form method="get" action="/">
<input type="text" name="q" value="{q_value}" placeholder="Buyer or receipt id">
{istatus}
<input type="text" name="ostatus" value="{ostatus}" placeholder="Order status">
{sort}
<input type="number" name="per_page" value="{per_page}" min="1" max="200">
<button type="submit">Filter</button></form>"#,
        q_value = esc(&q.q),
        istatus = select("istatus", &q.istatus, &istatus),
        ostatus = esc(&q.ostatus),
        sort = select("sort", q.sort_key().as_str(), &sorts),
        per_page = view.page.per_page,
    );

    body.push_str(
        r#"<form method="post" id="bulk"><input type="hidden" name="ids" id="bulk-ids">
<button type="submit" formaction="/invoice/bulk/create">Create selected</button>
<button type="submit" formaction="/invoice/bulk/send">Send selected</button></form>
<table><thead><tr><th><input type="checkbox" id="all"></th><th>Receipt</th><th>Buyer</th>
<th>Total</th><th>Order status</th><th>Updated</th><th>Invoice</th><th>Actions</th></tr></thead><tbody>"#,
    );

    for row in &view.page.rows {
        let o = &row.order;
        let inv = &row.invoice;
        let id = esc(&o.receipt_id);
        let path_id = urlencoded(&o.receipt_id);

        let mut actions = String::new();
        if inv.status != InvoiceStatus::Sent {
            let _ = write!(
                actions,
                r#"<form method="post" action="/invoice/create/{path_id}" class="inline"><button>Create</button></form>"#
            );
        }
        if inv.ettn().is_some() {
            if inv.status != InvoiceStatus::Sent {
                let _ = write!(
                    actions,
                    r#"<form method="post" action="/invoice/send/{path_id}" class="inline"><button>Send</button></form>"#
                );
            }
            let _ = write!(
                actions,
                r#" <a href="/invoice/view/{path_id}" target="_blank">View</a> <a href="/invoice/pdf/{path_id}">PDF</a>"#
            );
        }

        let detail = match (&inv.error, &inv.invoice_number) {
            (Some(e), _) if inv.status == InvoiceStatus::Error => {
                format!(r#"<br><small title="{0}">{0}</small>"#, esc(e))
            }
            (_, Some(n)) if !n.is_empty() => format!("<br><small>{}</small>", esc(n)),
            _ => String::new(),
        };

        let _ = write!(
            body,
            r#"<tr><td><input type="checkbox" class="pick" value="{id}"></td><td>{id}</td><td>{buyer}</td>
<td>{total:.2} {currency}</td><td>{ostatus}</td><td>{updated}</td>
<td class="st-{status}">{status}{detail}</td><td>{actions}</td></tr>"#,
            buyer = esc(&o.buyer_name),
            total = o.total,
            currency = esc(&o.currency),
            ostatus = esc(&o.status),
            updated = esc(&format_epoch(o.updated_epoch)),
            status = inv.status,
        );
    }
    body.push_str("</tbody></table>");

    let page = view.page;
    let shown_from = if page.rows.is_empty() { 0 } else { page.start_index + 1 };
    let _ = write!(
        body,
        "<p>Showing {shown_from}–{} of {}",
        if page.rows.is_empty() { 0 } else { page.end_index() },
        page.total
    );
    if page.has_prev() {
        let _ = write!(
            body,
            r#" · <a href="{}">Prev</a>"#,
            esc(&pager_href(view.query_no_page, page.page - 1))
        );
    }
    if page.has_next() {
        let _ = write!(
            body,
            r#" · <a href="{}">Next</a>"#,
            esc(&pager_href(view.query_no_page, page.page + 1))
        );
    }
    body.push_str("</p>");

    body.push_str(
        r#"<script>
document.getElementById('all').addEventListener('change',function(e){
document.querySelectorAll('.pick').forEach(function(c){c.checked=e.target.checked;});});
document.getElementById('bulk').addEventListener('submit',function(){
var ids=[];document.querySelectorAll('.pick:checked').forEach(function(c){ids.push(c.value);});
document.getElementById('bulk-ids').value=ids.join(',');});
</script>"#,
    );

    layout("Orders", true, &body)
}

/// The settings form. Credentials use password inputs.
pub fn settings_page(values: &BTreeMap<String, String>, msg: Option<&str>, err: Option<&str>) -> String {
    let value = |key: &str| esc(values.get(key).map(String::as_str).unwrap_or_default());
    let text = |key: &str, label: &str| {
        format!(
            r#"<label>{label} <input type="text" name="{key}" value="{}"></label>"#,
            value(key)
        )
    };
    let secret = |key: &str, label: &str| {
        format!(
            r#"<label>{label} <input type="password" name="{key}" value="{}" autocomplete="off"></label>"#,
            value(key)
        )
    };

    let auto_checked = values
        .get(settings::AUTO_INVOICE)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let body = format!(
        r#"{flash}<form method="post" action="/settings">
<h3>Etsy</h3>{etsy_client_id}{etsy_refresh_token}{etsy_shop_id}
<h3>Luca</h3>{luca_identity}{luca_password}{luca_company_id}{luca_base}
<h3>Behaviour</h3>{poll}{lookback}{kdv}{currency}
<label><input type="checkbox" name="auto_invoice"{auto}> Create and send invoices automatically while polling</label>
<button type="submit">Save</button></form>
<form method="post" action="/settings/test/etsy" class="inline"><button>Test Etsy</button></form>
<form method="post" action="/settings/test/luca" class="inline"><button>Test Luca</button></form>"#,
        flash = flash(msg, err),
        etsy_client_id = text(settings::ETSY_CLIENT_ID, "Client id (keystring)"),
        etsy_refresh_token = secret(settings::ETSY_REFRESH_TOKEN, "Refresh token"),
        etsy_shop_id = text(settings::ETSY_SHOP_ID, "Shop id"),
        luca_identity = text(settings::LUCA_IDENTITY, "Identification number"),
        luca_password = secret(settings::LUCA_PASSWORD, "Password"),
        luca_company_id = text(settings::LUCA_COMPANY_ID, "Company id"),
        luca_base = text(settings::LUCA_BASE, "API base URL"),
        poll = text(settings::POLL_MINUTES, "Poll interval (minutes)"),
        lookback = text(settings::LOOKBACK_DAYS, "Dashboard lookback (days)"),
        kdv = text(settings::DEFAULT_KDV_RATE, "Default KDV rate (%)"),
        currency = text(settings::CURRENCY_FALLBACK, "Fallback currency"),
        auto = if auto_checked { " checked" } else { "" },
    );
    layout("Settings", true, &body)
}
