//! Dashboard listing: cached orders joined with invoice state, filtered,
//! sorted and paginated.

use std::collections::HashMap;

use earsiv_common::{InvoiceStatus, Result};
use earsiv_db::models::{Invoice, OrderSummary};
use earsiv_db::queries::{invoices, orders};
use rusqlite::Connection;
use serde::Deserialize;

/// Upper bound on orders loaded for the dashboard.
pub const MAX_ORDERS: usize = 5000;
pub const DEFAULT_PER_PAGE: usize = 20;
pub const MAX_PER_PAGE: usize = 200;

/// Order sort options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    UpdatedDesc,
    UpdatedAsc,
    TotalDesc,
    TotalAsc,
}

impl SortKey {
    pub const ALL: [SortKey; 4] = [
        SortKey::UpdatedDesc,
        SortKey::UpdatedAsc,
        SortKey::TotalDesc,
        SortKey::TotalAsc,
    ];

    /// Unknown values sort newest first.
    pub fn parse(value: &str) -> Self {
        match value {
            "updated_asc" => SortKey::UpdatedAsc,
            "total_desc" => SortKey::TotalDesc,
            "total_asc" => SortKey::TotalAsc,
            _ => SortKey::UpdatedDesc,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::UpdatedDesc => "updated_desc",
            SortKey::UpdatedAsc => "updated_asc",
            SortKey::TotalDesc => "total_desc",
            SortKey::TotalAsc => "total_asc",
        }
    }
}

/// Dashboard query string. Numbers are kept as text so bad input falls back
/// to defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub istatus: String,
    #[serde(default)]
    pub ostatus: String,
    #[serde(default)]
    pub sort: String,
    #[serde(default)]
    pub page: String,
    #[serde(default)]
    pub per_page: String,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub err: Option<String>,
}

impl DashboardQuery {
    pub fn page(&self) -> usize {
        self.page.trim().parse::<usize>().unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> usize {
        self.per_page
            .trim()
            .parse::<usize>()
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    pub fn sort_key(&self) -> SortKey {
        SortKey::parse(&self.sort)
    }
}

/// An order with its invoice (status `NONE` when there is no row).
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRow {
    pub order: OrderSummary,
    pub invoice: Invoice,
}

/// One page of the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardPage {
    pub rows: Vec<OrderRow>,
    /// Orders matching the filters.
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    /// Zero-based index of the first row on this page.
    pub start_index: usize,
}

impl DashboardPage {
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.start_index.saturating_add(self.per_page) < self.total
    }

    /// One-based index of the last row shown.
    pub fn end_index(&self) -> usize {
        self.start_index.saturating_add(self.per_page).min(self.total)
    }
}

/// Join orders with their invoices.
pub fn attach_invoices(
    orders: Vec<OrderSummary>,
    invoices: &HashMap<String, Invoice>,
) -> Vec<OrderRow> {
    orders
        .into_iter()
        .map(|order| {
            let invoice = invoices
                .get(&order.receipt_id)
                .cloned()
                .unwrap_or_else(|| Invoice::none(&order.receipt_id));
            OrderRow { order, invoice }
        })
        .collect()
}

/// Keep rows matching the search text and status filters.
///
/// `q` matches the buyer name case-insensitively or the receipt id as a
/// substring. Empty filters match everything.
pub fn filter_rows(rows: Vec<OrderRow>, q: &str, istatus: &str, ostatus: &str) -> Vec<OrderRow> {
    let q = q.trim().to_lowercase();
    let istatus = istatus.trim();
    let ostatus = ostatus.trim();

    rows.into_iter()
        .filter(|row| {
            q.is_empty()
                || row.order.buyer_name.to_lowercase().contains(&q)
                || row.order.receipt_id.contains(&q)
        })
        .filter(|row| istatus.is_empty() || row.invoice.status.as_str().eq_ignore_ascii_case(istatus))
        .filter(|row| ostatus.is_empty() || row.order.status.eq_ignore_ascii_case(ostatus))
        .collect()
}

/// Sort rows in place. Sorting is stable.
pub fn sort_rows(rows: &mut [OrderRow], key: SortKey) {
    match key {
        SortKey::UpdatedDesc => rows.sort_by(|a, b| b.order.updated_epoch.cmp(&a.order.updated_epoch)),
        SortKey::UpdatedAsc => rows.sort_by_key(|r| r.order.updated_epoch),
        SortKey::TotalDesc => rows.sort_by(|a, b| b.order.total.total_cmp(&a.order.total)),
        SortKey::TotalAsc => rows.sort_by(|a, b| a.order.total.total_cmp(&b.order.total)),
    }
}

/// Filter, sort and slice one page.
pub fn paginate(rows: Vec<OrderRow>, query: &DashboardQuery) -> DashboardPage {
    let mut rows = filter_rows(rows, &query.q, &query.istatus, &query.ostatus);
    sort_rows(&mut rows, query.sort_key());

    let page = query.page();
    let per_page = query.per_page();
    let total = rows.len();
    let start_index = (page - 1).saturating_mul(per_page);

    let rows = rows.into_iter().skip(start_index).take(per_page).collect();
    DashboardPage {
        rows,
        total,
        page,
        per_page,
        start_index,
    }
}

/// Build the dashboard page from the database.
pub fn load_page(
    conn: &Connection,
    lookback_days: i64,
    now: i64,
    query: &DashboardQuery,
) -> Result<DashboardPage> {
    let cutoff = now - lookback_days.saturating_mul(86_400);
    let orders = orders::recent_orders(conn, cutoff, MAX_ORDERS)?;
    let invoices = invoices::invoices_by_receipt(conn)?;
    Ok(paginate(attach_invoices(orders, &invoices), query))
}

/// The raw query string without `page` pairs, for pager links.
pub fn query_without_page(raw_query: Option<&str>) -> String {
    raw_query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some("page"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Status filter options for the dashboard.
pub fn invoice_status_options() -> [&'static str; 4] {
    InvoiceStatus::ALL.map(|s| s.as_str())
}
