use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::{Postgres, QueryBuilder};
use super::orders::{order_page, ORDER_SEARCH};
use super::{push_created_range, push_search};
use crate::auth::AdminUser;
use crate::domain::aggregates::OrderStatus;
use crate::http::extract::{ListQuery, Page, PaginatedResponse};
use crate::http::AppState;
use crate::services::calendar::Calendar;
use crate::services::dashboard::{self, PaymentCards};
use crate::store::OrderView;
use crate::{NurseryError, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/get-payment-dashboard-cards", get(cards))
        .route("/get-all-transactions/:page", get(transactions))
        .route("/fetch-all-enums", get(enums))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

async fn cards(State(s): State<AppState>, _admin: AdminUser, Query(q): Query<RangeQuery>) -> Result<Json<PaymentCards>> {
    Ok(Json(dashboard::payment_cards(&s.db, &s.calendar(), Utc::now(), q.start_date, q.end_date).await?))
}

/// Every order regardless of status, the payments ledger view.
fn transaction_filter(select: &str, q: &ListQuery, calendar: &Calendar) -> Result<QueryBuilder<'static, Postgres>> {
    let mut qb = QueryBuilder::new(select);
    qb.push(" WHERE TRUE");
    push_search(&mut qb, &ORDER_SEARCH, q);
    if let Some(status) = q.status.as_deref().filter(|s| !s.trim().is_empty()) {
        let status = OrderStatus::parse(status).ok_or_else(|| NurseryError::bad_request("Please enter a valid status option"))?;
        qb.push(" AND o.status = ").push_bind(status);
    }
    push_created_range(&mut qb, "o.created_at", q, calendar);
    Ok(qb)
}

async fn transactions(State(s): State<AppState>, _admin: AdminUser, Path(page): Path<u32>, Query(q): Query<ListQuery>) -> Result<Json<PaginatedResponse<OrderView>>> {
    let calendar = s.calendar();
    let rows = transaction_filter("SELECT o.* FROM orders o", &q, &calendar)?;
    let count = transaction_filter("SELECT COUNT(*) FROM orders o", &q, &calendar)?;
    Ok(Json(order_page(&s, rows, count, Page::new(page)).await?))
}

async fn enums(_admin: AdminUser) -> Json<serde_json::Value> {
    Json(dashboard::enum_catalogue())
}
