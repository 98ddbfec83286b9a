use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;
use super::orders::{order_page, ORDER_SEARCH};
use super::payments::RangeQuery;
use super::{push_created_range, push_search};
use crate::auth::AdminUser;
use crate::domain::aggregates::{Order, OrderRefundStatus};
use crate::http::extract::{ListQuery, Page, PaginatedResponse};
use crate::http::AppState;
use crate::services::calendar::Calendar;
use crate::services::dashboard::{self, RefundCards};
use crate::services::refunds;
use crate::store::{orders as store, OrderView};
use crate::{NurseryError, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/refund-dashboard-cards", get(cards))
        .route("/get-all-refunds/:page", get(list))
        .route("/export-all-refund-orders", get(export))
        .route("/:orderId/refund", post(approve))
        .route("/cancel-refund/:orderId", put(decline).post(decline))
}

async fn cards(State(s): State<AppState>, _admin: AdminUser, Query(q): Query<RangeQuery>) -> Result<Json<RefundCards>> {
    Ok(Json(dashboard::refund_cards(&s.db, &s.calendar(), Utc::now(), q.start_date, q.end_date).await?))
}

fn refund_filter(select: &str, q: &ListQuery, calendar: &Calendar) -> Result<QueryBuilder<'static, Postgres>> {
    let mut qb = QueryBuilder::new(select);
    qb.push(" WHERE o.refund_status IS NOT NULL");
    push_search(&mut qb, &ORDER_SEARCH, q);
    if let Some(status) = q.status.as_deref().filter(|s| !s.trim().is_empty()) {
        let status = OrderRefundStatus::parse(status).ok_or_else(|| NurseryError::bad_request("Enter a valid status value"))?;
        qb.push(" AND o.refund_status = ").push_bind(status);
    }
    push_created_range(&mut qb, "o.refund_request_date", q, calendar);
    Ok(qb)
}

async fn list(State(s): State<AppState>, _admin: AdminUser, Path(page): Path<u32>, Query(q): Query<ListQuery>) -> Result<Json<PaginatedResponse<OrderView>>> {
    let calendar = s.calendar();
    let rows = refund_filter("SELECT o.* FROM orders o", &q, &calendar)?;
    let count = refund_filter("SELECT COUNT(*) FROM orders o", &q, &calendar)?;
    Ok(Json(order_page(&s, rows, count, Page::new(page)).await?))
}

async fn export(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<OrderView>>> {
    let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE refund_status IS NOT NULL ORDER BY refund_request_date DESC NULLS LAST")
        .fetch_all(&s.db)
        .await?;
    Ok(Json(store::load_views(&s.db, orders).await?))
}

async fn approve(State(s): State<AppState>, _admin: AdminUser, Path(order_id): Path<Uuid>) -> Result<Json<serde_json::Value>> {
    let (order, refund) = refunds::approve(&s, order_id).await?;
    Ok(Json(json!({ "message": "Refund initiated successfully", "order": order, "refund": refund })))
}

async fn decline(State(s): State<AppState>, _admin: AdminUser, Path(order_id): Path<Uuid>) -> Result<Json<serde_json::Value>> {
    let order = refunds::decline(&s, order_id).await?;
    Ok(Json(json!({ "message": "Refund request declined", "order": order })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};

    #[test]
    fn test_refund_filter_uses_request_date() {
        let calendar = Calendar::new(FixedOffset::east_opt(0).unwrap());
        let q = ListQuery { status: Some("pending".into()), start_date: NaiveDate::from_ymd_opt(2025, 5, 1), ..Default::default() };
        let qb = refund_filter("SELECT COUNT(*) FROM orders o", &q, &calendar).unwrap();
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM orders o WHERE o.refund_status IS NOT NULL AND o.refund_status = $1 AND o.refund_request_date >= $2"
        );
    }

    #[test]
    fn test_refund_filter_rejects_unknown_status() {
        let calendar = Calendar::new(FixedOffset::east_opt(0).unwrap());
        let q = ListQuery { status: Some("DONE".into()), ..Default::default() };
        assert!(refund_filter("SELECT 1", &q, &calendar).is_err());
    }
}
