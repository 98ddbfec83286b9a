//! Admin order desk: paid and cancelled lists, detail, progress, bulk entry.
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;
use super::push_search;
use crate::auth::AdminUser;
use crate::domain::aggregates::{Order, StageType};
use crate::http::extract::{ListQuery, Page, PaginatedResponse, ValidatedJson};
use crate::http::orders::OrderRequest;
use crate::http::{message, AppState};
use crate::services::orders;
use crate::store::{orders as store, OrderView};
use crate::{NurseryError, Result};

pub const ORDER_SEARCH: [&str; 5] = ["o.full_name", "o.phone", "o.delivery_address", "o.order_code", "o.email"];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/fetch-order-details/:page", get(paid_orders))
        .route("/fetch-cancelled-order/:page", get(cancelled_orders))
        .route("/fetch-specific-order/:id", get(order_detail))
        .route("/delete-order/:id", delete(delete_order))
        .route("/update-progress-status/:id", put(update_progress))
        .route("/bulk-order", post(bulk_order))
}

/// Paid orders filtered by search, current stage, delivery date range and state.
fn paid_filter(select: &str, q: &ListQuery) -> Result<QueryBuilder<'static, Postgres>> {
    let mut qb = QueryBuilder::new(select);
    qb.push(" LEFT JOIN progress_trackers t ON t.order_id = o.id WHERE o.status = 'PAID'");
    push_search(&mut qb, &ORDER_SEARCH, q);
    if let Some(stage) = q.status.as_deref().filter(|s| !s.trim().is_empty()) {
        let stage = StageType::parse(stage).ok_or_else(|| NurseryError::bad_request("Invalid status value"))?;
        qb.push(" AND t.current_stage = ").push_bind(stage);
    }
    if let Some(from) = q.start_date {
        qb.push(" AND o.delivery_date >= ").push_bind(from);
    }
    if let Some(to) = q.end_date {
        qb.push(" AND o.delivery_date <= ").push_bind(to);
    }
    if let Some(state) = q.state.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        qb.push(" AND LOWER(o.state) = LOWER(").push_bind(state.to_string()).push(")");
    }
    Ok(qb)
}

/// Runs a filtered `orders o` query page and attaches each order's records.
pub(crate) async fn order_page(
    s: &AppState,
    mut rows: QueryBuilder<'static, Postgres>,
    mut count: QueryBuilder<'static, Postgres>,
    page: Page,
) -> Result<PaginatedResponse<OrderView>> {
    rows.push(" ORDER BY o.created_at DESC LIMIT ").push_bind(page.limit()).push(" OFFSET ").push_bind(page.offset());
    let orders = rows.build_query_as::<Order>().fetch_all(&s.db).await?;
    let (total,): (i64,) = count.build_query_as().fetch_one(&s.db).await?;
    Ok(PaginatedResponse::new(store::load_views(&s.db, orders).await?, total, page))
}

async fn paid_orders(State(s): State<AppState>, _admin: AdminUser, Path(page): Path<u32>, Query(q): Query<ListQuery>) -> Result<Json<PaginatedResponse<OrderView>>> {
    let rows = paid_filter("SELECT o.* FROM orders o", &q)?;
    let count = paid_filter("SELECT COUNT(*) FROM orders o", &q)?;
    Ok(Json(order_page(&s, rows, count, Page::new(page)).await?))
}

fn cancelled_filter(select: &str, q: &ListQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(select);
    qb.push(" WHERE o.status = 'CANCELLED'");
    push_search(&mut qb, &ORDER_SEARCH, q);
    qb
}

async fn cancelled_orders(State(s): State<AppState>, _admin: AdminUser, Path(page): Path<u32>, Query(q): Query<ListQuery>) -> Result<Json<PaginatedResponse<OrderView>>> {
    let rows = cancelled_filter("SELECT o.* FROM orders o", &q);
    let count = cancelled_filter("SELECT COUNT(*) FROM orders o", &q);
    Ok(Json(order_page(&s, rows, count, Page::new(page)).await?))
}

async fn order_detail(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<OrderView>> {
    store::load_view(&s.db, id).await?.map(Json).ok_or_else(|| NurseryError::not_found("Order"))
}

/// Payment, tracker and refund rows go with the order.
async fn delete_order(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>> {
    let deleted = sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(&s.db).await?.rows_affected();
    if deleted == 0 { return Err(NurseryError::not_found("Order")); }
    tracing::info!(order_id = %id, "Order deleted");
    Ok(message("Order deleted successfully"))
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest { pub status: String }

async fn update_progress(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, Json(r): Json<ProgressRequest>) -> Result<Json<serde_json::Value>> {
    let progress = orders::advance_progress(&s, id, &r.status).await?;
    Ok(Json(json!({ "message": "Progress updated successfully", "progress": progress })))
}

async fn bulk_order(State(s): State<AppState>, _admin: AdminUser, ValidatedJson(r): ValidatedJson<OrderRequest>) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let order = orders::bulk(&s, r.into_draft()?).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "Bulk order created successfully", "order": order }))))
}
