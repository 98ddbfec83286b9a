//! Order, payment, progress and refund rows.
//!
//! Lifecycle changes lock the order row first (`FOR UPDATE`) and then its
//! dependents, always in that order.
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;
use crate::domain::aggregates::{Order, Payment, ProgressTracker, Refund};
use crate::domain::value_objects::OrderCode;
use crate::Result;

/// Advisory lock key serialising order-code generation.
const ORDER_CODE_LOCK: i64 = 0x4b50_434f_4445;

/// An order with everything hanging off it, as the API returns it.
#[derive(Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub payment: Option<Payment>,
    pub progress: Option<ProgressTracker>,
    pub refund: Option<Refund>,
}

/// Next `KP<year>-<seq>` code. Holds a transaction-scoped advisory lock so
/// concurrent placements never read the same predecessor.
pub async fn next_order_code(conn: &mut PgConnection, year: i32) -> Result<OrderCode> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(ORDER_CODE_LOCK).execute(&mut *conn).await?;
    let last: Option<(String,)> = sqlx::query_as(
        "SELECT order_code FROM orders WHERE order_code LIKE $1 ORDER BY LENGTH(order_code) DESC, order_code DESC LIMIT 1",
    )
    .bind(format!("{}{year}-%", OrderCode::PREFIX))
    .fetch_optional(&mut *conn)
    .await?;
    Ok(OrderCode::successor(last.as_ref().map(|(code,)| code.as_str()), year))
}

pub async fn insert_order(conn: &mut PgConnection, o: &Order) -> Result<()> {
    sqlx::query(
        "INSERT INTO orders (id, order_code, user_id, product_id, product_name, delivery_date, delivery_location, quantity, \
         price_per_unit_paise, total_amount_paise, currency, full_name, email, phone, whatsapp, delivery_address, state, district, \
         pincode, area_name, payment_method, terms_accepted, status, refund_status, refund_request_date, is_bulk_upload, metadata, \
         created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29)",
    )
    .bind(o.id()).bind(o.order_code()).bind(o.user_id()).bind(o.product_id()).bind(o.product_name()).bind(o.delivery_date())
    .bind(o.delivery_location()).bind(o.quantity()).bind(o.price_per_unit().value()).bind(o.total().value()).bind(o.currency())
    .bind(o.full_name()).bind(o.email()).bind(o.phone()).bind(o.whatsapp()).bind(o.delivery_address()).bind(o.state())
    .bind(o.district()).bind(o.pincode()).bind(o.area_name()).bind(o.payment_method()).bind(o.terms_accepted()).bind(o.status())
    .bind(o.refund_status()).bind(o.refund_request_date()).bind(o.is_bulk_upload()).bind(o.metadata()).bind(o.created_at())
    .bind(o.updated_at())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Writes the columns the lifecycle can change.
pub async fn update_order(conn: &mut PgConnection, o: &Order) -> Result<()> {
    sqlx::query(
        "UPDATE orders SET status = $2, refund_status = $3, refund_request_date = $4, metadata = $5, updated_at = $6 WHERE id = $1",
    )
    .bind(o.id()).bind(o.status()).bind(o.refund_status()).bind(o.refund_request_date()).bind(o.metadata()).bind(o.updated_at())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn lock_order(conn: &mut PgConnection, id: Uuid) -> Result<Option<Order>> {
    Ok(sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE").bind(id).fetch_optional(&mut *conn).await?)
}

pub async fn lock_order_by_gateway_order(conn: &mut PgConnection, gateway_order_id: &str) -> Result<Option<Order>> {
    Ok(sqlx::query_as::<_, Order>(
        "SELECT o.* FROM orders o JOIN payments p ON p.order_id = o.id WHERE p.gateway_order_id = $1 FOR UPDATE OF o",
    )
    .bind(gateway_order_id)
    .fetch_optional(&mut *conn)
    .await?)
}

pub async fn insert_payment(conn: &mut PgConnection, p: &Payment) -> Result<()> {
    sqlx::query(
        "INSERT INTO payments (id, order_id, provider, gateway_order_id, gateway_payment_id, gateway_signature, amount_paise, currency, \
         status, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(p.id()).bind(p.order_id()).bind(p.provider()).bind(p.gateway_order_id()).bind(p.gateway_payment_id())
    .bind(p.gateway_signature()).bind(p.amount().value()).bind(p.currency()).bind(p.status()).bind(p.created_at()).bind(p.updated_at())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn update_payment(conn: &mut PgConnection, p: &Payment) -> Result<()> {
    sqlx::query("UPDATE payments SET gateway_payment_id = $2, gateway_signature = $3, status = $4, updated_at = $5 WHERE id = $1")
        .bind(p.id()).bind(p.gateway_payment_id()).bind(p.gateway_signature()).bind(p.status()).bind(p.updated_at())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn lock_payment(conn: &mut PgConnection, order_id: Uuid) -> Result<Option<Payment>> {
    Ok(sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = $1 FOR UPDATE").bind(order_id).fetch_optional(&mut *conn).await?)
}

pub async fn lock_tracker(conn: &mut PgConnection, order_id: Uuid) -> Result<Option<ProgressTracker>> {
    Ok(sqlx::query_as::<_, ProgressTracker>("SELECT * FROM progress_trackers WHERE order_id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?)
}

pub async fn save_tracker(conn: &mut PgConnection, t: &ProgressTracker) -> Result<()> {
    sqlx::query(
        "INSERT INTO progress_trackers (id, order_id, current_stage, progress_percentage, stages, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (order_id) DO UPDATE SET current_stage = EXCLUDED.current_stage, \
         progress_percentage = EXCLUDED.progress_percentage, stages = EXCLUDED.stages, updated_at = EXCLUDED.updated_at",
    )
    .bind(t.id()).bind(t.order_id()).bind(t.current_stage()).bind(t.progress_percentage())
    .bind(sqlx::types::Json(t.stages())).bind(t.created_at()).bind(t.updated_at())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn lock_refund(conn: &mut PgConnection, order_id: Uuid) -> Result<Option<Refund>> {
    Ok(sqlx::query_as::<_, Refund>("SELECT * FROM refunds WHERE order_id = $1 FOR UPDATE").bind(order_id).fetch_optional(&mut *conn).await?)
}

/// Order a refund webhook belongs to, by gateway id or by the receipt sent
/// with the attempt. Does not lock.
pub async fn order_id_for_refund(conn: &mut PgConnection, gateway_refund_id: &str, receipt: Option<&str>) -> Result<Option<Uuid>> {
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT order_id FROM refunds WHERE gateway_refund_id = $1 OR idempotency_key = $2")
        .bind(gateway_refund_id)
        .bind(receipt)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|(id,)| id))
}

pub async fn save_refund(conn: &mut PgConnection, r: &Refund) -> Result<()> {
    sqlx::query(
        "INSERT INTO refunds (id, order_id, gateway_refund_id, idempotency_key, amount_paise, status, processed_at, failed_at, failure_reason, \
         metadata, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         ON CONFLICT (order_id) DO UPDATE SET gateway_refund_id = EXCLUDED.gateway_refund_id, idempotency_key = EXCLUDED.idempotency_key, \
         amount_paise = EXCLUDED.amount_paise, status = EXCLUDED.status, processed_at = EXCLUDED.processed_at, failed_at = EXCLUDED.failed_at, \
         failure_reason = EXCLUDED.failure_reason, metadata = EXCLUDED.metadata, updated_at = EXCLUDED.updated_at",
    )
    .bind(r.id()).bind(r.order_id()).bind(r.gateway_refund_id()).bind(r.idempotency_key()).bind(r.amount().value()).bind(r.status())
    .bind(r.processed_at()).bind(r.failed_at()).bind(r.failure_reason()).bind(r.metadata()).bind(r.created_at()).bind(r.updated_at())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Attaches payment, tracker and refund rows to each order, keeping order.
pub async fn load_views(db: &PgPool, orders: Vec<Order>) -> Result<Vec<OrderView>> {
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id()).collect();
    let mut payments: HashMap<Uuid, Payment> = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = ANY($1)")
        .bind(&ids).fetch_all(db).await?.into_iter().map(|p| (p.order_id(), p)).collect();
    let mut trackers: HashMap<Uuid, ProgressTracker> = sqlx::query_as::<_, ProgressTracker>("SELECT * FROM progress_trackers WHERE order_id = ANY($1)")
        .bind(&ids).fetch_all(db).await?.into_iter().map(|t| (t.order_id(), t)).collect();
    let mut refunds: HashMap<Uuid, Refund> = sqlx::query_as::<_, Refund>("SELECT * FROM refunds WHERE order_id = ANY($1)")
        .bind(&ids).fetch_all(db).await?.into_iter().map(|r| (r.order_id(), r)).collect();
    Ok(orders
        .into_iter()
        .map(|order| {
            let id = order.id();
            OrderView { payment: payments.remove(&id), progress: trackers.remove(&id), refund: refunds.remove(&id), order }
        })
        .collect())
}

pub async fn load_view(db: &PgPool, id: Uuid) -> Result<Option<OrderView>> {
    let Some(order) = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(db).await? else {
        return Ok(None);
    };
    Ok(load_views(db, vec![order]).await?.pop())
}
