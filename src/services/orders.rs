//! Order placement, payment capture, refund requests and fulfillment progress.
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgConnection;
use tracing::{debug, info, warn};
use uuid::Uuid;
use crate::auth::{AuthUser, Role};
use crate::domain::aggregates::{Order, OrderDraft, OrderStatus, Payment, ProgressTracker, RefundImage, StageType};
use crate::domain::events::DomainEvent;
use crate::gateway::{signature, WebhookEvent};
use crate::http::AppState;
use crate::services::{refunds, settings};
use crate::storage::{extension_of, Upload};
use crate::store::{orders as store, OrderView};
use crate::{NurseryError, Result};

pub const MAX_REFUND_REASON: usize = 1000;

/// What the checkout widget needs after an order is placed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
    pub order: Order,
    pub key_id: String,
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: String,
}

/// Client-side proof of a completed checkout.
#[derive(Debug, Clone)]
pub struct CheckoutProof {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

pub async fn place(state: &AppState, user: &AuthUser, draft: OrderDraft) -> Result<PlacedOrder> {
    if user.role != Role::User {
        return Err(NurseryError::Forbidden("Only customers can place orders".into()));
    }
    let now = Utc::now();
    let amount = draft.price_per_unit.times(draft.quantity)?;
    if !amount.is_positive() {
        return Err(NurseryError::bad_request("Order amount must be greater than zero"));
    }
    let receipt = format!("receipt_{}", now.timestamp_millis());
    let gateway_order = state.gateway.create_order(amount, Order::CURRENCY, &receipt).await?;

    let mut tx = state.db.begin().await?;
    let code = store::next_order_code(&mut tx, state.calendar().today(now).year()).await?;
    let mut order = Order::place(code, user.id, draft, now)?;
    let payment = Payment::open(order.id(), &gateway_order.id, amount, Order::CURRENCY, now);
    store::insert_order(&mut tx, &order).await?;
    store::insert_payment(&mut tx, &payment).await?;
    store::save_tracker(&mut tx, &ProgressTracker::new(order.id(), now)).await?;
    tx.commit().await?;

    info!(order_id = %order.id(), order_code = order.order_code(), amount = amount.value(), gateway_order_id = %gateway_order.id, "Order placed");
    state.bus.publish(&order.take_events()).await;
    if setting_on(state, |s| s.new_bookings).await {
        state.notifier.new_order(&order);
    }
    Ok(PlacedOrder {
        key_id: state.gateway.key_id().to_string(),
        gateway_order_id: gateway_order.id,
        amount: gateway_order.amount.value(),
        currency: gateway_order.currency,
        order,
    })
}

/// Admin entry of an order paid outside the gateway.
pub async fn bulk(state: &AppState, draft: OrderDraft) -> Result<Order> {
    let now = Utc::now();
    let mut tx = state.db.begin().await?;
    let code = store::next_order_code(&mut tx, state.calendar().today(now).year()).await?;
    let mut order = Order::bulk(code, draft, now)?;
    let mut tracker = ProgressTracker::new(order.id(), now);
    tracker.confirm_payment(order.created_at(), now);
    store::insert_order(&mut tx, &order).await?;
    store::save_tracker(&mut tx, &tracker).await?;
    tx.commit().await?;

    info!(order_id = %order.id(), order_code = order.order_code(), "Bulk order recorded");
    let mut events = order.take_events();
    events.extend(tracker.take_events());
    state.bus.publish(&events).await;
    Ok(order)
}

pub async fn verify(state: &AppState, user: &AuthUser, order_id: Uuid, proof: CheckoutProof) -> Result<Order> {
    if !state.gateway.verify_payment_signature(&proof.gateway_order_id, &proof.gateway_payment_id, &proof.signature) {
        warn!(%order_id, gateway_order_id = %proof.gateway_order_id, "Payment signature mismatch");
        return Err(NurseryError::bad_request("Invalid payment signature"));
    }
    let now = Utc::now();
    let mut tx = state.db.begin().await?;
    let mut order = store::lock_order(&mut tx, order_id)
        .await?
        .filter(|o| o.user_id() == Some(user.id))
        .ok_or_else(|| NurseryError::not_found("Order"))?;
    let mut payment = store::lock_payment(&mut tx, order_id).await?.ok_or_else(|| NurseryError::not_found("Payment"))?;
    if payment.gateway_order_id() != proof.gateway_order_id {
        return Err(NurseryError::bad_request("Payment does not belong to this order"));
    }
    let (paid, events) = capture(&mut tx, &mut order, &mut payment, &proof.gateway_payment_id, Some(proof.signature.as_str()), now).await?;
    tx.commit().await?;

    state.bus.publish(&events).await;
    if paid {
        info!(%order_id, gateway_payment_id = %proof.gateway_payment_id, "Payment verified");
        after_payment(state, &order).await;
    }
    Ok(order)
}

/// Verifies and applies a gateway webhook. Events that no longer fit the
/// lifecycle are logged and acknowledged so the gateway stops retrying them.
pub async fn handle_webhook(state: &AppState, signature_header: Option<&str>, body: &[u8]) -> Result<()> {
    let Some(secret) = state.config.razorpay_webhook_secret.as_deref() else {
        warn!("Webhook received but RAZORPAY_WEBHOOK_SECRET is not configured");
        return Err(NurseryError::bad_request("Invalid signature"));
    };
    if !signature_header.is_some_and(|sig| signature::verify_hex(secret, body, sig)) {
        warn!(size = body.len(), "Rejected webhook with invalid signature");
        return Err(NurseryError::bad_request("Invalid signature"));
    }
    let event = WebhookEvent::parse(body).map_err(|e| {
        warn!(error = %e, "Malformed webhook payload");
        NurseryError::bad_request("Invalid webhook payload")
    })?;

    let applied = match event {
        WebhookEvent::PaymentCaptured { gateway_order_id, gateway_payment_id } => {
            webhook_captured(state, &gateway_order_id, &gateway_payment_id).await
        }
        WebhookEvent::PaymentFailed { gateway_order_id } => webhook_failed(state, &gateway_order_id).await,
        WebhookEvent::Refund { gateway_refund_id, receipt, outcome, raw } => {
            refunds::settle(state, &gateway_refund_id, receipt.as_deref(), outcome, raw).await
        }
        WebhookEvent::Ignored { event } => {
            debug!(event = %event, "Ignoring webhook event");
            Ok(())
        }
    };
    acknowledge(applied)
}

/// Lifecycle mismatches are acknowledged. Anything else, an unknown refund
/// included, reaches the gateway as an error so it redelivers.
fn acknowledge(applied: Result<()>) -> Result<()> {
    match applied {
        Err(e @ (NurseryError::Order(_) | NurseryError::Payment(_) | NurseryError::Refund(_) | NurseryError::Progress(_))) => {
            warn!(error = %e, "Webhook event does not fit the order lifecycle");
            Ok(())
        }
        other => other,
    }
}

async fn webhook_captured(state: &AppState, gateway_order_id: &str, gateway_payment_id: &str) -> Result<()> {
    let now = Utc::now();
    let mut tx = state.db.begin().await?;
    let Some(mut order) = store::lock_order_by_gateway_order(&mut tx, gateway_order_id).await? else {
        warn!(gateway_order_id, "Captured payment for unknown gateway order");
        return Ok(());
    };
    let mut payment = store::lock_payment(&mut tx, order.id()).await?.ok_or_else(|| NurseryError::not_found("Payment"))?;
    let (paid, events) = capture(&mut tx, &mut order, &mut payment, gateway_payment_id, None, now).await?;
    tx.commit().await?;

    state.bus.publish(&events).await;
    if paid {
        info!(order_id = %order.id(), gateway_payment_id, "Payment captured via webhook");
        after_payment(state, &order).await;
    }
    Ok(())
}

async fn webhook_failed(state: &AppState, gateway_order_id: &str) -> Result<()> {
    let now = Utc::now();
    let mut tx = state.db.begin().await?;
    let Some(order) = store::lock_order_by_gateway_order(&mut tx, gateway_order_id).await? else {
        warn!(gateway_order_id, "Failed payment for unknown gateway order");
        return Ok(());
    };
    let mut payment = store::lock_payment(&mut tx, order.id()).await?.ok_or_else(|| NurseryError::not_found("Payment"))?;
    if !payment.fail(now) {
        debug!(order_id = %order.id(), status = ?payment.status(), "Ignoring late payment failure");
        return Ok(());
    }
    store::update_payment(&mut tx, &payment).await?;
    tx.commit().await?;
    info!(order_id = %order.id(), gateway_order_id, "Payment failed");
    state.bus.publish(&payment.take_events()).await;
    Ok(())
}

/// What a capture changed across the payment, order and tracker.
#[derive(Debug, Default)]
pub struct Capture {
    pub payment_changed: bool,
    pub paid: bool,
    pub confirmed: bool,
    pub events: Vec<DomainEvent>,
}

/// Moves payment, order and tracker together. `paid` is set only when this
/// call moved the order out of PENDING.
pub fn reconcile_capture(
    order: &mut Order,
    payment: &mut Payment,
    tracker: &mut ProgressTracker,
    gateway_payment_id: &str,
    signature: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Capture> {
    let signature_before = payment.gateway_signature().map(str::to_string);
    let captured = payment.capture(gateway_payment_id, signature, now)?;
    let paid = match order.status() {
        OrderStatus::Pending => order.mark_paid(now)?,
        _ => false,
    };
    let confirmed = order.status() == OrderStatus::Paid && tracker.confirm_payment(order.created_at(), now);

    let mut events = order.take_events();
    events.extend(payment.take_events());
    events.extend(tracker.take_events());
    Ok(Capture {
        payment_changed: captured || payment.gateway_signature().map(str::to_string) != signature_before,
        paid,
        confirmed,
        events,
    })
}

async fn capture(
    conn: &mut PgConnection,
    order: &mut Order,
    payment: &mut Payment,
    gateway_payment_id: &str,
    signature: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(bool, Vec<DomainEvent>)> {
    let mut tracker = store::lock_tracker(conn, order.id()).await?.unwrap_or_else(|| ProgressTracker::new(order.id(), order.created_at()));
    let outcome = reconcile_capture(order, payment, &mut tracker, gateway_payment_id, signature, now)?;
    if outcome.payment_changed { store::update_payment(conn, payment).await?; }
    if outcome.paid { store::update_order(conn, order).await?; }
    if outcome.confirmed { store::save_tracker(conn, &tracker).await?; }
    Ok((outcome.paid, outcome.events))
}

async fn after_payment(state: &AppState, order: &Order) {
    state.notifier.order_confirmation(order);
    if setting_on(state, |s| s.payment_confirmations).await {
        state.notifier.new_order(order);
    }
}

/// Reads one notification switch. A failed read counts as off.
async fn setting_on(state: &AppState, pick: impl Fn(&settings::Settings) -> bool) -> bool {
    match settings::load(&state.db).await {
        Ok(s) => pick(&s),
        Err(e) => {
            warn!(error = %e, "Could not read notification settings");
            false
        }
    }
}

const MY_ORDERS_SQL: &str = "SELECT * FROM orders WHERE user_id = $1 AND status <> 'PENDING' ORDER BY created_at DESC";

/// The caller's orders past checkout, newest first.
///
/// Orders that went on to a refund request, a refund or a cancellation stay
/// listed next to paid ones, so customers can follow their refund. Only
/// unpaid checkouts are hidden.
pub async fn mine(state: &AppState, user: &AuthUser) -> Result<Vec<OrderView>> {
    let orders = sqlx::query_as::<_, Order>(MY_ORDERS_SQL)
        .bind(user.id)
        .fetch_all(&state.db)
        .await?;
    store::load_views(&state.db, orders).await
}

pub async fn request_refund(state: &AppState, user: &AuthUser, order_id: Uuid, reason: Option<String>, uploads: &[Upload]) -> Result<Order> {
    if reason.as_deref().is_some_and(|r| r.chars().count() > MAX_REFUND_REASON) {
        return Err(NurseryError::bad_request(format!("Reason must be at most {MAX_REFUND_REASON} characters")));
    }
    let now = Utc::now();
    let mut tx = state.db.begin().await?;
    let mut order = store::lock_order(&mut tx, order_id)
        .await?
        .filter(|o| o.user_id() == Some(user.id))
        .ok_or_else(|| NurseryError::not_found("Order"))?;
    order.check_refund_request()?;
    let images = store_refund_images(state, &order, uploads, now).await?;
    order.request_refund(reason.clone(), images.clone(), now)?;
    store::update_order(&mut tx, &order).await?;
    tx.commit().await?;

    info!(%order_id, images = images.len(), "Refund requested");
    state.bus.publish(&order.take_events()).await;
    state.notifier.refund_request(&order, reason.as_deref(), &images);
    Ok(order)
}

pub fn content_hash(bytes: &[u8]) -> String { hex::encode(Sha256::digest(bytes)) }

/// Uploads new images. One already attached to the order keeps its URL,
/// and duplicates within the same request collapse to one.
async fn store_refund_images(state: &AppState, order: &Order, uploads: &[Upload], now: DateTime<Utc>) -> Result<Vec<RefundImage>> {
    let known = order.refund_images();
    let mut images: Vec<RefundImage> = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let hash = content_hash(&upload.bytes);
        if images.iter().any(|i| i.hash == hash) { continue; }
        if let Some(existing) = known.iter().find(|i| i.hash == hash) {
            images.push(existing.clone());
            continue;
        }
        let key = format!("refunds/{}/{}-{}.{}", order.id(), now.timestamp_millis(), Uuid::new_v4(), extension_of(upload.file_name.as_deref()));
        let url = state.blobs.put(&key, &upload.bytes).await?;
        images.push(RefundImage { url, hash });
    }
    Ok(images)
}

pub async fn advance_progress(state: &AppState, order_id: Uuid, target: &str) -> Result<ProgressTracker> {
    let target = StageType::parse(target).ok_or_else(|| NurseryError::bad_request("Invalid status value"))?;
    let now = Utc::now();
    let mut tx = state.db.begin().await?;
    let order = store::lock_order(&mut tx, order_id).await?.ok_or_else(|| NurseryError::not_found("Order"))?;
    if order.status() != OrderStatus::Paid {
        return Err(NurseryError::bad_request("Progress can only be updated for paid orders"));
    }
    let mut tracker = store::lock_tracker(&mut tx, order_id).await?.ok_or_else(|| NurseryError::not_found("Progress tracker"))?;
    tracker.advance_to(target, now)?;
    store::save_tracker(&mut tx, &tracker).await?;
    tx.commit().await?;

    info!(%order_id, stage = target.as_str(), progress = tracker.progress_percentage(), "Progress updated");
    state.bus.publish(&tracker.take_events()).await;
    Ok(tracker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::tests::placed;
    use crate::domain::aggregates::{PaymentStatus, StageStatus};
    use crate::domain::events::OrderEvent;

    fn checkout() -> (Order, Payment, ProgressTracker) {
        let mut order = placed();
        order.take_events();
        let payment = Payment::open(order.id(), "order_gw_1", order.total(), Order::CURRENCY, order.created_at());
        let tracker = ProgressTracker::new(order.id(), order.created_at());
        (order, payment, tracker)
    }

    #[test]
    fn test_capture_pays_order_and_confirms_tracker() {
        let (mut order, mut payment, mut tracker) = checkout();
        let outcome = reconcile_capture(&mut order, &mut payment, &mut tracker, "pay_1", Some("sig"), Utc::now()).unwrap();
        assert!(outcome.paid && outcome.confirmed && outcome.payment_changed);
        assert_eq!(order.status(), OrderStatus::Paid);
        assert_eq!(payment.status(), PaymentStatus::Captured);
        assert_eq!(payment.gateway_payment_id(), Some("pay_1"));
        assert_eq!(tracker.progress_percentage(), 20);
        assert_eq!(tracker.current_stage(), Some(StageType::NurseryAllocation));
        assert_eq!(tracker.stage(StageType::OrderConfirmed).map(|s| s.status), Some(StageStatus::Completed));
        assert!(outcome.events.iter().any(|e| matches!(e, DomainEvent::Order(OrderEvent::Paid { .. }))));
    }

    #[test]
    fn test_late_capture_after_failure_still_pays() {
        let (mut order, mut payment, mut tracker) = checkout();
        assert!(payment.fail(Utc::now()));
        payment.take_events();
        let outcome = reconcile_capture(&mut order, &mut payment, &mut tracker, "pay_2", None, Utc::now()).unwrap();
        assert!(outcome.paid);
        assert_eq!(payment.status(), PaymentStatus::Captured);
        assert_eq!(order.status(), OrderStatus::Paid);
        assert_eq!(tracker.progress_percentage(), 20);
    }

    #[test]
    fn test_repeated_capture_changes_nothing() {
        let (mut order, mut payment, mut tracker) = checkout();
        reconcile_capture(&mut order, &mut payment, &mut tracker, "pay_1", Some("sig"), Utc::now()).unwrap();
        let again = reconcile_capture(&mut order, &mut payment, &mut tracker, "pay_1", None, Utc::now()).unwrap();
        assert!(!again.paid && !again.confirmed && !again.payment_changed);
        assert!(again.events.is_empty());
    }

    #[test]
    fn test_unknown_refund_is_not_acknowledged() {
        assert!(matches!(acknowledge(Err(NurseryError::not_found("Refund"))), Err(NurseryError::NotFound(_))));
        let stale = crate::domain::aggregates::RefundError::AlreadyExists(crate::domain::aggregates::RefundStatus::Success);
        assert!(acknowledge(Err(stale.into())).is_ok());
        assert!(acknowledge(Ok(())).is_ok());
    }

    #[test]
    fn test_my_orders_hide_only_unpaid_checkouts() {
        assert!(MY_ORDERS_SQL.contains("status <> 'PENDING'"));
        assert!(!MY_ORDERS_SQL.contains("status = 'PAID'"));
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(content_hash(b"abc"), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert_ne!(content_hash(b"leaf-1"), content_hash(b"leaf-2"));
    }
}
