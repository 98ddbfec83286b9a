//! Admin refund decisions and gateway settlement.
//!
//! Approval runs in two steps. The attempt is first recorded as `INITIATED`
//! under an idempotency key, then the gateway is called with no row locks
//! held. Its answer is written back in a second transaction. A webhook that
//! beats that write finds the attempt through the key, sent as the receipt.
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;
use crate::domain::aggregates::{Order, Payment, Refund, RefundError, RefundOutcome};
use crate::domain::events::DomainEvent;
use crate::http::AppState;
use crate::store::orders as store;
use crate::{NurseryError, Result};

pub const REFUND_NOTE: &str = "Full refund requested";

/// A refund attempt ready to be sent to the gateway.
#[derive(Debug)]
pub struct Approval {
    pub payment_id: String,
    pub refund: Refund,
    pub retrying: bool,
}

/// Decides whether an order's refund may be (re)approved and prepares the attempt.
pub fn plan_approval(order: &mut Order, payment: Option<&Payment>, existing: Option<Refund>, now: DateTime<Utc>) -> Result<Approval> {
    let payment_id = payment
        .and_then(|p| p.refundable_payment_id())
        .map(str::to_string)
        .ok_or_else(|| NurseryError::bad_request("No captured payment found for this order"))?;
    let retrying = match &existing {
        None => false,
        Some(r) if r.can_restart(now) => true,
        Some(r) => return Err(RefundError::AlreadyExists(r.status()).into()),
    };
    order.approve_refund(retrying, now)?;
    let refund = match existing {
        Some(mut refund) => {
            refund.restart(order.total(), now)?;
            refund
        }
        None => Refund::initiate(order.id(), order.total(), now),
    };
    Ok(Approval { payment_id, refund, retrying })
}

/// What a refund webhook changed, so callers persist only that.
#[derive(Debug, Default)]
pub struct Settlement {
    pub refund_changed: bool,
    pub order_changed: bool,
    pub payment_changed: bool,
    pub events: Vec<DomainEvent>,
}

/// Applies a refund outcome to the attempt, and on success to the order and payment.
pub fn reconcile_refund(
    order: &mut Order,
    payment: Option<&mut Payment>,
    refund: &mut Refund,
    gateway_refund_id: &str,
    outcome: RefundOutcome,
    raw: serde_json::Value,
    now: DateTime<Utc>,
) -> Result<Settlement> {
    let processed = outcome == RefundOutcome::Processed;
    let mut settlement = Settlement::default();
    if !refund.apply(outcome, gateway_refund_id, raw, now) {
        return Ok(settlement);
    }
    settlement.refund_changed = true;
    settlement.events = refund.take_events();
    if processed {
        settlement.order_changed = order.complete_refund(now)?;
        settlement.events.extend(order.take_events());
        if let Some(payment) = payment {
            settlement.payment_changed = payment.mark_refunded(now)?;
        }
    }
    Ok(settlement)
}

/// Approves a pending request and asks the gateway to refund the full amount.
/// A request whose earlier attempt failed, or was never answered, may be approved again.
pub async fn approve(state: &AppState, order_id: Uuid) -> Result<(Order, Refund)> {
    let now = Utc::now();
    let mut tx = state.db.begin().await?;
    let mut order = store::lock_order(&mut tx, order_id).await?.ok_or_else(|| NurseryError::not_found("Order"))?;
    let payment = store::lock_payment(&mut tx, order_id).await?;
    let existing = store::lock_refund(&mut tx, order_id).await?;
    let Approval { payment_id, refund, retrying } = plan_approval(&mut order, payment.as_ref(), existing, now)?;
    store::update_order(&mut tx, &order).await?;
    store::save_refund(&mut tx, &refund).await?;
    tx.commit().await?;
    state.bus.publish(&order.take_events()).await;

    let key = refund.idempotency_key().to_string();
    info!(%order_id, idempotency_key = %key, retrying, "Refund initiated");
    let answer = state.gateway.refund(&payment_id, refund.amount(), REFUND_NOTE, &key).await;

    let mut tx = state.db.begin().await?;
    let Some(mut refund) = store::lock_refund(&mut tx, order_id).await?.filter(|r| r.idempotency_key() == key) else {
        warn!(%order_id, idempotency_key = %key, "Refund attempt replaced while the gateway was called");
        return Err(NurseryError::Conflict("Refund attempt was replaced".into()));
    };
    match answer {
        Ok(gateway_refund) => {
            if refund.accept(&gateway_refund.id, gateway_refund.amount, gateway_refund.raw, Utc::now()) {
                store::save_refund(&mut tx, &refund).await?;
            }
            tx.commit().await?;
            info!(%order_id, gateway_refund_id = %gateway_refund.id, amount = refund.amount().value(), retrying, "Refund approved");
            state.bus.publish(&refund.take_events()).await;
            Ok((order, refund))
        }
        Err(e) => {
            error!(%order_id, idempotency_key = %key, error = %e, "Gateway refund failed");
            if e.is_rejection() && refund.reject(e.to_string(), Utc::now()) {
                store::save_refund(&mut tx, &refund).await?;
                tx.commit().await?;
                state.bus.publish(&refund.take_events()).await;
            }
            Err(NurseryError::bad_request(format!("Refund failed: {e}")))
        }
    }
}

pub async fn decline(state: &AppState, order_id: Uuid) -> Result<Order> {
    let now = Utc::now();
    let mut tx = state.db.begin().await?;
    let mut order = store::lock_order(&mut tx, order_id).await?.ok_or_else(|| NurseryError::not_found("Order"))?;
    order.decline_refund(now)?;
    store::update_order(&mut tx, &order).await?;
    tx.commit().await?;

    info!(%order_id, "Refund declined");
    state.bus.publish(&order.take_events()).await;
    Ok(order)
}

/// Applies a refund webhook. An unknown refund is an error so the gateway redelivers it.
pub async fn settle(state: &AppState, gateway_refund_id: &str, receipt: Option<&str>, outcome: RefundOutcome, raw: serde_json::Value) -> Result<()> {
    let now = Utc::now();
    let mut tx = state.db.begin().await?;
    let Some(order_id) = store::order_id_for_refund(&mut tx, gateway_refund_id, receipt).await? else {
        warn!(gateway_refund_id, receipt, "Refund webhook for unknown refund");
        return Err(NurseryError::not_found("Refund"));
    };
    let mut order = store::lock_order(&mut tx, order_id).await?.ok_or_else(|| NurseryError::not_found("Order"))?;
    let mut payment = store::lock_payment(&mut tx, order_id).await?;
    let Some(mut refund) = store::lock_refund(&mut tx, order_id).await?.filter(|r| r.matches(gateway_refund_id, receipt)) else {
        warn!(%order_id, gateway_refund_id, "Refund was replaced by a newer attempt");
        return Ok(());
    };
    let settlement = reconcile_refund(&mut order, payment.as_mut(), &mut refund, gateway_refund_id, outcome, raw, now)?;
    if !settlement.refund_changed {
        info!(%order_id, gateway_refund_id, status = ?refund.status(), "Refund already settled");
        return Ok(());
    }
    store::save_refund(&mut tx, &refund).await?;
    if settlement.order_changed {
        store::update_order(&mut tx, &order).await?;
    }
    if let (true, Some(payment)) = (settlement.payment_changed, &payment) {
        store::update_payment(&mut tx, payment).await?;
    }
    tx.commit().await?;

    match refund.failure_reason() {
        Some(reason) => warn!(%order_id, gateway_refund_id, reason, "Refund failed at gateway"),
        None => info!(%order_id, gateway_refund_id, "Refund processed"),
    }
    state.bus.publish(&settlement.events).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::domain::aggregates::order::tests::paid;
    use crate::domain::aggregates::{OrderRefundStatus, OrderStatus, PaymentStatus, RefundStatus};
    use crate::domain::events::PaymentEvent;

    fn requested() -> (Order, Payment) {
        let now = Utc::now();
        let mut order = paid();
        order.request_refund(Some("Plants arrived dry".into()), vec![], now).unwrap();
        order.take_events();
        let mut payment = Payment::open(order.id(), "order_gw_1", order.total(), "INR", now);
        payment.capture("pay_1", None, now).unwrap();
        payment.take_events();
        (order, payment)
    }

    fn accepted(order: &mut Order, payment: &Payment) -> Refund {
        let mut approval = plan_approval(order, Some(payment), None, Utc::now()).unwrap();
        assert!(approval.refund.accept("rfnd_1", order.total(), json!({"id": "rfnd_1"}), Utc::now()));
        approval.refund
    }

    #[test]
    fn test_fresh_approval_initiates_full_refund() {
        let (mut order, payment) = requested();
        let approval = plan_approval(&mut order, Some(&payment), None, Utc::now()).unwrap();
        assert_eq!(approval.payment_id, "pay_1");
        assert!(!approval.retrying);
        assert_eq!(approval.refund.status(), RefundStatus::Initiated);
        assert_eq!(approval.refund.amount(), order.total());
        assert_eq!(approval.refund.order_id(), order.id());
        assert_eq!(order.refund_status(), Some(OrderRefundStatus::Approved));
    }

    #[test]
    fn test_approval_needs_captured_payment() {
        let (mut order, _) = requested();
        let pending = Payment::open(order.id(), "order_gw_1", order.total(), "INR", Utc::now());
        assert!(matches!(plan_approval(&mut order, Some(&pending), None, Utc::now()), Err(NurseryError::BadRequest(_))));
        assert!(matches!(plan_approval(&mut order, None, None, Utc::now()), Err(NurseryError::BadRequest(_))));
        assert_eq!(order.refund_status(), Some(OrderRefundStatus::Pending));
    }

    #[test]
    fn test_open_attempt_blocks_second_approval() {
        let (mut order, payment) = requested();
        let refund = accepted(&mut order, &payment);
        let err = plan_approval(&mut order, Some(&payment), Some(refund), Utc::now()).unwrap_err();
        assert!(matches!(err, NurseryError::Refund(RefundError::AlreadyExists(RefundStatus::Processing))));
    }

    #[test]
    fn test_processed_refund_settles_order_and_payment() {
        let (mut order, mut payment) = requested();
        let mut refund = accepted(&mut order, &payment);
        order.take_events();
        let settlement = reconcile_refund(&mut order, Some(&mut payment), &mut refund, "rfnd_1", RefundOutcome::Processed, json!({}), Utc::now()).unwrap();
        assert!(settlement.refund_changed && settlement.order_changed && settlement.payment_changed);
        assert_eq!(order.status(), OrderStatus::Refunded);
        assert_eq!(payment.status(), PaymentStatus::Refunded);
        assert_eq!(refund.status(), RefundStatus::Success);
        assert!(settlement.events.iter().any(|e| matches!(e, DomainEvent::Payment(PaymentEvent::RefundSettled { .. }))));

        let again = reconcile_refund(&mut order, Some(&mut payment), &mut refund, "rfnd_1", RefundOutcome::Processed, json!({}), Utc::now()).unwrap();
        assert!(!again.refund_changed && again.events.is_empty());
    }

    #[test]
    fn test_failed_refund_leaves_order_open_for_retry() {
        let (mut order, mut payment) = requested();
        let mut refund = accepted(&mut order, &payment);
        let failed = RefundOutcome::Failed { reason: "Beneficiary bank offline".into() };
        let settlement = reconcile_refund(&mut order, Some(&mut payment), &mut refund, "rfnd_1", failed, json!({}), Utc::now()).unwrap();
        assert!(settlement.refund_changed && !settlement.order_changed && !settlement.payment_changed);
        assert_eq!(order.status(), OrderStatus::RefundRequested);
        assert_eq!(order.refund_status(), Some(OrderRefundStatus::Approved));
        assert_eq!(payment.status(), PaymentStatus::Captured);

        let first_key = refund.idempotency_key().to_string();
        let retry = plan_approval(&mut order, Some(&payment), Some(refund), Utc::now()).unwrap();
        assert!(retry.retrying);
        assert_eq!(retry.refund.status(), RefundStatus::Initiated);
        assert_ne!(retry.refund.idempotency_key(), first_key);
    }

    #[test]
    fn test_webhook_before_gateway_answer_settles_initiated_attempt() {
        let (mut order, mut payment) = requested();
        let mut refund = plan_approval(&mut order, Some(&payment), None, Utc::now()).unwrap().refund;
        let settlement = reconcile_refund(&mut order, Some(&mut payment), &mut refund, "rfnd_7", RefundOutcome::Processed, json!({}), Utc::now()).unwrap();
        assert!(settlement.order_changed);
        assert_eq!(refund.gateway_refund_id(), Some("rfnd_7"));
        assert!(!refund.accept("rfnd_7", order.total(), json!({}), Utc::now()));
    }
}
