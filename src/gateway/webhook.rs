//! Razorpay webhook envelope.
use serde::Deserialize;
use crate::domain::aggregates::RefundOutcome;

#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<Entity<PaymentEntity>>,
    pub refund: Option<Entity<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
pub struct Entity<T> { pub entity: T }

#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub order_id: Option<String>,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub status: String,
}

/// The part of a webhook the order lifecycle acts on.
#[derive(Debug, PartialEq)]
pub enum WebhookEvent {
    PaymentCaptured { gateway_order_id: String, gateway_payment_id: String },
    PaymentFailed { gateway_order_id: String },
    Refund { gateway_refund_id: String, receipt: Option<String>, outcome: RefundOutcome, raw: serde_json::Value },
    Ignored { event: String },
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let envelope: WebhookEnvelope = serde_json::from_slice(body)?;
        Ok(Self::from_envelope(envelope))
    }

    pub fn from_envelope(envelope: WebhookEnvelope) -> Self {
        let WebhookEnvelope { event, payload } = envelope;
        match event.as_str() {
            "payment.captured" | "payment.failed" => {
                let Some(Entity { entity: payment }) = payload.payment else { return Self::Ignored { event } };
                let Some(gateway_order_id) = payment.order_id else { return Self::Ignored { event } };
                if event == "payment.captured" {
                    Self::PaymentCaptured { gateway_order_id, gateway_payment_id: payment.id }
                } else {
                    Self::PaymentFailed { gateway_order_id }
                }
            }
            "refund.processed" | "refund.failed" => {
                let Some(Entity { entity: raw }) = payload.refund else { return Self::Ignored { event } };
                let Some(gateway_refund_id) = raw.get("id").and_then(|v| v.as_str()).map(str::to_string) else {
                    return Self::Ignored { event };
                };
                let receipt = raw.get("receipt").and_then(|v| v.as_str()).map(str::to_string);
                let reason = raw.get("failure_reason").and_then(|v| v.as_str());
                match RefundOutcome::from_event(&event, reason) {
                    Some(outcome) => Self::Refund { gateway_refund_id, receipt, outcome, raw },
                    None => Self::Ignored { event },
                }
            }
            _ => Self::Ignored { event },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> WebhookEvent {
        WebhookEvent::parse(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_payment_captured() {
        let event = parse(json!({
            "entity": "event",
            "event": "payment.captured",
            "payload": { "payment": { "entity": { "id": "pay_Q9", "order_id": "order_Nx1", "amount": 50000, "status": "captured" } } }
        }));
        assert_eq!(event, WebhookEvent::PaymentCaptured { gateway_order_id: "order_Nx1".into(), gateway_payment_id: "pay_Q9".into() });
    }

    #[test]
    fn test_payment_without_order_is_ignored() {
        let event = parse(json!({
            "event": "payment.failed",
            "payload": { "payment": { "entity": { "id": "pay_Q9", "order_id": null } } }
        }));
        assert!(matches!(event, WebhookEvent::Ignored { .. }));
    }

    #[test]
    fn test_refund_failed_defaults_reason() {
        let event = parse(json!({
            "event": "refund.failed",
            "payload": { "refund": { "entity": { "id": "rfnd_7", "payment_id": "pay_Q9", "amount": 50000 } } }
        }));
        match event {
            WebhookEvent::Refund { gateway_refund_id, receipt, outcome, raw } => {
                assert_eq!(gateway_refund_id, "rfnd_7");
                assert_eq!(receipt, None);
                assert_eq!(outcome, RefundOutcome::Failed { reason: "Unknown".into() });
                assert_eq!(raw["amount"], 50000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_refund_processed_carries_receipt() {
        let event = parse(json!({
            "event": "refund.processed",
            "payload": { "refund": { "entity": { "id": "rfnd_8", "receipt": "rfnd_0a1b", "amount": 50000 } } }
        }));
        assert!(matches!(
            event,
            WebhookEvent::Refund { ref gateway_refund_id, receipt: Some(ref r), outcome: RefundOutcome::Processed, .. }
                if gateway_refund_id == "rfnd_8" && r == "rfnd_0a1b"
        ));
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        assert_eq!(parse(json!({ "event": "order.paid", "payload": {} })), WebhookEvent::Ignored { event: "order.paid".into() });
    }

    #[test]
    fn test_malformed_body_is_error() {
        assert!(WebhookEvent::parse(b"not json").is_err());
    }
}
