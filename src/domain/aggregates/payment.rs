//! Payment Aggregate
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, PaymentEvent};
use crate::domain::value_objects::Paise;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus { Created, Captured, Failed, Refunded }

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [Self::Created, Self::Captured, Self::Failed, Self::Refunded];
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    id: Uuid,
    order_id: Uuid,
    provider: String,
    gateway_order_id: String,
    gateway_payment_id: Option<String>,
    gateway_signature: Option<String>,
    amount_paise: i64,
    currency: String,
    status: PaymentStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Payment {
    pub const PROVIDER: &'static str = "razorpay";

    pub fn open(order_id: Uuid, gateway_order_id: impl Into<String>, amount: Paise, currency: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(), order_id, provider: Self::PROVIDER.to_string(), gateway_order_id: gateway_order_id.into(),
            gateway_payment_id: None, gateway_signature: None, amount_paise: amount.value(), currency: currency.to_string(),
            status: PaymentStatus::Created, created_at: now, updated_at: now, events: vec![],
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_id(&self) -> Uuid { self.order_id }
    pub fn provider(&self) -> &str { &self.provider }
    pub fn gateway_order_id(&self) -> &str { &self.gateway_order_id }
    pub fn gateway_payment_id(&self) -> Option<&str> { self.gateway_payment_id.as_deref() }
    pub fn gateway_signature(&self) -> Option<&str> { self.gateway_signature.as_deref() }
    pub fn amount(&self) -> Paise { Paise::new(self.amount_paise) }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn status(&self) -> PaymentStatus { self.status }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Gateway payment id usable for a refund, if the money was captured.
    pub fn refundable_payment_id(&self) -> Option<&str> {
        if self.status == PaymentStatus::Captured { self.gateway_payment_id.as_deref() } else { None }
    }

    /// Records the gateway's capture. A late capture after a failure is accepted.
    /// Returns `false` when the payment was already captured.
    pub fn capture(&mut self, payment_id: &str, signature: Option<&str>, now: DateTime<Utc>) -> Result<bool, PaymentError> {
        match self.status {
            PaymentStatus::Created | PaymentStatus::Failed => {
                self.status = PaymentStatus::Captured;
                self.gateway_payment_id = Some(payment_id.to_string());
                if let Some(signature) = signature { self.gateway_signature = Some(signature.to_string()); }
                self.touch(now);
                self.events.push(DomainEvent::Payment(PaymentEvent::Captured {
                    order_id: self.order_id, gateway_payment_id: payment_id.to_string(),
                }));
                Ok(true)
            }
            PaymentStatus::Captured => {
                if self.gateway_signature.is_none() {
                    self.gateway_signature = signature.map(str::to_string);
                }
                Ok(false)
            }
            from => Err(PaymentError::InvalidTransition { from, action: "capture" }),
        }
    }

    /// Returns `false` when the failure arrived after the payment was already settled.
    pub fn fail(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != PaymentStatus::Created { return false; }
        self.status = PaymentStatus::Failed;
        self.touch(now);
        self.events.push(DomainEvent::Payment(PaymentEvent::Failed { order_id: self.order_id }));
        true
    }

    pub fn mark_refunded(&mut self, now: DateTime<Utc>) -> Result<bool, PaymentError> {
        match self.status {
            PaymentStatus::Captured => {
                self.status = PaymentStatus::Refunded;
                self.touch(now);
                Ok(true)
            }
            PaymentStatus::Refunded => Ok(false),
            from => Err(PaymentError::InvalidTransition { from, action: "refund" }),
        }
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn touch(&mut self, now: DateTime<Utc>) { self.updated_at = now; }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("cannot {action} a payment that is {from:?}")]
    InvalidTransition { from: PaymentStatus, action: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Payment {
        Payment::open(Uuid::new_v4(), "order_Nx1", Paise::new(50_000), "INR", Utc::now())
    }

    #[test]
    fn test_capture_once() {
        let mut payment = open();
        assert!(payment.capture("pay_1", Some("sig"), Utc::now()).unwrap());
        assert!(!payment.capture("pay_1", None, Utc::now()).unwrap());
        assert_eq!(payment.status(), PaymentStatus::Captured);
        assert_eq!(payment.refundable_payment_id(), Some("pay_1"));
        assert_eq!(payment.gateway_signature(), Some("sig"));
        assert_eq!(payment.take_events().len(), 1);
    }

    #[test]
    fn test_webhook_capture_keeps_later_signature() {
        let mut payment = open();
        payment.capture("pay_1", None, Utc::now()).unwrap();
        payment.capture("pay_1", Some("sig"), Utc::now()).unwrap();
        assert_eq!(payment.gateway_signature(), Some("sig"));
    }

    #[test]
    fn test_failure_does_not_override_capture() {
        let mut payment = open();
        payment.capture("pay_1", None, Utc::now()).unwrap();
        assert!(!payment.fail(Utc::now()));
        assert_eq!(payment.status(), PaymentStatus::Captured);
    }

    #[test]
    fn test_late_capture_after_failure() {
        let mut payment = open();
        assert!(payment.fail(Utc::now()));
        assert_eq!(payment.refundable_payment_id(), None);
        assert!(payment.capture("pay_2", None, Utc::now()).unwrap());
    }

    #[test]
    fn test_refund_requires_capture() {
        let mut payment = open();
        assert!(payment.mark_refunded(Utc::now()).is_err());
        payment.capture("pay_1", None, Utc::now()).unwrap();
        assert!(payment.mark_refunded(Utc::now()).unwrap());
        assert!(!payment.mark_refunded(Utc::now()).unwrap());
        assert!(payment.capture("pay_1", None, Utc::now()).is_err());
    }
}
