//! Domain events
use crate::domain::aggregates::StageType;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Payment(PaymentEvent),
    Progress(ProgressEvent),
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(_) => "nursery.orders",
            Self::Payment(_) => "nursery.payments",
            Self::Progress(_) => "nursery.progress",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, order_code: String, bulk: bool },
    Paid { order_id: Uuid },
    RefundRequested { order_id: Uuid },
    RefundApproved { order_id: Uuid },
    RefundDeclined { order_id: Uuid },
    Refunded { order_id: Uuid },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PaymentEvent {
    Captured { order_id: Uuid, gateway_payment_id: String },
    Failed { order_id: Uuid },
    RefundSettled { order_id: Uuid, gateway_refund_id: String },
    RefundFailed { order_id: Uuid, gateway_refund_id: String, reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    StageReached { order_id: Uuid, stage: StageType, progress: i32 },
}
