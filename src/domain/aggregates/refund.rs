//! Gateway refund record
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, PaymentEvent};
use crate::domain::value_objects::Paise;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "refund_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus { Initiated, Processing, Success, Failed }

impl RefundStatus {
    pub const ALL: [RefundStatus; 4] = [Self::Initiated, Self::Processing, Self::Success, Self::Failed];

    /// Still waiting on the gateway.
    pub fn is_open(&self) -> bool { matches!(self, Self::Initiated | Self::Processing) }
}

/// What a refund webhook tells us about a refund.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefundOutcome {
    Processed,
    Failed { reason: String },
}

impl RefundOutcome {
    pub const DEFAULT_FAILURE_REASON: &'static str = "Unknown";

    pub fn from_event(event: &str, failure_reason: Option<&str>) -> Option<Self> {
        match event {
            "refund.processed" => Some(Self::Processed),
            "refund.failed" => Some(Self::Failed {
                reason: failure_reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or(Self::DEFAULT_FAILURE_REASON)
                    .to_string(),
            }),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    id: Uuid,
    order_id: Uuid,
    gateway_refund_id: Option<String>,
    idempotency_key: String,
    amount_paise: i64,
    status: RefundStatus,
    processed_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Refund {
    pub const STALE_ATTEMPT: Duration = Duration::minutes(30);

    /// An attempt recorded before the gateway is asked. The idempotency key
    /// travels as the gateway receipt so a refund webhook can find this row
    /// even when the gateway id was never stored.
    pub fn initiate(order_id: Uuid, amount: Paise, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(), order_id, gateway_refund_id: None, idempotency_key: new_key(), amount_paise: amount.value(),
            status: RefundStatus::Initiated, processed_at: None, failed_at: None, failure_reason: None,
            metadata: serde_json::json!({}), created_at: now, updated_at: now, events: vec![],
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_id(&self) -> Uuid { self.order_id }
    pub fn gateway_refund_id(&self) -> Option<&str> { self.gateway_refund_id.as_deref() }
    pub fn idempotency_key(&self) -> &str { &self.idempotency_key }
    pub fn amount(&self) -> Paise { Paise::new(self.amount_paise) }
    pub fn status(&self) -> RefundStatus { self.status }
    pub fn failure_reason(&self) -> Option<&str> { self.failure_reason.as_deref() }
    pub fn processed_at(&self) -> Option<DateTime<Utc>> { self.processed_at }
    pub fn failed_at(&self) -> Option<DateTime<Utc>> { self.failed_at }
    pub fn metadata(&self) -> &serde_json::Value { &self.metadata }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Gateway id when known, otherwise the idempotency key.
    pub fn reference(&self) -> &str { self.gateway_refund_id.as_deref().unwrap_or(&self.idempotency_key) }

    /// Whether a webhook about `gateway_refund_id` (carrying `receipt`) is about this attempt.
    pub fn matches(&self, gateway_refund_id: &str, receipt: Option<&str>) -> bool {
        self.gateway_refund_id.as_deref() == Some(gateway_refund_id) || receipt == Some(self.idempotency_key.as_str())
    }

    /// Failed attempts, and attempts the gateway never answered for a while, may be replaced.
    pub fn can_restart(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            RefundStatus::Failed => true,
            RefundStatus::Initiated => now - self.updated_at >= Self::STALE_ATTEMPT,
            _ => false,
        }
    }

    /// Starts a fresh attempt under a new idempotency key.
    pub fn restart(&mut self, amount: Paise, now: DateTime<Utc>) -> Result<(), RefundError> {
        if !self.can_restart(now) { return Err(RefundError::AlreadyExists(self.status)); }
        self.gateway_refund_id = None;
        self.idempotency_key = new_key();
        self.amount_paise = amount.value();
        self.status = RefundStatus::Initiated;
        self.processed_at = None;
        self.failed_at = None;
        self.failure_reason = None;
        self.metadata = serde_json::json!({});
        self.updated_at = now;
        Ok(())
    }

    /// The gateway accepted the attempt. Returns `false` when a webhook settled it first.
    pub fn accept(&mut self, gateway_refund_id: impl Into<String>, amount: Paise, raw: serde_json::Value, now: DateTime<Utc>) -> bool {
        if self.status != RefundStatus::Initiated { return false; }
        self.gateway_refund_id = Some(gateway_refund_id.into());
        self.amount_paise = amount.value();
        self.status = RefundStatus::Processing;
        self.metadata = raw;
        self.updated_at = now;
        true
    }

    /// The gateway refused the attempt outright.
    pub fn reject(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> bool {
        if self.status != RefundStatus::Initiated { return false; }
        self.fail(reason.into(), now);
        true
    }

    /// Applies a webhook outcome. Returns `false` when the refund had already settled.
    pub fn apply(&mut self, outcome: RefundOutcome, gateway_refund_id: &str, raw: serde_json::Value, now: DateTime<Utc>) -> bool {
        if !self.status.is_open() { return false; }
        if self.gateway_refund_id.is_none() { self.gateway_refund_id = Some(gateway_refund_id.to_string()); }
        match outcome {
            RefundOutcome::Processed => {
                self.status = RefundStatus::Success;
                self.processed_at = Some(now);
                self.events.push(DomainEvent::Payment(PaymentEvent::RefundSettled {
                    order_id: self.order_id, gateway_refund_id: gateway_refund_id.to_string(),
                }));
            }
            RefundOutcome::Failed { reason } => self.fail(reason, now),
        }
        self.metadata = raw;
        self.updated_at = now;
        true
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }

    fn fail(&mut self, reason: String, now: DateTime<Utc>) {
        self.status = RefundStatus::Failed;
        self.failed_at = Some(now);
        self.failure_reason = Some(reason.clone());
        self.updated_at = now;
        self.events.push(DomainEvent::Payment(PaymentEvent::RefundFailed {
            order_id: self.order_id, gateway_refund_id: self.reference().to_string(), reason,
        }));
    }
}

fn new_key() -> String { format!("rfnd_{}", Uuid::new_v4().simple()) }

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefundError {
    #[error("Refund already processed for this order ({0:?})")]
    AlreadyExists(RefundStatus),
}
