//! Order Aggregate
//!
//! Order status moves `PENDING → PAID → REFUND_REQUESTED → REFUNDED | CANCELLED`.
//! The refund tracking status (`PENDING → APPROVED | CANCELLED`) records the
//! admin's decision on a refund request and is independent of the gateway
//! refund record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{MoneyError, OrderCode, Paise};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus { Pending, Paid, RefundRequested, Refunded, Cancelled }

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [Self::Pending, Self::Paid, Self::RefundRequested, Self::Refunded, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::RefundRequested => "REFUND_REQUESTED",
            Self::Refunded => "REFUNDED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_refund_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderRefundStatus { Pending, Approved, Cancelled }

impl OrderRefundStatus {
    pub const ALL: [OrderRefundStatus; 3] = [Self::Pending, Self::Approved, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "PENDING", Self::Approved => "APPROVED", Self::Cancelled => "CANCELLED" }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod { Upi, Card, NetBanking, Wallet, Cod }

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [Self::Upi, Self::Card, Self::NetBanking, Self::Wallet, Self::Cod];
}

/// Everything a customer (or admin, for bulk orders) supplies when placing an order.
#[derive(Clone, Debug)]
pub struct OrderDraft {
    pub product_id: Option<i32>,
    pub product_name: Option<String>,
    pub delivery_date: NaiveDate,
    pub delivery_location: Option<String>,
    pub quantity: u32,
    pub price_per_unit: Paise,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub whatsapp: Option<String>,
    pub delivery_address: String,
    pub state: String,
    pub district: String,
    pub pincode: String,
    pub area_name: String,
    pub payment_method: Option<PaymentMethod>,
    pub terms_accepted: bool,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundImage { pub url: String, pub hash: String }

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefundRequestMeta {
    reason: Option<String>,
    images: Vec<RefundImage>,
    requested_at: DateTime<Utc>,
}

const REFUND_REQUEST_KEY: &str = "refundRequest";

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: Uuid,
    order_code: String,
    user_id: Option<Uuid>,
    product_id: Option<i32>,
    product_name: Option<String>,
    delivery_date: NaiveDate,
    delivery_location: Option<String>,
    quantity: i32,
    price_per_unit_paise: i64,
    total_amount_paise: i64,
    currency: String,
    full_name: String,
    email: String,
    phone: String,
    whatsapp: Option<String>,
    delivery_address: String,
    state: String,
    district: String,
    pincode: String,
    area_name: String,
    payment_method: Option<PaymentMethod>,
    terms_accepted: bool,
    status: OrderStatus,
    refund_status: Option<OrderRefundStatus>,
    refund_request_date: Option<DateTime<Utc>>,
    is_bulk_upload: bool,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Order {
    pub const CURRENCY: &'static str = "INR";

    /// A customer order awaiting payment.
    pub fn place(code: OrderCode, user_id: Uuid, draft: OrderDraft, now: DateTime<Utc>) -> Result<Self, OrderError> {
        Self::from_draft(code, Some(user_id), draft, OrderStatus::Pending, false, now)
    }

    /// An order entered by an admin and paid offline.
    pub fn bulk(code: OrderCode, draft: OrderDraft, now: DateTime<Utc>) -> Result<Self, OrderError> {
        Self::from_draft(code, None, draft, OrderStatus::Paid, true, now)
    }

    fn from_draft(code: OrderCode, user_id: Option<Uuid>, draft: OrderDraft, status: OrderStatus, bulk: bool, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if draft.quantity == 0 { return Err(OrderError::InvalidQuantity); }
        let quantity = i32::try_from(draft.quantity).map_err(|_| OrderError::InvalidQuantity)?;
        let total = draft.price_per_unit.times(draft.quantity)?;
        let id = Uuid::now_v7();
        let mut order = Self {
            id, order_code: code.to_string(), user_id, product_id: draft.product_id, product_name: draft.product_name,
            delivery_date: draft.delivery_date, delivery_location: draft.delivery_location, quantity,
            price_per_unit_paise: draft.price_per_unit.value(), total_amount_paise: total.value(), currency: Self::CURRENCY.to_string(),
            full_name: draft.full_name, email: draft.email, phone: draft.phone, whatsapp: draft.whatsapp,
            delivery_address: draft.delivery_address, state: draft.state, district: draft.district, pincode: draft.pincode,
            area_name: draft.area_name, payment_method: draft.payment_method, terms_accepted: draft.terms_accepted,
            status, refund_status: None, refund_request_date: None, is_bulk_upload: bulk,
            metadata: draft.metadata.unwrap_or_else(|| serde_json::json!({})),
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: id, order_code: order.order_code.clone(), bulk }));
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_code(&self) -> &str { &self.order_code }
    pub fn user_id(&self) -> Option<Uuid> { self.user_id }
    pub fn product_id(&self) -> Option<i32> { self.product_id }
    pub fn product_name(&self) -> Option<&str> { self.product_name.as_deref() }
    pub fn delivery_date(&self) -> NaiveDate { self.delivery_date }
    pub fn delivery_location(&self) -> Option<&str> { self.delivery_location.as_deref() }
    pub fn quantity(&self) -> i32 { self.quantity }
    pub fn price_per_unit(&self) -> Paise { Paise::new(self.price_per_unit_paise) }
    pub fn total(&self) -> Paise { Paise::new(self.total_amount_paise) }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn full_name(&self) -> &str { &self.full_name }
    pub fn email(&self) -> &str { &self.email }
    pub fn phone(&self) -> &str { &self.phone }
    pub fn whatsapp(&self) -> Option<&str> { self.whatsapp.as_deref() }
    pub fn delivery_address(&self) -> &str { &self.delivery_address }
    pub fn state(&self) -> &str { &self.state }
    pub fn district(&self) -> &str { &self.district }
    pub fn pincode(&self) -> &str { &self.pincode }
    pub fn area_name(&self) -> &str { &self.area_name }
    pub fn payment_method(&self) -> Option<PaymentMethod> { self.payment_method }
    pub fn terms_accepted(&self) -> bool { self.terms_accepted }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn refund_status(&self) -> Option<OrderRefundStatus> { self.refund_status }
    pub fn refund_request_date(&self) -> Option<DateTime<Utc>> { self.refund_request_date }
    pub fn is_bulk_upload(&self) -> bool { self.is_bulk_upload }
    pub fn metadata(&self) -> &serde_json::Value { &self.metadata }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Records a captured payment. Returns `false` when the order was already paid.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<bool, OrderError> {
        match self.status {
            OrderStatus::Pending => {
                self.status = OrderStatus::Paid;
                self.touch(now);
                self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id }));
                Ok(true)
            }
            OrderStatus::Paid => Ok(false),
            from => Err(OrderError::InvalidTransition { from, action: "mark as paid" }),
        }
    }

    /// Images already attached to a previous refund request.
    pub fn refund_images(&self) -> Vec<RefundImage> {
        self.metadata
            .get(REFUND_REQUEST_KEY)
            .cloned()
            .and_then(|meta| serde_json::from_value::<RefundRequestMeta>(meta).ok())
            .map(|meta| meta.images)
            .unwrap_or_default()
    }

    /// Whether a refund request (or re-submission) is currently allowed.
    pub fn check_refund_request(&self) -> Result<(), OrderError> {
        match (self.status, self.refund_status) {
            (OrderStatus::Paid, _) | (OrderStatus::RefundRequested, Some(OrderRefundStatus::Pending)) => Ok(()),
            (OrderStatus::RefundRequested, _) => Err(OrderError::RefundAlreadyDecided),
            (from, _) => Err(OrderError::InvalidTransition { from, action: "request a refund for" }),
        }
    }

    /// Raises (or re-submits) a refund request. Existing metadata keys are kept.
    pub fn request_refund(&mut self, reason: Option<String>, images: Vec<RefundImage>, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.check_refund_request()?;
        let meta = RefundRequestMeta { reason, images, requested_at: now };
        let meta = serde_json::to_value(meta).map_err(|_| OrderError::Metadata)?;
        match self.metadata.as_object_mut() {
            Some(object) => { object.insert(REFUND_REQUEST_KEY.to_string(), meta); }
            None => self.metadata = serde_json::json!({ REFUND_REQUEST_KEY: meta }),
        }
        self.status = OrderStatus::RefundRequested;
        self.refund_status = Some(OrderRefundStatus::Pending);
        self.refund_request_date = Some(now);
        self.touch(now);
        self.raise_event(DomainEvent::Order(OrderEvent::RefundRequested { order_id: self.id }));
        Ok(())
    }

    /// Admin approval. `retrying` allows a second approval after the gateway refund failed.
    pub fn approve_refund(&mut self, retrying: bool, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::RefundRequested {
            return Err(OrderError::InvalidTransition { from: self.status, action: "approve a refund for" });
        }
        match self.refund_status {
            Some(OrderRefundStatus::Pending) => {}
            Some(OrderRefundStatus::Approved) if retrying => {}
            _ => return Err(OrderError::RefundAlreadyDecided),
        }
        if !self.total().is_positive() { return Err(OrderError::InvalidAmount); }
        self.refund_status = Some(OrderRefundStatus::Approved);
        self.touch(now);
        self.raise_event(DomainEvent::Order(OrderEvent::RefundApproved { order_id: self.id }));
        Ok(())
    }

    pub fn decline_refund(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::RefundRequested {
            return Err(OrderError::InvalidTransition { from: self.status, action: "decline a refund for" });
        }
        if self.refund_status != Some(OrderRefundStatus::Pending) { return Err(OrderError::RefundAlreadyDecided); }
        self.status = OrderStatus::Cancelled;
        self.refund_status = Some(OrderRefundStatus::Cancelled);
        self.touch(now);
        self.raise_event(DomainEvent::Order(OrderEvent::RefundDeclined { order_id: self.id }));
        Ok(())
    }

    /// Gateway confirmed the money went back. Returns `false` when already refunded.
    pub fn complete_refund(&mut self, now: DateTime<Utc>) -> Result<bool, OrderError> {
        match self.status {
            OrderStatus::RefundRequested => {
                self.status = OrderStatus::Refunded;
                self.touch(now);
                self.raise_event(DomainEvent::Order(OrderEvent::Refunded { order_id: self.id }));
                Ok(true)
            }
            OrderStatus::Refunded => Ok(false),
            from => Err(OrderError::InvalidTransition { from, action: "complete a refund for" }),
        }
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self, now: DateTime<Utc>) { self.updated_at = now; }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("cannot {action} an order that is {from}")]
    InvalidTransition { from: OrderStatus, action: &'static str },
    #[error("refund request has already been decided")]
    RefundAlreadyDecided,
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("Invalid refund amount")]
    InvalidAmount,
    #[error("order metadata could not be updated")]
    Metadata,
    #[error(transparent)]
    Money(#[from] MoneyError),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn draft() -> OrderDraft {
        OrderDraft {
            product_id: Some(1), product_name: Some("Panniyur-1 pepper cutting".into()),
            delivery_date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(), delivery_location: Some("Kottayam".into()),
            quantity: 40, price_per_unit: Paise::from_rupees("12.50").unwrap(),
            full_name: "Anil Kumar".into(), email: "anil@example.com".into(), phone: "+919876543210".into(), whatsapp: None,
            delivery_address: "Kumbukkal House".into(), state: "Kerala".into(), district: "Kottayam".into(),
            pincode: "686001".into(), area_name: "Pala".into(), payment_method: Some(PaymentMethod::Upi),
            terms_accepted: true, metadata: None,
        }
    }

    pub(crate) fn placed() -> Order {
        Order::place(OrderCode::new(2025, 1), Uuid::new_v4(), draft(), Utc::now()).unwrap()
    }

    pub(crate) fn paid() -> Order {
        let mut order = placed();
        order.mark_paid(Utc::now()).unwrap();
        order.take_events();
        order
    }

    #[test]
    fn test_place_computes_total_in_paise() {
        let mut order = placed();
        assert_eq!(order.total().value(), 50_000);
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.order_code(), "KP2025-0001");
        assert!(matches!(order.take_events().as_slice(), [DomainEvent::Order(OrderEvent::Placed { bulk: false, .. })]));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut d = draft();
        d.quantity = 0;
        assert_eq!(Order::place(OrderCode::new(2025, 1), Uuid::new_v4(), d, Utc::now()).unwrap_err(), OrderError::InvalidQuantity);
    }

    #[test]
    fn test_bulk_order_starts_paid() {
        let order = Order::bulk(OrderCode::new(2025, 3), draft(), Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Paid);
        assert!(order.is_bulk_upload());
        assert_eq!(order.user_id(), None);
    }

    #[test]
    fn test_mark_paid_is_idempotent() {
        let mut order = placed();
        order.take_events();
        assert!(order.mark_paid(Utc::now()).unwrap());
        assert!(!order.mark_paid(Utc::now()).unwrap());
        assert_eq!(order.take_events().len(), 1);
    }

    #[test]
    fn test_refund_request_requires_payment() {
        let mut order = placed();
        let err = order.request_refund(Some("damaged".into()), vec![], Utc::now()).unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { from: OrderStatus::Pending, .. }));
    }

    #[test]
    fn test_refund_request_merges_metadata_and_allows_resubmission() {
        let mut order = paid();
        order.metadata = serde_json::json!({ "coupon": "MONSOON" });
        let image = RefundImage { url: "http://files/a.jpg".into(), hash: "abc".into() };
        order.request_refund(Some("wilted".into()), vec![image.clone()], Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::RefundRequested);
        assert_eq!(order.refund_status(), Some(OrderRefundStatus::Pending));
        assert_eq!(order.metadata()["coupon"], "MONSOON");
        assert_eq!(order.refund_images(), vec![image]);

        order.request_refund(Some("wilted, photos attached".into()), vec![], Utc::now()).unwrap();
        assert_eq!(order.metadata()["refundRequest"]["reason"], "wilted, photos attached");
    }

    #[test]
    fn test_decline_refund_cancels_order() {
        let mut order = paid();
        order.request_refund(None, vec![], Utc::now()).unwrap();
        order.decline_refund(Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.refund_status(), Some(OrderRefundStatus::Cancelled));
        assert!(order.request_refund(None, vec![], Utc::now()).is_err());
    }

    #[test]
    fn test_approve_then_complete_refund() {
        let mut order = paid();
        order.request_refund(None, vec![], Utc::now()).unwrap();
        order.approve_refund(false, Utc::now()).unwrap();
        assert_eq!(order.refund_status(), Some(OrderRefundStatus::Approved));
        assert_eq!(order.approve_refund(false, Utc::now()).unwrap_err(), OrderError::RefundAlreadyDecided);
        assert!(order.approve_refund(true, Utc::now()).is_ok());
        assert_eq!(order.decline_refund(Utc::now()).unwrap_err(), OrderError::RefundAlreadyDecided);
        assert!(order.complete_refund(Utc::now()).unwrap());
        assert!(!order.complete_refund(Utc::now()).unwrap());
        assert_eq!(order.status(), OrderStatus::Refunded);
    }

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!(OrderStatus::parse("refund_requested"), Some(OrderStatus::RefundRequested));
        assert_eq!(OrderStatus::parse("SHIPPED"), None);
    }
}
