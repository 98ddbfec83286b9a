//! In-memory gateway for tests.
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use super::{signature, GatewayError, GatewayOrder, GatewayRefund, PaymentGateway};
use crate::domain::value_objects::Paise;

pub struct MockGateway {
    pub secret: String,
    pub fail_refunds: bool,
    counter: AtomicU32,
}

impl MockGateway {
    pub fn new(secret: &str) -> Self { Self { secret: secret.to_string(), fail_refunds: false, counter: AtomicU32::new(0) } }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn key_id(&self) -> &str { "rzp_test_mock" }

    async fn create_order(&self, amount: Paise, currency: &str, _receipt: &str) -> Result<GatewayOrder, GatewayError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayOrder { id: format!("order_mock{n}"), amount, currency: currency.to_string() })
    }

    async fn refund(&self, payment_id: &str, amount: Paise, _reason: &str, receipt: &str) -> Result<GatewayRefund, GatewayError> {
        if self.fail_refunds {
            return Err(GatewayError::Rejected { status: 400, description: "The payment has been fully refunded already".into() });
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("rfnd_mock{n}");
        Ok(GatewayRefund { raw: serde_json::json!({ "id": id, "payment_id": payment_id, "amount": amount.value(), "receipt": receipt }), id, amount })
    }

    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, sig: &str) -> bool {
        signature::verify_hex(&self.secret, signature::checkout_payload(order_id, payment_id).as_bytes(), sig)
    }
}
