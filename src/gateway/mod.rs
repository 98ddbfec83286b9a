//! Payment gateway seam
pub mod razorpay;
pub mod signature;
pub mod webhook;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use thiserror::Error;
use crate::domain::value_objects::Paise;

pub use razorpay::RazorpayGateway;
pub use webhook::WebhookEvent;

/// An order registered with the gateway for checkout.
#[derive(Clone, Debug)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: Paise,
    pub currency: String,
}

/// A refund accepted by the gateway.
#[derive(Clone, Debug)]
pub struct GatewayRefund {
    pub id: String,
    pub amount: Paise,
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key the checkout widget is initialised with.
    fn key_id(&self) -> &str;

    async fn create_order(&self, amount: Paise, currency: &str, receipt: &str) -> Result<GatewayOrder, GatewayError>;

    /// Refunds `amount` of a captured payment. `receipt` is echoed back on the
    /// refund entity and in refund webhooks.
    async fn refund(&self, payment_id: &str, amount: Paise, reason: &str, receipt: &str) -> Result<GatewayRefund, GatewayError>;

    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{description}")]
    Rejected { status: u16, description: String },
    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// The gateway answered and refused, so nothing was done on its side.
    pub fn is_rejection(&self) -> bool { matches!(self, Self::Rejected { status, .. } if *status < 500) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mock::MockGateway;

    #[tokio::test]
    async fn test_refused_refund_is_a_rejection() {
        let mut gateway = MockGateway::new("secret");
        let refund = gateway.refund("pay_1", Paise::new(50_000), "Full refund requested", "rfnd_key").await.unwrap();
        assert_eq!(refund.raw["receipt"], "rfnd_key");

        gateway.fail_refunds = true;
        let err = gateway.refund("pay_1", Paise::new(50_000), "Full refund requested", "rfnd_key").await.unwrap_err();
        assert!(err.is_rejection());
        assert!(!GatewayError::Rejected { status: 502, description: "Bad gateway".into() }.is_rejection());
        assert!(!GatewayError::Malformed("missing id".into()).is_rejection());
    }
}
