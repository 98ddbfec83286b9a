//! Razorpay REST client
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use super::{signature, GatewayError, GatewayOrder, GatewayRefund, PaymentGateway};
use crate::domain::value_objects::Paise;

const API_BASE: &str = "https://api.razorpay.com/v1";

pub struct RazorpayGateway {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

#[derive(Deserialize)]
struct OrderResponse { id: String, amount: i64, currency: String }

#[derive(Deserialize)]
struct ErrorResponse { error: ErrorBody }

#[derive(Deserialize)]
struct ErrorBody { description: Option<String>, code: Option<String> }

impl RazorpayGateway {
    pub fn new(key_id: impl Into<String>, key_secret: impl Into<String>) -> Result<Self, GatewayError> {
        Self::with_base_url(API_BASE, key_id, key_secret)
    }

    pub fn with_base_url(base_url: &str, key_id: impl Into<String>, key_secret: impl Into<String>) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(20)).build()?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string(), key_id: key_id.into(), key_secret: key_secret.into() })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<serde_json::Value, GatewayError> {
        let response = self.http
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let description = serde_json::from_slice::<ErrorResponse>(&bytes)
                .ok()
                .and_then(|e| e.error.description.or(e.error.code))
                .unwrap_or_else(|| format!("gateway returned {status}"));
            tracing::error!(path, status = status.as_u16(), %description, "Razorpay request rejected");
            return Err(GatewayError::Rejected { status: status.as_u16(), description });
        }
        serde_json::from_slice(&bytes).map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str { &self.key_id }

    async fn create_order(&self, amount: Paise, currency: &str, receipt: &str) -> Result<GatewayOrder, GatewayError> {
        let raw = self.post("/orders", json!({
            "amount": amount.value(),
            "currency": currency,
            "receipt": receipt,
            "payment_capture": true,
        })).await?;
        let order: OrderResponse = serde_json::from_value(raw).map_err(|e| GatewayError::Malformed(e.to_string()))?;
        tracing::info!(gateway_order_id = %order.id, amount = order.amount, "Razorpay order created");
        Ok(GatewayOrder { id: order.id, amount: Paise::new(order.amount), currency: order.currency })
    }

    async fn refund(&self, payment_id: &str, amount: Paise, reason: &str, receipt: &str) -> Result<GatewayRefund, GatewayError> {
        let raw = self.post(&format!("/payments/{payment_id}/refund"), json!({
            "amount": amount.value(),
            "receipt": receipt,
            "notes": { "reason": reason },
        })).await?;
        let id = raw.get("id").and_then(|v| v.as_str()).ok_or_else(|| GatewayError::Malformed("refund without id".into()))?.to_string();
        let amount = raw.get("amount").and_then(|v| v.as_i64()).map_or(amount, Paise::new);
        tracing::info!(payment_id, gateway_refund_id = %id, amount = amount.value(), "Razorpay refund created");
        Ok(GatewayRefund { id, amount, raw })
    }

    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        signature::verify_hex(&self.key_secret, signature::checkout_payload(order_id, payment_id).as_bytes(), signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_signature() {
        let gateway = RazorpayGateway::new("rzp_test_key", "rzp_secret").unwrap();
        let signature = signature::sign_hex("rzp_secret", b"order_Nx1|pay_Q9");
        assert!(gateway.verify_payment_signature("order_Nx1", "pay_Q9", &signature));
        assert!(!gateway.verify_payment_signature("order_Nx2", "pay_Q9", &signature));
        assert_eq!(gateway.key_id(), "rzp_test_key");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_transport_error() {
        let gateway = RazorpayGateway::with_base_url("http://127.0.0.1:9", "k", "s").unwrap();
        let err = gateway.create_order(Paise::new(100), "INR", "receipt_1").await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }
}
