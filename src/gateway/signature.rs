//! HMAC-SHA256 signatures as used by Razorpay.
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded `HMAC_SHA256(secret, payload)`.
pub fn sign_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of `signature` (hex) against the expected MAC.
pub fn verify_hex(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else { return false };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else { return false };
    mac.update(payload);
    mac.verify_slice(&provided).is_ok()
}

/// Checkout signature over `"<order_id>|<payment_id>"`.
pub fn checkout_payload(order_id: &str, payment_id: &str) -> String {
    format!("{order_id}|{payment_id}")
}
