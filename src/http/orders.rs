//! Customer order routes and the gateway webhook.
use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::{Validate, ValidationError};
use super::extract::{Form, ValidatedJson};
use super::AppState;
use crate::auth::AuthUser;
use crate::domain::aggregates::{OrderDraft, PaymentMethod};
use crate::domain::value_objects::Paise;
use crate::services::orders::{self, CheckoutProof, PlacedOrder};
use crate::store::OrderView;
use crate::{NurseryError, Result};

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(my_orders).post(place_order))
        .route("/verify/:orderId", post(verify_payment))
        .route("/webhook/razorpay", post(webhook))
        .route("/:id/refund-request", post(request_refund))
}

/// Rupee amount sent either as a JSON string or a number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RupeeAmount {
    Text(String),
    Number(serde_json::Number),
}

impl RupeeAmount {
    pub(crate) fn to_paise(&self) -> Result<Paise> {
        let text = match self {
            Self::Text(t) => t.clone(),
            Self::Number(n) => n.to_string(),
        };
        Ok(Paise::from_rupees(&text)?)
    }
}

fn must_accept(accepted: &bool) -> std::result::Result<(), ValidationError> {
    if *accepted {
        Ok(())
    } else {
        let mut err = ValidationError::new("terms");
        err.message = Some("You must accept the terms and conditions".into());
        Err(err)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub product_id: Option<i32>,
    #[validate(length(max = 200, message = "Product name is too long"))]
    pub product_name: Option<String>,
    pub delivery_date: NaiveDate,
    pub delivery_location: Option<String>,
    #[validate(range(min = 1, max = 1000000, message = "Quantity must be at least 1"))]
    pub quantity: u32,
    pub price_per_unit: Option<RupeeAmount>,
    #[validate(range(min = 1, message = "Price must be greater than zero"))]
    pub price_per_unit_in_paise: Option<i64>,
    #[validate(length(min = 1, max = 100, message = "Full name is required"))]
    pub full_name: String,
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(regex(path = "crate::auth::PHONE_RE", message = "Please enter a valid phone number"))]
    pub phone: String,
    #[validate(regex(path = "crate::auth::PHONE_RE", message = "Please enter a valid WhatsApp number"))]
    pub whatsapp: Option<String>,
    #[validate(length(min = 1, max = 500, message = "Delivery address is required"))]
    pub delivery_address: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "District is required"))]
    pub district: String,
    #[validate(length(min = 6, max = 6, message = "Pincode must be 6 digits"))]
    pub pincode: String,
    #[validate(length(min = 1, message = "Area name is required"))]
    pub area_name: String,
    pub payment_method: Option<PaymentMethod>,
    #[validate(custom = "must_accept")]
    pub terms_accepted: bool,
    pub metadata: Option<serde_json::Value>,
}

impl OrderRequest {
    pub fn into_draft(self) -> Result<OrderDraft> {
        let price_per_unit = match (self.price_per_unit_in_paise, &self.price_per_unit) {
            (Some(paise), _) => Paise::new(paise),
            (None, Some(rupees)) => rupees.to_paise()?,
            (None, None) => return Err(NurseryError::bad_request("pricePerUnit is required")),
        };
        if !self.pincode.bytes().all(|b| b.is_ascii_digit()) {
            return Err(NurseryError::bad_request("Pincode must be 6 digits"));
        }
        Ok(OrderDraft {
            product_id: self.product_id,
            product_name: self.product_name,
            delivery_date: self.delivery_date,
            delivery_location: self.delivery_location,
            quantity: self.quantity,
            price_per_unit,
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            phone: self.phone,
            whatsapp: self.whatsapp,
            delivery_address: self.delivery_address.trim().to_string(),
            state: self.state.trim().to_string(),
            district: self.district.trim().to_string(),
            pincode: self.pincode,
            area_name: self.area_name.trim().to_string(),
            payment_method: self.payment_method,
            terms_accepted: self.terms_accepted,
            metadata: self.metadata,
        })
    }
}

async fn place_order(State(s): State<AppState>, user: AuthUser, ValidatedJson(r): ValidatedJson<OrderRequest>) -> Result<(StatusCode, Json<PlacedOrder>)> {
    let placed = orders::place(&s, &user, r.into_draft()?).await?;
    Ok((StatusCode::CREATED, Json(placed)))
}

async fn my_orders(State(s): State<AppState>, user: AuthUser) -> Result<Json<Vec<OrderView>>> {
    Ok(Json(orders::mine(&s, &user).await?))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[validate(length(min = 1, message = "razorpayPaymentId is required"))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, message = "razorpayOrderId is required"))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, message = "razorpaySignature is required"))]
    pub razorpay_signature: String,
}

async fn verify_payment(State(s): State<AppState>, user: AuthUser, Path(order_id): Path<Uuid>, ValidatedJson(r): ValidatedJson<VerifyRequest>) -> Result<Json<serde_json::Value>> {
    let proof = CheckoutProof { gateway_order_id: r.razorpay_order_id, gateway_payment_id: r.razorpay_payment_id, signature: r.razorpay_signature };
    let order = orders::verify(&s, &user, order_id, proof).await?;
    Ok(Json(json!({ "message": "Payment verified successfully", "order": order })))
}

async fn webhook(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<serde_json::Value>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    orders::handle_webhook(&s, signature, &body).await?;
    Ok(Json(json!({ "status": 200, "message": "Webhook received" })))
}

async fn request_refund(State(s): State<AppState>, user: AuthUser, Path(id): Path<Uuid>, multipart: Multipart) -> Result<Json<serde_json::Value>> {
    let form = Form::read(multipart).await?;
    let reason = form.text("reason").map(str::to_string);
    let order = orders::request_refund(&s, &user, id, reason, form.files("images")).await?;
    Ok(Json(json!({ "message": "Refund request submitted successfully", "order": order })))
}
