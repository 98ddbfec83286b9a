//! Customer accounts, contact, testimonials and the dashboard endpoints.
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;
use super::extract::{Page, PaginatedResponse, ValidatedJson};
use super::{message, AppState};
use crate::auth::{AdminUser, AuthUser};
use crate::services::accounts::{self, AccountKind, Profile, Registration, Session};
use crate::services::dashboard::{self, ChartRange};
use crate::{NurseryError, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/send-otp", post(send_otp))
        .route("/verify-otp", post(verify_otp))
        .route("/reset-password", post(reset_password))
        .route("/profile", get(profile))
        .route("/contact", post(contact))
        .route("/create-callback", post(create_callback))
        .route("/fetch-dashboard-detatils", get(dashboard_details))
        .route("/fetch-dashboard-details", get(dashboard_details))
        .route("/fetch-dashboard-chart", get(dashboard_chart))
        .route("/fetch-dashboard-graph", get(dashboard_graph))
        .route("/full-dashboard", get(full_dashboard))
        .route("/create-testimonial", post(create_testimonial))
        .route("/fetch-all-testimonials/:page", get(list_testimonials))
        .route("/fetch-testimonial/:id", get(get_testimonial))
        .route("/update-testimonial/:id", put(update_testimonial))
        .route("/delete-testimonial/:id", delete(delete_testimonial))
}

// =============================================================================
// Account requests, shared with the admin auth routes
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(regex(path = "crate::auth::PHONE_RE", message = "Please enter a valid phone number"))]
    pub phone: Option<String>,
    #[validate(custom = "crate::auth::validate_password")]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EmailRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(length(equal = 6, message = "OTP must be 6 digits"))]
    pub otp: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(custom = "crate::auth::validate_password")]
    pub new_password: String,
}

pub(crate) async fn signin(state: &AppState, kind: AccountKind, r: LoginRequest) -> Result<Json<Session>> {
    Ok(Json(accounts::login(&state.db, &state.tokens, kind, &r.email, &r.password).await?))
}

pub(crate) async fn otp(state: &AppState, kind: AccountKind, r: EmailRequest) -> Result<Json<serde_json::Value>> {
    accounts::send_otp(&state.db, &state.notifier, kind, &r.email).await?;
    Ok(message("OTP sent to your email"))
}

pub(crate) async fn check_otp(state: &AppState, kind: AccountKind, r: VerifyOtpRequest) -> Result<Json<serde_json::Value>> {
    accounts::verify_otp(&state.db, kind, &r.email, &r.otp).await?;
    Ok(message("OTP verified successfully"))
}

pub(crate) async fn reset(state: &AppState, kind: AccountKind, r: ResetPasswordRequest) -> Result<Json<serde_json::Value>> {
    accounts::reset_password(&state.db, kind, &r.email, &r.new_password).await?;
    Ok(message("Password reset successfully"))
}

async fn register(State(s): State<AppState>, ValidatedJson(r): ValidatedJson<RegisterRequest>) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let user = accounts::register(&s.db, Registration { name: r.name, email: r.email, phone: r.phone, password: r.password }).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "User registered successfully", "user": user }))))
}

async fn login(State(s): State<AppState>, ValidatedJson(r): ValidatedJson<LoginRequest>) -> Result<Json<Session>> {
    signin(&s, AccountKind::User, r).await
}

async fn send_otp(State(s): State<AppState>, ValidatedJson(r): ValidatedJson<EmailRequest>) -> Result<Json<serde_json::Value>> {
    otp(&s, AccountKind::User, r).await
}

async fn verify_otp(State(s): State<AppState>, ValidatedJson(r): ValidatedJson<VerifyOtpRequest>) -> Result<Json<serde_json::Value>> {
    check_otp(&s, AccountKind::User, r).await
}

async fn reset_password(State(s): State<AppState>, ValidatedJson(r): ValidatedJson<ResetPasswordRequest>) -> Result<Json<serde_json::Value>> {
    reset(&s, AccountKind::User, r).await
}

async fn profile(State(s): State<AppState>, user: AuthUser) -> Result<Json<Profile>> {
    Ok(Json(accounts::profile(&s.db, AccountKind::User, user.id).await?))
}

// =============================================================================
// Contact and callbacks
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct ContactRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(regex(path = "crate::auth::PHONE_RE", message = "Please enter a valid phone number"))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 2000, message = "Message must be between 1 and 2000 characters"))]
    pub message: String,
}

async fn contact(State(s): State<AppState>, ValidatedJson(r): ValidatedJson<ContactRequest>) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let email = accounts::normalize_email(&r.email);
    sqlx::query("INSERT INTO contact_forms (id, name, email, phone, message, created_at) VALUES ($1, $2, $3, $4, $5, NOW())")
        .bind(Uuid::now_v7()).bind(r.name.trim()).bind(&email).bind(&r.phone).bind(r.message.trim())
        .execute(&s.db).await?;
    s.notifier.contact_form(r.name.trim(), &email, r.phone.as_deref(), r.message.trim());
    Ok((StatusCode::CREATED, message("Thank you for contacting us. We will get back to you soon.")))
}

async fn create_callback(State(s): State<AppState>, user: AuthUser) -> Result<(StatusCode, Json<serde_json::Value>)> {
    sqlx::query("INSERT INTO callbacks (id, user_id, created_at) VALUES ($1, $2, NOW())").bind(Uuid::now_v7()).bind(user.id).execute(&s.db).await?;
    tracing::info!(user_id = %user.id, "Callback requested");
    Ok((StatusCode::CREATED, message("Callback request submitted successfully")))
}

// =============================================================================
// Dashboard
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartQuery {
    pub period: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ChartQuery {
    fn range(&self) -> Result<ChartRange> { ChartRange::from_query(self.period.as_deref(), self.start_date, self.end_date) }
}

async fn dashboard_details(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<dashboard::Overview>> {
    Ok(Json(dashboard::overview(&s.db, &s.calendar(), Utc::now()).await?))
}

async fn dashboard_chart(State(s): State<AppState>, _admin: AdminUser, Query(q): Query<ChartQuery>) -> Result<Json<dashboard::VisitorChart>> {
    Ok(Json(dashboard::visitor_chart(&s.db, &s.calendar(), q.range()?, Utc::now()).await?))
}

async fn dashboard_graph(State(s): State<AppState>, _admin: AdminUser, Query(q): Query<ChartQuery>) -> Result<Json<dashboard::RevenueGraph>> {
    Ok(Json(dashboard::revenue_graph(&s.db, &s.calendar(), q.range()?, Utc::now()).await?))
}

async fn full_dashboard(State(s): State<AppState>, _admin: AdminUser, Query(q): Query<ChartQuery>) -> Result<Json<serde_json::Value>> {
    let (calendar, now, range) = (s.calendar(), Utc::now(), q.range()?);
    let overview = dashboard::overview(&s.db, &calendar, now).await?;
    let chart = dashboard::visitor_chart(&s.db, &calendar, range, now).await?;
    let graph = dashboard::revenue_graph(&s.db, &calendar, range, now).await?;
    Ok(Json(json!({ "overview": overview, "chart": chart, "graph": graph })))
}

// =============================================================================
// Testimonials
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Testimonial {
    pub id: Uuid,
    pub name: String,
    pub place: String,
    pub rating: i16,
    pub message: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TestimonialRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "Place is required"))]
    pub place: String,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,
    #[validate(length(min = 1, max = 1000, message = "Message must be between 1 and 1000 characters"))]
    pub message: String,
    pub active: Option<bool>,
}

async fn create_testimonial(State(s): State<AppState>, _admin: AdminUser, ValidatedJson(r): ValidatedJson<TestimonialRequest>) -> Result<(StatusCode, Json<Testimonial>)> {
    let t = sqlx::query_as::<_, Testimonial>("INSERT INTO testimonials (id, name, place, rating, message, active, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) RETURNING *")
        .bind(Uuid::now_v7()).bind(r.name.trim()).bind(r.place.trim()).bind(r.rating).bind(r.message.trim()).bind(r.active.unwrap_or(true))
        .fetch_one(&s.db).await?;
    Ok((StatusCode::CREATED, Json(t)))
}

async fn list_testimonials(State(s): State<AppState>, Path(page): Path<u32>) -> Result<Json<PaginatedResponse<Testimonial>>> {
    let page = Page::new(page);
    let rows = sqlx::query_as::<_, Testimonial>("SELECT * FROM testimonials ORDER BY created_at DESC LIMIT $1 OFFSET $2")
        .bind(page.limit()).bind(page.offset()).fetch_all(&s.db).await?;
    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM testimonials").fetch_one(&s.db).await?;
    Ok(Json(PaginatedResponse::new(rows, total.0, page)))
}

async fn get_testimonial(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Testimonial>> {
    sqlx::query_as::<_, Testimonial>("SELECT * FROM testimonials WHERE id = $1").bind(id).fetch_optional(&s.db).await?
        .map(Json).ok_or_else(|| NurseryError::not_found("Testimonial"))
}

async fn update_testimonial(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, ValidatedJson(r): ValidatedJson<TestimonialRequest>) -> Result<Json<Testimonial>> {
    sqlx::query_as::<_, Testimonial>("UPDATE testimonials SET name = $2, place = $3, rating = $4, message = $5, active = COALESCE($6, active), updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(id).bind(r.name.trim()).bind(r.place.trim()).bind(r.rating).bind(r.message.trim()).bind(r.active)
        .fetch_optional(&s.db).await?
        .map(Json).ok_or_else(|| NurseryError::not_found("Testimonial"))
}

async fn delete_testimonial(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>> {
    let deleted = sqlx::query("DELETE FROM testimonials WHERE id = $1").bind(id).execute(&s.db).await?.rows_affected();
    if deleted == 0 { return Err(NurseryError::not_found("Testimonial")); }
    Ok(message("Testimonial deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;
    use crate::http::router;
    use crate::http::tests::{body_json, test_state};

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri).header(header::CONTENT_TYPE, "application/json").body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_register_rejects_weak_password() {
        let request = post_json("/user/register", json!({ "email": "a@example.com", "password": "weakpass" }));
        let response = router(test_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], crate::auth::PASSWORD_RULE);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_phone() {
        let request = post_json("/user/register", json!({ "email": "a@example.com", "phone": "12-34", "password": "Pepper@123" }));
        let response = router(test_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "Please enter a valid phone number");
    }

    #[tokio::test]
    async fn test_login_requires_json_body() {
        let request = Request::post("/user/login").header(header::CONTENT_TYPE, "application/json").body(Body::from("{")).unwrap();
        let response = router(test_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_dashboard_is_admin_only() {
        let response = router(test_state()).oneshot(Request::get("/user/full-dashboard").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_testimonial_rating_bounds() {
        let request = TestimonialRequest { name: "Asha".into(), place: "Wayanad".into(), rating: 6, message: "Healthy vines".into(), active: None };
        assert!(request.validate().is_err());
    }
}
