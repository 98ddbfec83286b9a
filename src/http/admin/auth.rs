use axum::{extract::State, routing::{post, put}, Json, Router};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;
use crate::auth::AdminUser;
use crate::http::extract::ValidatedJson;
use crate::http::user::{check_otp, otp, reset, signin, EmailRequest, LoginRequest, ResetPasswordRequest, VerifyOtpRequest};
use crate::http::AppState;
use crate::services::accounts::{self, AccountKind, Session};
use crate::{NurseryError, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/send-otp", post(send_otp))
        .route("/verify-otp", post(verify_otp))
        .route("/reset-password", post(reset_password))
        .route("/update-profile", put(update_profile))
}

async fn login(State(s): State<AppState>, ValidatedJson(r): ValidatedJson<LoginRequest>) -> Result<Json<Session>> {
    signin(&s, AccountKind::Admin, r).await
}

async fn send_otp(State(s): State<AppState>, ValidatedJson(r): ValidatedJson<EmailRequest>) -> Result<Json<serde_json::Value>> {
    otp(&s, AccountKind::Admin, r).await
}

async fn verify_otp(State(s): State<AppState>, ValidatedJson(r): ValidatedJson<VerifyOtpRequest>) -> Result<Json<serde_json::Value>> {
    check_otp(&s, AccountKind::Admin, r).await
}

async fn reset_password(State(s): State<AppState>, ValidatedJson(r): ValidatedJson<ResetPasswordRequest>) -> Result<Json<serde_json::Value>> {
    reset(&s, AccountKind::Admin, r).await
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    #[validate(custom = "crate::auth::validate_password")]
    pub password: Option<String>,
}

async fn update_profile(State(s): State<AppState>, admin: AdminUser, ValidatedJson(r): ValidatedJson<UpdateProfileRequest>) -> Result<Json<serde_json::Value>> {
    let name = r.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    if name.is_none() && r.password.is_none() {
        return Err(NurseryError::bad_request("Nothing to update"));
    }
    let profile = accounts::update_admin_profile(&s.db, admin.id, name, r.password.as_deref()).await?;
    Ok(Json(json!({ "message": "Profile updated successfully", "admin": profile })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;
    use crate::auth::Role;
    use crate::http::router;
    use crate::http::tests::{bearer, test_state};

    #[tokio::test]
    async fn test_empty_profile_update_is_rejected() {
        let state = test_state();
        let request = Request::put("/admin/update-profile")
            .header(header::AUTHORIZATION, bearer(&state, Role::Admin))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_login_validates_email() {
        let request = Request::post("/admin/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "email": "not-an-email", "password": "x" }).to_string()))
            .unwrap();
        let response = router(test_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
