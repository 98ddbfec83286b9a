//! Bearer token extractors.
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use uuid::Uuid;
use super::{Claims, Role, TokenKeys};
use crate::NurseryError;

fn claims_from_parts(parts: &Parts, keys: &TokenKeys) -> Result<Claims, NurseryError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| NurseryError::Unauthorized("Missing authorization header".into()))?;
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| NurseryError::Unauthorized("Invalid authorization format. Expected 'Bearer <token>'".into()))?;
    keys.verify(token)
}

/// Any signed-in customer or admin.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenKeys: FromRef<S>,
{
    type Rejection = NurseryError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = claims_from_parts(parts, &TokenKeys::from_ref(state))?;
        Ok(Self { id: claims.sub, email: claims.email, role: claims.role })
    }
}

/// A signed-in admin.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub id: Uuid,
    pub email: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    TokenKeys: FromRef<S>,
{
    type Rejection = NurseryError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = claims_from_parts(parts, &TokenKeys::from_ref(state))?;
        if claims.role != Role::Admin {
            return Err(NurseryError::Forbidden("Admin access required".into()));
        }
        Ok(Self { id: claims.sub, email: claims.email })
    }
}
