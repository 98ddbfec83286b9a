//! Tokens, password hashing and credential rules.
pub mod extract;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use uuid::Uuid;
use validator::ValidationError;
use crate::{NurseryError, Result};

pub use extract::{AdminUser, AuthUser};

pub static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?\d{7,15}$").expect("static regex should not panic"));

pub const PASSWORD_SPECIALS: &str = "@$!%*?&";
pub const PASSWORD_RULE: &str =
    "Password must be at least 8 characters long, include one uppercase, one lowercase, one number, and one special character";

/// At least 8 characters drawn only from letters, digits and `@$!%*?&`,
/// with one of each class present.
pub fn validate_password(password: &str) -> std::result::Result<(), ValidationError> {
    let allowed = password.chars().all(|c| c.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(c));
    let strong = password.chars().count() >= 8
        && allowed
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SPECIALS.contains(c));
    if strong {
        Ok(())
    } else {
        let mut err = ValidationError::new("password_strength");
        err.message = Some(Cow::Borrowed(PASSWORD_RULE));
        Err(err)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { User, Admin }

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, sub: Uuid, email: &str, role: Role, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims { sub, email: email.to_string(), role, iat: now.timestamp(), exp: (now + self.ttl).timestamp() };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| NurseryError::Internal(e.into()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| NurseryError::Unauthorized("Invalid or expired token".into()))
    }
}

/// Cost used for stored hashes.
pub const HASH_COST: u32 = bcrypt::DEFAULT_COST;

pub async fn hash_password(password: &str) -> Result<String> {
    hash_password_with_cost(password, HASH_COST).await
}

pub async fn hash_password_with_cost(password: &str, cost: u32) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| NurseryError::Internal(e.into()))?
        .map_err(|e| NurseryError::Internal(e.into()))
}

pub async fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let (password, hash) = (password.to_string(), hash.to_string());
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| NurseryError::Internal(e.into()))?
        .map_err(|e| NurseryError::Internal(e.into()))
}
