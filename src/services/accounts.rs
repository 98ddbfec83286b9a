//! Customer and admin accounts: registration, login, OTP password reset.
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;
use crate::auth::{self, Role, TokenKeys};
use crate::config::AdminBootstrap;
use crate::domain::value_objects::{Otp, OtpError};
use crate::notify::Notifier;
use crate::{NurseryError, Result};

/// How long a verified OTP allows a password reset.
pub fn reset_window() -> Duration { Duration::minutes(15) }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountKind { User, Admin }

impl AccountKind {
    fn table(&self) -> &'static str {
        match self { Self::User => "users", Self::Admin => "admins" }
    }

    fn profile_columns(&self) -> &'static str {
        match self {
            Self::User => "id, name, email, phone, created_at",
            Self::Admin => "id, name, email, NULL::TEXT AS phone, created_at",
        }
    }

    fn label(&self) -> &'static str {
        match self { Self::User => "User", Self::Admin => "Admin" }
    }

    pub fn role(&self) -> Role {
        match self { Self::User => Role::User, Self::Admin => Role::Admin }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct Credentials {
    id: Uuid,
    email: String,
    password_hash: String,
    otp: Option<String>,
    otp_expires_at: Option<DateTime<Utc>>,
    otp_attempts: i32,
    reset_allowed_until: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub message: &'static str,
    pub token: String,
    pub is_admin: bool,
    pub user: Profile,
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
}

pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

async fn credentials(db: &PgPool, kind: AccountKind, email: &str) -> Result<Option<Credentials>> {
    let sql = format!(
        "SELECT id, email, password_hash, otp, otp_expires_at, otp_attempts, reset_allowed_until FROM {} WHERE email = $1",
        kind.table()
    );
    Ok(sqlx::query_as::<_, Credentials>(&sql).bind(normalize_email(email)).fetch_optional(db).await?)
}

pub async fn profile(db: &PgPool, kind: AccountKind, id: Uuid) -> Result<Profile> {
    let sql = format!("SELECT {} FROM {} WHERE id = $1", kind.profile_columns(), kind.table());
    sqlx::query_as::<_, Profile>(&sql).bind(id).fetch_optional(db).await?.ok_or_else(|| NurseryError::not_found(kind.label()))
}

pub async fn register(db: &PgPool, registration: Registration) -> Result<Profile> {
    let email = normalize_email(&registration.email);
    if credentials(db, AccountKind::User, &email).await?.is_some() {
        return Err(NurseryError::bad_request("Email already registered"));
    }
    let hash = auth::hash_password(&registration.password).await?;
    let profile = sqlx::query_as::<_, Profile>(
        "INSERT INTO users (id, name, email, phone, password_hash, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, NOW(), NOW()) \
         RETURNING id, name, email, phone, created_at",
    )
    .bind(Uuid::now_v7()).bind(&registration.name).bind(&email).bind(&registration.phone).bind(&hash)
    .fetch_one(db)
    .await?;
    info!(user_id = %profile.id, "User registered");
    Ok(profile)
}

pub async fn login(db: &PgPool, tokens: &TokenKeys, kind: AccountKind, email: &str, password: &str) -> Result<Session> {
    let invalid = || NurseryError::Unauthorized("Invalid credentials".into());
    let account = credentials(db, kind, email).await?.ok_or_else(invalid)?;
    if !auth::verify_password(password, &account.password_hash).await? {
        return Err(invalid());
    }
    let token = tokens.issue(account.id, &account.email, kind.role(), Utc::now())?;
    let user = profile(db, kind, account.id).await?;
    info!(account_id = %account.id, role = ?kind.role(), "Signed in");
    Ok(Session { message: "Login successful", token, is_admin: kind == AccountKind::Admin, user })
}

pub async fn send_otp(db: &PgPool, notifier: &Notifier, kind: AccountKind, email: &str) -> Result<()> {
    let account = credentials(db, kind, email).await?.ok_or_else(|| NurseryError::not_found(kind.label()))?;
    let otp = Otp::generate(Utc::now());
    let sql = format!("UPDATE {} SET otp = $2, otp_expires_at = $3, otp_attempts = 0, updated_at = NOW() WHERE id = $1", kind.table());
    sqlx::query(&sql).bind(account.id).bind(otp.code()).bind(otp.expires_at()).execute(db).await?;
    notifier.otp(&account.email, otp.code());
    info!(account_id = %account.id, "OTP issued");
    Ok(())
}

/// Consumes the OTP and opens the password reset window.
pub async fn verify_otp(db: &PgPool, kind: AccountKind, email: &str, submitted: &str) -> Result<()> {
    let account = credentials(db, kind, email).await?.ok_or_else(|| NurseryError::not_found(kind.label()))?;
    let now = Utc::now();
    match Otp::check(account.otp.as_deref(), account.otp_expires_at, account.otp_attempts, submitted.trim(), now) {
        Ok(()) => {}
        Err(OtpError::Invalid) => {
            let sql = format!("UPDATE {} SET otp_attempts = otp_attempts + 1, updated_at = NOW() WHERE id = $1 RETURNING otp_attempts", kind.table());
            let (attempts,): (i32,) = sqlx::query_as(&sql).bind(account.id).fetch_one(db).await?;
            if attempts >= Otp::MAX_ATTEMPTS {
                warn!(account_id = %account.id, attempts, "OTP locked after repeated wrong codes");
                let sql = format!("UPDATE {} SET otp = NULL, otp_expires_at = NULL WHERE id = $1", kind.table());
                sqlx::query(&sql).bind(account.id).execute(db).await?;
            }
            return Err(OtpError::Invalid.into());
        }
        Err(e) => return Err(e.into()),
    }
    let sql = format!(
        "UPDATE {} SET otp = NULL, otp_expires_at = NULL, otp_attempts = 0, reset_allowed_until = $2, updated_at = NOW() WHERE id = $1",
        kind.table()
    );
    sqlx::query(&sql).bind(account.id).bind(now + reset_window()).execute(db).await?;
    Ok(())
}

pub async fn reset_password(db: &PgPool, kind: AccountKind, email: &str, new_password: &str) -> Result<()> {
    let account = credentials(db, kind, email).await?.ok_or_else(|| NurseryError::not_found(kind.label()))?;
    if !account.reset_allowed_until.is_some_and(|until| until > Utc::now()) {
        return Err(NurseryError::bad_request("Please verify the OTP before resetting your password"));
    }
    set_password(db, kind, account.id, &account.password_hash, new_password).await?;
    info!(account_id = %account.id, "Password reset");
    Ok(())
}

async fn set_password(db: &PgPool, kind: AccountKind, id: Uuid, current_hash: &str, new_password: &str) -> Result<()> {
    if auth::verify_password(new_password, current_hash).await? {
        return Err(NurseryError::bad_request("New password must be different from the current password"));
    }
    let hash = auth::hash_password(new_password).await?;
    let sql = format!("UPDATE {} SET password_hash = $2, reset_allowed_until = NULL, updated_at = NOW() WHERE id = $1", kind.table());
    sqlx::query(&sql).bind(id).bind(&hash).execute(db).await?;
    Ok(())
}

pub async fn update_admin_profile(db: &PgPool, admin_id: Uuid, name: Option<&str>, password: Option<&str>) -> Result<Profile> {
    if let Some(password) = password {
        let (hash,): (String,) = sqlx::query_as("SELECT password_hash FROM admins WHERE id = $1")
            .bind(admin_id)
            .fetch_optional(db)
            .await?
            .ok_or_else(|| NurseryError::not_found("Admin"))?;
        set_password(db, AccountKind::Admin, admin_id, &hash, password).await?;
    }
    if let Some(name) = name {
        sqlx::query("UPDATE admins SET name = $2, updated_at = NOW() WHERE id = $1").bind(admin_id).bind(name).execute(db).await?;
    }
    profile(db, AccountKind::Admin, admin_id).await
}

/// Creates the configured admin when no admin with that email exists.
pub async fn bootstrap_admin(db: &PgPool, bootstrap: &AdminBootstrap) -> Result<bool> {
    if credentials(db, AccountKind::Admin, &bootstrap.email).await?.is_some() {
        return Ok(false);
    }
    let hash = auth::hash_password(&bootstrap.password).await?;
    sqlx::query("INSERT INTO admins (id, email, password_hash, created_at, updated_at) VALUES ($1, $2, $3, NOW(), NOW()) ON CONFLICT (email) DO NOTHING")
        .bind(Uuid::now_v7())
        .bind(normalize_email(&bootstrap.email))
        .bind(&hash)
        .execute(db)
        .await?;
    info!(email = %bootstrap.email, "Seeded admin account");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalization() {
        assert_eq!(normalize_email("  Anil@Example.COM "), "anil@example.com");
    }

    #[test]
    fn test_kind_maps_to_role_and_table() {
        assert_eq!(AccountKind::Admin.role(), Role::Admin);
        assert_eq!(AccountKind::User.table(), "users");
        assert!(AccountKind::Admin.profile_columns().contains("NULL::TEXT AS phone"));
    }
}
