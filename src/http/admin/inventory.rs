//! Monthly growing capacity.
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use super::unique_or;
use crate::auth::AdminUser;
use crate::domain::value_objects::MonthKey;
use crate::http::extract::ValidatedJson;
use crate::http::{message, AppState};
use crate::{NurseryError, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create-inventory", post(create))
        .route("/fetch-inventory", get(list))
        .route("/fetch-inventory/:month", get(by_month))
        .route("/update-inventory/:month", put(update))
        .route("/delete-inventory/:id", delete(remove))
        .route("/update-inventory-status/:id", put(set_status))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub id: Uuid,
    pub month: String,
    pub max_quantity: i32,
    pub current_quantity: i32,
    pub active: bool,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn check_capacity(current: i32, max: i32) -> Result<()> {
    if current > max {
        return Err(NurseryError::bad_request("Current quantity cannot exceed maximum quantity"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateInventoryRequest {
    pub month: String,
    #[validate(range(min = 0, message = "Maximum quantity cannot be negative"))]
    pub max_quantity: i32,
    #[validate(range(min = 0, message = "Current quantity cannot be negative"))]
    pub current_quantity: Option<i32>,
    pub active: Option<bool>,
    pub reason: Option<String>,
}

async fn create(State(s): State<AppState>, _admin: AdminUser, ValidatedJson(r): ValidatedJson<CreateInventoryRequest>) -> Result<(StatusCode, Json<Inventory>)> {
    let month: MonthKey = r.month.parse()?;
    let current = r.current_quantity.unwrap_or(0);
    check_capacity(current, r.max_quantity)?;
    let row = sqlx::query_as::<_, Inventory>(
        "INSERT INTO inventory (id, month, max_quantity, current_quantity, active, reason, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7()).bind(month.to_string()).bind(r.max_quantity).bind(current).bind(r.active.unwrap_or(true)).bind(&r.reason)
    .fetch_one(&s.db)
    .await
    .map_err(|e| unique_or(e, "Inventory already exists for this month"))?;
    tracing::info!(month = %month, max = row.max_quantity, "Inventory created");
    Ok((StatusCode::CREATED, Json(row)))
}

async fn list(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Inventory>>> {
    Ok(Json(sqlx::query_as::<_, Inventory>("SELECT * FROM inventory ORDER BY month").fetch_all(&s.db).await?))
}

async fn by_month(State(s): State<AppState>, _admin: AdminUser, Path(month): Path<String>) -> Result<Json<Inventory>> {
    let month: MonthKey = month.parse()?;
    sqlx::query_as::<_, Inventory>("SELECT * FROM inventory WHERE month = $1").bind(month.to_string()).fetch_optional(&s.db).await?
        .map(Json).ok_or_else(|| NurseryError::not_found("Inventory"))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInventoryRequest {
    #[validate(range(min = 0, message = "Maximum quantity cannot be negative"))]
    pub max_quantity: Option<i32>,
    #[validate(range(min = 0, message = "Current quantity cannot be negative"))]
    pub current_quantity: Option<i32>,
    pub reason: Option<String>,
}

async fn update(State(s): State<AppState>, _admin: AdminUser, Path(month): Path<String>, ValidatedJson(r): ValidatedJson<UpdateInventoryRequest>) -> Result<Json<Inventory>> {
    let month: MonthKey = month.parse()?;
    let mut tx = s.db.begin().await?;
    let existing = sqlx::query_as::<_, Inventory>("SELECT * FROM inventory WHERE month = $1 FOR UPDATE")
        .bind(month.to_string()).fetch_optional(&mut *tx).await?
        .ok_or_else(|| NurseryError::not_found("Inventory"))?;
    let max = r.max_quantity.unwrap_or(existing.max_quantity);
    let current = r.current_quantity.unwrap_or(existing.current_quantity);
    check_capacity(current, max)?;
    let row = sqlx::query_as::<_, Inventory>(
        "UPDATE inventory SET max_quantity = $2, current_quantity = $3, reason = COALESCE($4, reason), updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(existing.id).bind(max).bind(current).bind(&r.reason)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(Json(row))
}

async fn remove(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>> {
    let deleted = sqlx::query("DELETE FROM inventory WHERE id = $1").bind(id).execute(&s.db).await?.rows_affected();
    if deleted == 0 { return Err(NurseryError::not_found("Inventory")); }
    Ok(message("Inventory deleted successfully"))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub active: bool,
    pub reason: Option<String>,
}

impl StatusRequest {
    /// Closing a month needs a reason; reopening clears it.
    fn reason(&self) -> Result<Option<&str>> {
        let reason = self.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
        match (self.active, reason) {
            (true, _) => Ok(None),
            (false, Some(reason)) => Ok(Some(reason)),
            (false, None) => Err(NurseryError::bad_request("Reason is required when deactivating inventory")),
        }
    }
}

async fn set_status(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, Json(r): Json<StatusRequest>) -> Result<Json<Inventory>> {
    let reason = r.reason()?;
    sqlx::query_as::<_, Inventory>("UPDATE inventory SET active = $2, reason = $3, updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(id).bind(r.active).bind(reason)
        .fetch_optional(&s.db).await?
        .map(Json).ok_or_else(|| NurseryError::not_found("Inventory"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity() {
        assert!(check_capacity(10, 10).is_ok());
        assert!(check_capacity(11, 10).is_err());
    }

    #[test]
    fn test_deactivation_needs_reason() {
        let closing = StatusRequest { active: false, reason: Some("  ".into()) };
        assert!(closing.reason().is_err());
        let closing = StatusRequest { active: false, reason: Some("Monsoon".into()) };
        assert_eq!(closing.reason().unwrap(), Some("Monsoon"));
        let reopening = StatusRequest { active: true, reason: Some("ignored".into()) };
        assert_eq!(reopening.reason().unwrap(), None);
    }
}
