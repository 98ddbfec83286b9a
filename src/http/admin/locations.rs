//! Delivery locations with per-district pricing and quantity limits.
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;
use super::{push_search, unique_or};
use crate::auth::AdminUser;
use crate::domain::value_objects::Paise;
use crate::http::extract::{ListQuery, Page, PaginatedResponse, ValidatedJson};
use crate::http::orders::RupeeAmount;
use crate::http::{message, AppState};
use crate::{NurseryError, Result};

const DUPLICATE: &str = "Location already exists for this state and district";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/add-location", post(add_location))
        .route("/fetch-all-locations/:page", get(list_locations))
        .route("/download-locations", get(download_locations))
        .route("/edit-location/:id", put(edit_location))
        .route("/delete-location/:id", delete(delete_location))
        .route("/get-states", get(states))
        .route("/get-districts/:state", get(districts))
        .route("/toggle-location-status/:id", patch(toggle_status).put(toggle_status))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: Uuid,
    pub state: String,
    pub district: String,
    pub pin_code: String,
    pub min_quantity: i32,
    pub max_quantity: i32,
    pub price_per_unit_paise: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LocationRequest {
    #[validate(length(min = 1, max = 100, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, max = 100, message = "District is required"))]
    pub district: String,
    #[validate(length(min = 6, max = 6, message = "Pin code must be 6 digits"))]
    pub pin_code: String,
    #[validate(range(min = 1, message = "Minimum quantity must be at least 1"))]
    pub min_quantity: i32,
    #[validate(range(min = 1, message = "Maximum quantity must be at least 1"))]
    pub max_quantity: i32,
    pub price_per_unit: RupeeAmount,
    pub is_active: Option<bool>,
}

impl LocationRequest {
    fn price(&self) -> Result<Paise> {
        if self.min_quantity > self.max_quantity {
            return Err(NurseryError::bad_request("Minimum quantity cannot exceed maximum quantity"));
        }
        let price = self.price_per_unit.to_paise()?;
        if !price.is_positive() {
            return Err(NurseryError::bad_request("Price must be greater than zero"));
        }
        Ok(price)
    }
}

async fn add_location(State(s): State<AppState>, _admin: AdminUser, ValidatedJson(r): ValidatedJson<LocationRequest>) -> Result<(StatusCode, Json<Location>)> {
    let price = r.price()?;
    let location = sqlx::query_as::<_, Location>(
        "INSERT INTO locations (id, state, district, pin_code, min_quantity, max_quantity, price_per_unit_paise, is_active, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7()).bind(r.state.trim()).bind(r.district.trim()).bind(r.pin_code.trim())
    .bind(r.min_quantity).bind(r.max_quantity).bind(price.value()).bind(r.is_active.unwrap_or(true))
    .fetch_one(&s.db)
    .await
    .map_err(|e| unique_or(e, DUPLICATE))?;
    tracing::info!(location_id = %location.id, state = %location.state, district = %location.district, "Location added");
    Ok((StatusCode::CREATED, Json(location)))
}

fn filtered(select: &str, q: &ListQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(select);
    push_search(&mut qb, &["state", "district", "pin_code"], q);
    if let Some(state) = q.state.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        qb.push(" AND LOWER(state) = LOWER(").push_bind(state.to_string()).push(")");
    }
    if let Some(active) = q.is_active {
        qb.push(" AND is_active = ").push_bind(active);
    }
    qb
}

async fn list_locations(State(s): State<AppState>, _admin: AdminUser, Path(page): Path<u32>, Query(q): Query<ListQuery>) -> Result<Json<PaginatedResponse<Location>>> {
    let page = Page::new(page);
    let mut rows = filtered("SELECT * FROM locations WHERE TRUE", &q);
    rows.push(" ORDER BY state, district LIMIT ").push_bind(page.limit()).push(" OFFSET ").push_bind(page.offset());
    let data = rows.build_query_as::<Location>().fetch_all(&s.db).await?;
    let (total,): (i64,) = filtered("SELECT COUNT(*) FROM locations WHERE TRUE", &q).build_query_as().fetch_one(&s.db).await?;
    Ok(Json(PaginatedResponse::new(data, total, page)))
}

async fn download_locations(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Location>>> {
    Ok(Json(sqlx::query_as::<_, Location>("SELECT * FROM locations ORDER BY state, district").fetch_all(&s.db).await?))
}

async fn edit_location(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, ValidatedJson(r): ValidatedJson<LocationRequest>) -> Result<Json<Location>> {
    let price = r.price()?;
    sqlx::query_as::<_, Location>(
        "UPDATE locations SET state = $2, district = $3, pin_code = $4, min_quantity = $5, max_quantity = $6, \
         price_per_unit_paise = $7, is_active = COALESCE($8, is_active), updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id).bind(r.state.trim()).bind(r.district.trim()).bind(r.pin_code.trim())
    .bind(r.min_quantity).bind(r.max_quantity).bind(price.value()).bind(r.is_active)
    .fetch_optional(&s.db)
    .await
    .map_err(|e| unique_or(e, DUPLICATE))?
    .map(Json)
    .ok_or_else(|| NurseryError::not_found("Location"))
}

async fn delete_location(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>> {
    let deleted = sqlx::query("DELETE FROM locations WHERE id = $1").bind(id).execute(&s.db).await?.rows_affected();
    if deleted == 0 { return Err(NurseryError::not_found("Location")); }
    Ok(message("Location deleted successfully"))
}

async fn toggle_status(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Location>> {
    sqlx::query_as::<_, Location>("UPDATE locations SET is_active = NOT is_active, updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(id).fetch_optional(&s.db).await?
        .map(Json).ok_or_else(|| NurseryError::not_found("Location"))
}

/// States with at least one active location. Public, used by the order form.
async fn states(State(s): State<AppState>) -> Result<Json<Vec<String>>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT state FROM locations WHERE is_active ORDER BY state").fetch_all(&s.db).await?;
    Ok(Json(rows.into_iter().map(|(state,)| state).collect()))
}

/// Active districts of a state, matched case-insensitively. Public.
async fn districts(State(s): State<AppState>, Path(state): Path<String>) -> Result<Json<Vec<Location>>> {
    Ok(Json(
        sqlx::query_as::<_, Location>("SELECT * FROM locations WHERE LOWER(state) = LOWER($1) AND is_active ORDER BY district")
            .bind(state.trim())
            .fetch_all(&s.db)
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(min: i32, max: i32, price: &str) -> LocationRequest {
        LocationRequest {
            state: "Kerala".into(),
            district: "Idukki".into(),
            pin_code: "685501".into(),
            min_quantity: min,
            max_quantity: max,
            price_per_unit: RupeeAmount::Text(price.into()),
            is_active: None,
        }
    }

    #[test]
    fn test_price_and_quantity_rules() {
        assert_eq!(request(10, 500, "32.5").price().unwrap().value(), 3_250);
        assert!(request(600, 500, "32").price().is_err());
        assert!(request(1, 5, "0").price().is_err());
    }

    #[test]
    fn test_price_accepts_json_number() {
        let r: LocationRequest = serde_json::from_value(serde_json::json!({
            "state": "Kerala", "district": "Wayanad", "pinCode": "673121",
            "minQuantity": 5, "maxQuantity": 50, "pricePerUnit": 18.75
        }))
        .unwrap();
        assert_eq!(r.price().unwrap().value(), 1_875);
    }

    #[test]
    fn test_filters() {
        let q = ListQuery { state: Some("kerala".into()), is_active: Some(true), ..Default::default() };
        let qb = filtered("SELECT COUNT(*) FROM locations WHERE TRUE", &q);
        assert_eq!(qb.sql(), "SELECT COUNT(*) FROM locations WHERE TRUE AND LOWER(state) = LOWER($1) AND is_active = $2");
    }
}
