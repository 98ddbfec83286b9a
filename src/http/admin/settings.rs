use axum::{
    extract::State,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use crate::auth::AdminUser;
use crate::http::AppState;
use crate::services::settings::{self, Settings};
use crate::services::summary::{self, SummaryPeriod, SummaryReport};
use crate::Result;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/settings/toggle", patch(toggle).put(toggle))
        .route("/fetch-settings", get(fetch))
        .route("/daily-summary", get(daily))
        .route("/weekly-summary", get(weekly))
        .route("/monthly-summary", get(monthly))
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest { pub field: String }

async fn toggle(State(s): State<AppState>, admin: AdminUser, Json(r): Json<ToggleRequest>) -> Result<Json<serde_json::Value>> {
    let updated = settings::toggle(&s.db, r.field.trim()).await?;
    tracing::info!(admin_id = %admin.id, field = %r.field, "Setting toggled");
    Ok(Json(json!({ "message": "Setting updated successfully", "settings": updated })))
}

async fn fetch(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<Settings>> {
    Ok(Json(settings::load(&s.db).await?))
}

async fn daily(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<SummaryReport>> {
    Ok(Json(summary::on_demand(&s, SummaryPeriod::Daily).await?))
}

async fn weekly(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<SummaryReport>> {
    Ok(Json(summary::on_demand(&s, SummaryPeriod::Weekly).await?))
}

async fn monthly(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<SummaryReport>> {
    Ok(Json(summary::on_demand(&s, SummaryPeriod::Monthly).await?))
}
