//! Customers, callback requests and contact-form messages.
use axum::{
    extract::{Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;
use super::{push_created_range, push_search};
use crate::auth::AdminUser;
use crate::http::extract::{ListQuery, Page, PaginatedResponse};
use crate::http::{message, AppState};
use crate::services::accounts::Profile;
use crate::services::calendar::Calendar;
use crate::{NurseryError, Result};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/fetch-all-users/:page", get(users))
        .route("/export-all-users", get(export_users))
        .route("/delete-user/:id", delete(delete_user))
        .route("/fetch-all-callbacks/:page", get(callbacks))
        .route("/delete-callback/:id", delete(delete_callback))
        .route("/fetch-all-contacts/:page", get(contacts))
        .route("/delete-contact/:id", delete(delete_contact))
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Callback {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ContactForm {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// `select` must end with a `FROM` clause; filters apply to `created_column`.
fn filtered(select: &str, search: &[&str], created_column: &str, q: &ListQuery, calendar: &Calendar) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(select);
    qb.push(" WHERE TRUE");
    push_search(&mut qb, search, q);
    push_created_range(&mut qb, created_column, q, calendar);
    qb
}

/// Fetches one page of a filtered listing plus the matching total.
async fn page_of<T>(s: &AppState, mut rows: QueryBuilder<'static, Postgres>, mut count: QueryBuilder<'static, Postgres>, order_by: &str, page: Page) -> Result<PaginatedResponse<T>>
where
    T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
{
    rows.push(format!(" ORDER BY {order_by} LIMIT ")).push_bind(page.limit()).push(" OFFSET ").push_bind(page.offset());
    let data = rows.build_query_as::<T>().fetch_all(&s.db).await?;
    let (total,): (i64,) = count.build_query_as().fetch_one(&s.db).await?;
    Ok(PaginatedResponse::new(data, total, page))
}

const USER_SEARCH: [&str; 3] = ["name", "email", "phone"];

async fn users(State(s): State<AppState>, _admin: AdminUser, Path(page): Path<u32>, Query(q): Query<ListQuery>) -> Result<Json<PaginatedResponse<Profile>>> {
    let calendar = s.calendar();
    let rows = filtered("SELECT id, name, email, phone, created_at FROM users", &USER_SEARCH, "created_at", &q, &calendar);
    let count = filtered("SELECT COUNT(*) FROM users", &USER_SEARCH, "created_at", &q, &calendar);
    Ok(Json(page_of(&s, rows, count, "created_at DESC", Page::new(page)).await?))
}

async fn export_users(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Profile>>> {
    Ok(Json(sqlx::query_as::<_, Profile>("SELECT id, name, email, phone, created_at FROM users ORDER BY created_at DESC").fetch_all(&s.db).await?))
}

async fn delete_user(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>> {
    let deleted = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&s.db).await?.rows_affected();
    if deleted == 0 { return Err(NurseryError::not_found("User")); }
    tracing::info!(user_id = %id, "User deleted");
    Ok(message("User deleted successfully"))
}

const CALLBACK_SEARCH: [&str; 3] = ["u.name", "u.email", "u.phone"];

async fn callbacks(State(s): State<AppState>, _admin: AdminUser, Path(page): Path<u32>, Query(q): Query<ListQuery>) -> Result<Json<PaginatedResponse<Callback>>> {
    let calendar = s.calendar();
    let rows = filtered(
        "SELECT c.id, c.user_id, u.name, u.email, u.phone, c.created_at FROM callbacks c JOIN users u ON u.id = c.user_id",
        &CALLBACK_SEARCH, "c.created_at", &q, &calendar,
    );
    let count = filtered("SELECT COUNT(*) FROM callbacks c JOIN users u ON u.id = c.user_id", &CALLBACK_SEARCH, "c.created_at", &q, &calendar);
    Ok(Json(page_of(&s, rows, count, "c.created_at DESC", Page::new(page)).await?))
}

async fn delete_callback(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>> {
    let deleted = sqlx::query("DELETE FROM callbacks WHERE id = $1").bind(id).execute(&s.db).await?.rows_affected();
    if deleted == 0 { return Err(NurseryError::not_found("Callback")); }
    Ok(message("Callback deleted successfully"))
}

const CONTACT_SEARCH: [&str; 4] = ["name", "email", "phone", "message"];

async fn contacts(State(s): State<AppState>, _admin: AdminUser, Path(page): Path<u32>, Query(q): Query<ListQuery>) -> Result<Json<PaginatedResponse<ContactForm>>> {
    let calendar = s.calendar();
    let rows = filtered("SELECT * FROM contact_forms", &CONTACT_SEARCH, "created_at", &q, &calendar);
    let count = filtered("SELECT COUNT(*) FROM contact_forms", &CONTACT_SEARCH, "created_at", &q, &calendar);
    Ok(Json(page_of(&s, rows, count, "created_at DESC", Page::new(page)).await?))
}

async fn delete_contact(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<serde_json::Value>> {
    let deleted = sqlx::query("DELETE FROM contact_forms WHERE id = $1").bind(id).execute(&s.db).await?.rows_affected();
    if deleted == 0 { return Err(NurseryError::not_found("Contact")); }
    Ok(message("Contact deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_callback_filter_qualifies_columns() {
        let calendar = Calendar::new(FixedOffset::east_opt(0).unwrap());
        let q = ListQuery { search: Some("ravi".into()), ..Default::default() };
        let qb = filtered("SELECT COUNT(*) FROM callbacks c JOIN users u ON u.id = c.user_id", &CALLBACK_SEARCH, "c.created_at", &q, &calendar);
        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM callbacks c JOIN users u ON u.id = c.user_id WHERE TRUE AND (u.name ILIKE $1 OR u.email ILIKE $2 OR u.phone ILIKE $3)"
        );
    }
}
