//! Admin back office. Everything here needs an admin token except sign-in,
//! password recovery and the public content reads.
pub mod auth;
pub mod blog;
pub mod content;
pub mod inventory;
pub mod locations;
pub mod orders;
pub mod payments;
pub mod refunds;
pub mod settings;
pub mod users;

use axum::Router;
use chrono::Duration;
use sqlx::{Postgres, QueryBuilder};
use super::extract::ListQuery;
use super::AppState;
use crate::services::calendar::Calendar;
use crate::NurseryError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(auth::routes())
        .merge(locations::routes())
        .merge(inventory::routes())
        .merge(orders::routes())
        .merge(payments::routes())
        .merge(refunds::routes())
        .merge(users::routes())
        .merge(settings::routes())
        .merge(content::routes())
        .merge(blog::routes())
}

/// `AND <column> >= .. AND <column> < ..` over whole business days of the
/// query's `startDate..=endDate`.
pub(crate) fn push_created_range(qb: &mut QueryBuilder<'static, Postgres>, column: &str, q: &ListQuery, calendar: &Calendar) {
    if let Some(from) = q.start_date {
        qb.push(format!(" AND {column} >= ")).push_bind(calendar.start_of(from));
    }
    if let Some(to) = q.end_date {
        qb.push(format!(" AND {column} < ")).push_bind(calendar.start_of(to + Duration::days(1)));
    }
}

/// `AND (<col> ILIKE $n OR ...)` when a search term was given.
pub(crate) fn push_search(qb: &mut QueryBuilder<'static, Postgres>, columns: &[&str], q: &ListQuery) {
    let Some(pattern) = q.search_pattern() else { return };
    qb.push(" AND (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 { qb.push(" OR "); }
        qb.push(format!("{column} ILIKE ")).push_bind(pattern.clone());
    }
    qb.push(")");
}

/// Turns a unique-key violation into a 409 with a readable message.
pub(crate) fn unique_or(err: sqlx::Error, message: &str) -> NurseryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => NurseryError::Conflict(message.to_string()),
        _ => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};

    #[test]
    fn test_filters_render_placeholders() {
        let q = ListQuery {
            search: Some("meera".into()),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 31),
            ..Default::default()
        };
        let calendar = Calendar::new(FixedOffset::east_opt(330 * 60).unwrap());
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM orders WHERE TRUE");
        push_search(&mut qb, &["full_name", "phone"], &q);
        push_created_range(&mut qb, "created_at", &q, &calendar);
        assert_eq!(
            qb.sql(),
            "SELECT * FROM orders WHERE TRUE AND (full_name ILIKE $1 OR phone ILIKE $2) AND created_at >= $3 AND created_at < $4"
        );
    }

    #[test]
    fn test_no_filters_leave_query_untouched() {
        let calendar = Calendar::new(FixedOffset::east_opt(0).unwrap());
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 WHERE TRUE");
        push_search(&mut qb, &["name"], &ListQuery::default());
        push_created_range(&mut qb, "created_at", &ListQuery::default(), &calendar);
        assert_eq!(qb.sql(), "SELECT 1 WHERE TRUE");
    }
}
