//! Admin notification switches.
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use crate::{NurseryError, Result};

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub new_bookings: bool,
    pub payment_confirmations: bool,
    pub daily_summary: bool,
    pub weekly_summary: bool,
    pub monthly_summary: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingField { NewBookings, PaymentConfirmations, DailySummary, WeeklySummary, MonthlySummary }

impl SettingField {
    pub const ALL: [SettingField; 5] =
        [Self::NewBookings, Self::PaymentConfirmations, Self::DailySummary, Self::WeeklySummary, Self::MonthlySummary];

    /// Name used by the API.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewBookings => "newBookings",
            Self::PaymentConfirmations => "paymentConfirmations",
            Self::DailySummary => "dailySummary",
            Self::WeeklySummary => "weeklySummary",
            Self::MonthlySummary => "monthlySummary",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Self::NewBookings => "new_bookings",
            Self::PaymentConfirmations => "payment_confirmations",
            Self::DailySummary => "daily_summary",
            Self::WeeklySummary => "weekly_summary",
            Self::MonthlySummary => "monthly_summary",
        }
    }

    pub fn parse(name: &str) -> Option<Self> { Self::ALL.into_iter().find(|f| f.name() == name) }
}

pub async fn load(db: &PgPool) -> Result<Settings> {
    Ok(sqlx::query_as::<_, Settings>(
        "SELECT new_bookings, payment_confirmations, daily_summary, weekly_summary, monthly_summary, updated_at FROM settings WHERE id = 1",
    )
    .fetch_one(db)
    .await?)
}

/// Flips one switch and returns the stored row.
pub async fn toggle(db: &PgPool, field: &str) -> Result<Settings> {
    let field = SettingField::parse(field).ok_or_else(|| NurseryError::bad_request("Invalid field name"))?;
    let column = field.column();
    let sql = format!(
        "UPDATE settings SET {column} = NOT {column}, updated_at = NOW() WHERE id = 1 \
         RETURNING new_bookings, payment_confirmations, daily_summary, weekly_summary, monthly_summary, updated_at"
    );
    let settings = sqlx::query_as::<_, Settings>(&sql).fetch_one(db).await?;
    tracing::info!(field = field.name(), "Notification setting toggled");
    Ok(settings)
}
