//! Daily, weekly and monthly activity summaries mailed to the admin.
use std::future::Future;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Timelike, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use crate::domain::value_objects::Paise;
use crate::http::AppState;
use crate::services::calendar::{first_of_month, Calendar};
use crate::services::dashboard;
use crate::services::settings::{self, Settings};
use crate::Result;

const TICK: std::time::Duration = std::time::Duration::from_secs(300);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryPeriod { Daily, Weekly, Monthly }

impl SummaryPeriod {
    pub const ALL: [SummaryPeriod; 3] = [Self::Daily, Self::Weekly, Self::Monthly];

    pub fn label(&self) -> &'static str {
        match self { Self::Daily => "Daily", Self::Weekly => "Weekly", Self::Monthly => "Monthly" }
    }

    fn key(&self) -> &'static str {
        match self { Self::Daily => "daily", Self::Weekly => "weekly", Self::Monthly => "monthly" }
    }

    pub fn enabled(&self, settings: &Settings) -> bool {
        match self {
            Self::Daily => settings.daily_summary,
            Self::Weekly => settings.weekly_summary,
            Self::Monthly => settings.monthly_summary,
        }
    }

    /// First and last day of the latest period that ended before `today`:
    /// yesterday, the previous Monday-to-Sunday week, or the previous month.
    pub fn last_complete(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            Self::Daily => {
                let yesterday = today - Duration::days(1);
                (yesterday, yesterday)
            }
            Self::Weekly => {
                let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()) + 7);
                (monday, monday + Duration::days(6))
            }
            Self::Monthly => {
                let this_month = first_of_month(today);
                let start = this_month.checked_sub_months(Months::new(1)).unwrap_or(this_month);
                (start, this_month - Duration::days(1))
            }
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub period: SummaryPeriod,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub visitors: i64,
    pub orders: i64,
    pub revenue: Paise,
    pub pending_revenue: Paise,
}

pub async fn build(db: &PgPool, calendar: &Calendar, period: SummaryPeriod, today: NaiveDate) -> Result<SummaryReport> {
    let (start, end) = period.last_complete(today);
    let totals = dashboard::totals(db, calendar.days(start, end)).await?;
    Ok(SummaryReport {
        period,
        start,
        end,
        visitors: totals.visitors,
        orders: totals.orders,
        revenue: Paise::new(totals.revenue),
        pending_revenue: Paise::new(totals.pending),
    })
}

/// Builds the latest report for an admin request, mailing it when that
/// summary is switched on.
pub async fn on_demand(state: &AppState, period: SummaryPeriod) -> Result<SummaryReport> {
    let calendar = state.calendar();
    let report = build(&state.db, &calendar, period, calendar.today(Utc::now())).await?;
    if period.enabled(&settings::load(&state.db).await?) {
        if let Err(e) = state.notifier.summary(&report).await {
            warn!(period = period.key(), error = %e, "Summary mail failed");
        }
    }
    Ok(report)
}

pub fn spawn_scheduler(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = run_due(&state, Utc::now()).await {
                error!(error = %e, "Summary run failed");
            }
        }
    })
}

/// Records which summaries went out, so each period is mailed once across instances.
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Returns `false` when the period was already claimed.
    async fn claim(&self, period: SummaryPeriod, start: NaiveDate) -> Result<bool>;
    async fn release(&self, period: SummaryPeriod, start: NaiveDate) -> Result<()>;
}

#[async_trait]
impl RunLedger for PgPool {
    async fn claim(&self, period: SummaryPeriod, start: NaiveDate) -> Result<bool> {
        let inserted = sqlx::query("INSERT INTO summary_runs (period, period_start, sent_at) VALUES ($1, $2, NOW()) ON CONFLICT DO NOTHING")
            .bind(period.key())
            .bind(start)
            .execute(self)
            .await?
            .rows_affected();
        Ok(inserted == 1)
    }

    async fn release(&self, period: SummaryPeriod, start: NaiveDate) -> Result<()> {
        sqlx::query("DELETE FROM summary_runs WHERE period = $1 AND period_start = $2")
            .bind(period.key())
            .bind(start)
            .execute(self)
            .await?;
        Ok(())
    }
}

/// Claims the period, then runs `send`. Any failure of `send` gives the claim
/// back so a later tick retries. Returns whether the summary went out.
pub async fn run_claimed<F>(ledger: &dyn RunLedger, period: SummaryPeriod, start: NaiveDate, send: F) -> Result<bool>
where
    F: Future<Output = Result<()>> + Send,
{
    if !ledger.claim(period, start).await? {
        return Ok(false);
    }
    match send.await {
        Ok(()) => {
            info!(period = period.key(), %start, "📊 Summary sent");
            Ok(true)
        }
        Err(e) => {
            warn!(period = period.key(), %start, error = %e, "Summary not sent, claim released");
            ledger.release(period, start).await?;
            Ok(false)
        }
    }
}

/// Sends every enabled summary whose latest period has not been sent yet,
/// once the business clock has reached the configured hour.
pub async fn run_due(state: &AppState, now: DateTime<Utc>) -> Result<()> {
    if now.with_timezone(&state.config.business_offset).hour() < state.config.summary_hour {
        return Ok(());
    }
    let settings = settings::load(&state.db).await?;
    let calendar = state.calendar();
    let today = calendar.today(now);
    for period in SummaryPeriod::ALL.into_iter().filter(|p| p.enabled(&settings)) {
        let (start, _) = period.last_complete(today);
        let send = async {
            let report = build(&state.db, &calendar, period, today).await?;
            state.notifier.summary(&report).await.map_err(anyhow::Error::from)?;
            Ok(())
        };
        run_claimed(&state.db, period, start, send).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use crate::NurseryError;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

    #[derive(Default)]
    struct MemoryLedger {
        runs: Mutex<HashSet<(&'static str, NaiveDate)>>,
    }

    #[async_trait]
    impl RunLedger for MemoryLedger {
        async fn claim(&self, period: SummaryPeriod, start: NaiveDate) -> Result<bool> {
            Ok(self.runs.lock().unwrap().insert((period.key(), start)))
        }

        async fn release(&self, period: SummaryPeriod, start: NaiveDate) -> Result<()> {
            self.runs.lock().unwrap().remove(&(period.key(), start));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_send_releases_claim() {
        let ledger = MemoryLedger::default();
        let start = day(2025, 6, 9);
        let failed = run_claimed(&ledger, SummaryPeriod::Weekly, start, async { Err(NurseryError::bad_request("report query failed")) }).await;
        assert!(!failed.unwrap());
        assert!(ledger.runs.lock().unwrap().is_empty());

        assert!(run_claimed(&ledger, SummaryPeriod::Weekly, start, async { Ok(()) }).await.unwrap());
        assert!(!run_claimed(&ledger, SummaryPeriod::Weekly, start, async { Ok(()) }).await.unwrap());
        assert!(ledger.runs.lock().unwrap().contains(&("weekly", start)));
    }

    #[tokio::test]
    async fn test_claimed_period_does_not_run_send() {
        let ledger = MemoryLedger::default();
        let start = day(2025, 6, 17);
        ledger.claim(SummaryPeriod::Daily, start).await.unwrap();
        let ran = AtomicBool::new(false);
        let send = async {
            ran.store(true, Ordering::SeqCst);
            Ok(())
        };
        assert!(!run_claimed(&ledger, SummaryPeriod::Daily, start, send).await.unwrap());
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_daily_window_is_yesterday() {
        assert_eq!(SummaryPeriod::Daily.last_complete(day(2025, 3, 1)), (day(2025, 2, 28), day(2025, 2, 28)));
    }

    #[test]
    fn test_weekly_window_is_previous_iso_week() {
        // 2025-06-18 is a Wednesday.
        assert_eq!(SummaryPeriod::Weekly.last_complete(day(2025, 6, 18)), (day(2025, 6, 9), day(2025, 6, 15)));
        // On a Monday the week that just ended is reported.
        assert_eq!(SummaryPeriod::Weekly.last_complete(day(2025, 6, 16)), (day(2025, 6, 9), day(2025, 6, 15)));
    }

    #[test]
    fn test_monthly_window_is_previous_month() {
        assert_eq!(SummaryPeriod::Monthly.last_complete(day(2025, 3, 14)), (day(2025, 2, 1), day(2025, 2, 28)));
        assert_eq!(SummaryPeriod::Monthly.last_complete(day(2025, 1, 1)), (day(2024, 12, 1), day(2024, 12, 31)));
    }

    #[test]
    fn test_enabled_follows_settings() {
        let settings = Settings {
            new_bookings: true,
            payment_confirmations: true,
            daily_summary: false,
            weekly_summary: true,
            monthly_summary: false,
            updated_at: Utc::now(),
        };
        let enabled: Vec<_> = SummaryPeriod::ALL.into_iter().filter(|p| p.enabled(&settings)).collect();
        assert_eq!(enabled, vec![SummaryPeriod::Weekly]);
        assert_eq!(SummaryPeriod::Weekly.label(), "Weekly");
    }
}
