//! Admin dashboard figures: payment and refund cards, month-over-month
//! overview, visitor chart and revenue trend.
use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use crate::domain::aggregates::{OrderRefundStatus, OrderStatus, PaymentMethod, PaymentStatus, RefundStatus, StageStatus, StageType};
use crate::domain::value_objects::Paise;
use crate::services::calendar::{first_of_month, Calendar, MonthBucket, Window};
use crate::services::settings::SettingField;
use crate::{NurseryError, Result};

const MAX_CHART_MONTHS: usize = 36;

/// Activity within a window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct Totals {
    pub visitors: i64,
    pub orders: i64,
    pub revenue: i64,
    pub pending: i64,
}

/// New users, orders, captured revenue and unpaid order value in `window`.
pub async fn totals(db: &PgPool, window: Window) -> Result<Totals> {
    Ok(sqlx::query_as::<_, Totals>(
        "SELECT \
           (SELECT COUNT(*) FROM users WHERE created_at >= $1 AND created_at < $2) AS visitors, \
           (SELECT COUNT(*) FROM orders WHERE created_at >= $1 AND created_at < $2) AS orders, \
           (SELECT COALESCE(SUM(amount_paise), 0)::BIGINT FROM payments WHERE status = 'CAPTURED' AND created_at >= $1 AND created_at < $2) AS revenue, \
           (SELECT COALESCE(SUM(total_amount_paise), 0)::BIGINT FROM orders WHERE status = 'PENDING' AND created_at >= $1 AND created_at < $2) AS pending",
    )
    .bind(window.start)
    .bind(window.end)
    .fetch_one(db)
    .await?)
}

// =============================================================================
// Payment and refund cards
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    total_revenue: i64,
    successful_payments: i64,
    pending_payments: i64,
    total_refunded: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCards {
    pub total_revenue: i64,
    pub total_revenue_formatted: String,
    pub successful_payments: i64,
    pub pending_payments: i64,
    pub total_refunded: i64,
    pub total_refunded_formatted: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Inclusive business-day range for the cards, the month ending today unless given.
pub fn card_range(calendar: &Calendar, now: DateTime<Utc>, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<(NaiveDate, NaiveDate)> {
    let end_date = to.unwrap_or_else(|| calendar.today(now));
    let start_date = from.unwrap_or_else(|| end_date.checked_sub_months(Months::new(1)).unwrap_or(end_date));
    if start_date > end_date {
        return Err(NurseryError::bad_request("startDate must not be after endDate"));
    }
    Ok((start_date, end_date))
}

pub async fn payment_cards(db: &PgPool, calendar: &Calendar, now: DateTime<Utc>, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<PaymentCards> {
    let (start_date, end_date) = card_range(calendar, now, from, to)?;
    let window = calendar.days(start_date, end_date);
    let row = sqlx::query_as::<_, PaymentRow>(
        "SELECT \
           (SELECT COALESCE(SUM(total_amount_paise), 0)::BIGINT FROM orders WHERE status = 'PAID' AND created_at >= $1 AND created_at < $2) AS total_revenue, \
           (SELECT COUNT(*) FROM orders WHERE status = 'PAID' AND created_at >= $1 AND created_at < $2) AS successful_payments, \
           (SELECT COUNT(*) FROM orders WHERE status = 'PENDING' AND created_at >= $1 AND created_at < $2) AS pending_payments, \
           (SELECT COALESCE(SUM(amount_paise), 0)::BIGINT FROM refunds WHERE status = 'SUCCESS' AND created_at >= $1 AND created_at < $2) AS total_refunded",
    )
    .bind(window.start)
    .bind(window.end)
    .fetch_one(db)
    .await?;
    Ok(PaymentCards {
        total_revenue: row.total_revenue,
        total_revenue_formatted: Paise::new(row.total_revenue).format_inr(),
        successful_payments: row.successful_payments,
        pending_payments: row.pending_payments,
        total_refunded: row.total_refunded,
        total_refunded_formatted: Paise::new(row.total_refunded).format_inr(),
        start_date,
        end_date,
    })
}

#[derive(Debug, sqlx::FromRow)]
struct RefundRow {
    total_requests: i64,
    pending: i64,
    approved: i64,
    declined: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundCards {
    pub total_requests: i64,
    pub pending: i64,
    pub approved: i64,
    pub declined: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

const REFUND_CARDS_SQL: &str = "SELECT COUNT(*) AS total_requests, \
       COUNT(*) FILTER (WHERE refund_status = 'PENDING') AS pending, \
       COUNT(*) FILTER (WHERE refund_status = 'APPROVED') AS approved, \
       COUNT(*) FILTER (WHERE refund_status = 'CANCELLED') AS declined \
     FROM orders WHERE refund_status IS NOT NULL \
       AND COALESCE(refund_request_date, created_at) >= $1 AND COALESCE(refund_request_date, created_at) < $2";

/// Refund requests raised within the range, same defaults as the payment cards.
pub async fn refund_cards(db: &PgPool, calendar: &Calendar, now: DateTime<Utc>, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<RefundCards> {
    let (start_date, end_date) = card_range(calendar, now, from, to)?;
    let window = calendar.days(start_date, end_date);
    let row = sqlx::query_as::<_, RefundRow>(REFUND_CARDS_SQL).bind(window.start).bind(window.end).fetch_one(db).await?;
    Ok(RefundCards {
        total_requests: row.total_requests,
        pending: row.pending,
        approved: row.approved,
        declined: row.declined,
        start_date,
        end_date,
    })
}

/// Every lifecycle enum's values, for admin filter dropdowns.
pub fn enum_catalogue() -> serde_json::Value {
    json!({
        "paymentMethods": PaymentMethod::ALL,
        "orderPaymentStatus": OrderStatus::ALL,
        "paymentOrderStatus": PaymentStatus::ALL,
        "orderRefundTrackingStatus": OrderRefundStatus::ALL,
        "stageTypes": StageType::ALL,
        "stageStatus": StageStatus::ALL,
        "refundStatus": RefundStatus::ALL,
        "validSettings": SettingField::ALL.map(|f| f.name()),
    })
}

// =============================================================================
// Overview
// =============================================================================

/// Rounded percentage change, 0 when there is nothing to compare against.
pub fn percent_change(current: i64, previous: i64) -> i64 {
    if previous <= 0 {
        return 0;
    }
    ((current - previous) as f64 / previous as f64 * 100.0).round() as i64
}

pub fn change_label(change: i64) -> String {
    if change >= 0 { format!("+{change}%") } else { format!("{change}%") }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub count: i64,
    pub change: String,
    pub change_value: i64,
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    pub period: &'static str,
}

impl Metric {
    fn compare(label: &'static str, current: i64, previous: i64, money: bool) -> Self {
        let change_value = percent_change(current, previous);
        Self {
            count: current,
            change: change_label(change_value),
            change_value,
            label,
            formatted: money.then(|| Paise::new(current).format_inr()),
            period: "from last month",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_visitors: Metric,
    pub total_orders: Metric,
    pub total_revenue: Metric,
    pub pending_payments: Metric,
}

impl Overview {
    pub fn compare(current: Totals, previous: Totals) -> Self {
        Self {
            total_visitors: Metric::compare("Total Visitors", current.visitors, previous.visitors, false),
            total_orders: Metric::compare("Total Orders", current.orders, previous.orders, false),
            total_revenue: Metric::compare("Total Revenue", current.revenue, previous.revenue, true),
            pending_payments: Metric::compare("Pending Payments", current.pending, previous.pending, true),
        }
    }
}

/// This month so far against the whole previous month.
pub async fn overview(db: &PgPool, calendar: &Calendar, now: DateTime<Utc>) -> Result<Overview> {
    let this_month = first_of_month(calendar.today(now));
    let last_month = this_month.checked_sub_months(Months::new(1)).unwrap_or(this_month);
    let current = totals(db, Window { start: calendar.start_of(this_month), end: now }).await?;
    let previous = totals(db, calendar.month(last_month).window).await?;
    Ok(Overview::compare(current, previous))
}

// =============================================================================
// Monthly chart and revenue trend
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChartRange {
    LastMonths(u32),
    Custom { from: NaiveDate, to: NaiveDate },
}

impl ChartRange {
    /// A custom range wins when both dates are given; otherwise `period`
    /// (`last3months`, `last6months`, `last12months`), default six months.
    pub fn from_query(period: Option<&str>, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        if let (Some(from), Some(to)) = (start, end) {
            if from > to {
                return Err(NurseryError::bad_request("startDate must not be after endDate"));
            }
            return Ok(Self::Custom { from, to });
        }
        match period.map(str::trim).filter(|p| !p.is_empty()) {
            None | Some("last6months") => Ok(Self::LastMonths(6)),
            Some("last3months") => Ok(Self::LastMonths(3)),
            Some("last12months") => Ok(Self::LastMonths(12)),
            Some(other) => Err(NurseryError::bad_request(format!("Invalid period: {other}"))),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::LastMonths(n) => format!("last{n}months"),
            Self::Custom { from, to } => format!("{from} to {to}"),
        }
    }

    pub fn buckets(&self, calendar: &Calendar, today: NaiveDate) -> Result<Vec<MonthBucket>> {
        let buckets = match *self {
            Self::LastMonths(n) => calendar.last_months(today, n),
            Self::Custom { from, to } => calendar.months_between(from, to),
        };
        if buckets.len() > MAX_CHART_MONTHS {
            return Err(NurseryError::bad_request(format!("Date range may span at most {MAX_CHART_MONTHS} months")));
        }
        Ok(buckets)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyVisitors {
    pub month: String,
    pub full_month: String,
    pub visitors: i64,
}

#[derive(Debug, Serialize)]
pub struct ChartPoint {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorChart {
    pub period: String,
    pub monthly_visitors: Vec<MonthlyVisitors>,
    pub total: i64,
    pub chart_data: Vec<ChartPoint>,
}

pub async fn visitor_chart(db: &PgPool, calendar: &Calendar, range: ChartRange, now: DateTime<Utc>) -> Result<VisitorChart> {
    let mut monthly_visitors = Vec::new();
    for bucket in range.buckets(calendar, calendar.today(now))? {
        let (visitors,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE created_at >= $1 AND created_at < $2")
            .bind(bucket.window.start)
            .bind(bucket.window.end)
            .fetch_one(db)
            .await?;
        monthly_visitors.push(MonthlyVisitors { month: bucket.short_name(), full_month: bucket.full_name(), visitors });
    }
    let chart_data = monthly_visitors.iter().map(|m| ChartPoint { name: m.month.clone(), value: m.visitors }).collect();
    Ok(VisitorChart { period: range.label(), total: monthly_visitors.iter().map(|m| m.visitors).sum(), monthly_visitors, chart_data })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRevenue {
    pub month: String,
    pub full_month: String,
    pub revenue: i64,
    pub formatted: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSummary {
    pub total_revenue: i64,
    pub total_revenue_formatted: String,
    pub peak_revenue: i64,
    pub peak_revenue_formatted: String,
    pub peak_revenue_month: Option<String>,
    pub peak_revenue_full_month: Option<String>,
    pub trend: &'static str,
    pub trend_description: String,
}

#[derive(Debug, Serialize)]
pub struct RevenuePoint {
    pub month: String,
    pub revenue: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueGraph {
    pub period: String,
    pub revenue_trend: Vec<MonthlyRevenue>,
    pub summary: TrendSummary,
    pub chart_data: Vec<RevenuePoint>,
}

/// Upward when the last month is at least the one before it.
pub fn is_upward(values: &[i64]) -> bool {
    match values {
        [] => true,
        [.., previous, last] => last >= previous,
        [only] => *only >= 0,
    }
}

/// Index of the first month holding the maximum.
pub fn peak_index(values: &[i64]) -> Option<usize> {
    values.iter().enumerate().fold(None, |best: Option<(usize, i64)>, (i, &v)| match best {
        Some((_, max)) if v <= max => best,
        _ => Some((i, v)),
    })
    .map(|(i, _)| i)
}

pub fn summarize_trend(months: &[MonthlyRevenue]) -> TrendSummary {
    let values: Vec<i64> = months.iter().map(|m| m.revenue).collect();
    let total: i64 = values.iter().sum();
    let peak = peak_index(&values).map(|i| &months[i]);
    let peak_revenue = peak.map_or(0, |m| m.revenue);
    let trend = if is_upward(&values) { "upward" } else { "downward" };
    let peak_formatted = Paise::new(peak_revenue).format_inr();
    TrendSummary {
        total_revenue: total,
        total_revenue_formatted: Paise::new(total).format_inr(),
        peak_revenue,
        trend_description: format!("Showing {trend} trend with {peak_formatted} peak revenue"),
        peak_revenue_formatted: peak_formatted,
        peak_revenue_month: peak.map(|m| m.month.clone()),
        peak_revenue_full_month: peak.map(|m| m.full_month.clone()),
        trend,
    }
}

pub async fn revenue_graph(db: &PgPool, calendar: &Calendar, range: ChartRange, now: DateTime<Utc>) -> Result<RevenueGraph> {
    let mut revenue_trend = Vec::new();
    for bucket in range.buckets(calendar, calendar.today(now))? {
        let (revenue,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(amount_paise), 0)::BIGINT FROM payments WHERE status = 'CAPTURED' AND created_at >= $1 AND created_at < $2",
        )
        .bind(bucket.window.start)
        .bind(bucket.window.end)
        .fetch_one(db)
        .await?;
        revenue_trend.push(MonthlyRevenue {
            month: bucket.short_name(),
            full_month: bucket.full_name(),
            revenue,
            formatted: Paise::new(revenue).format_inr(),
        });
    }
    let chart_data = revenue_trend.iter().map(|m| RevenuePoint { month: m.month.clone(), revenue: m.revenue }).collect();
    Ok(RevenueGraph { period: range.label(), summary: summarize_trend(&revenue_trend), revenue_trend, chart_data })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(name: &str, revenue: i64) -> MonthlyRevenue {
        MonthlyRevenue { month: name.into(), full_month: format!("{name} 2025"), revenue, formatted: String::new() }
    }

    #[test]
    fn test_card_range_defaults_to_month_ending_today() {
        let calendar = Calendar::new(chrono::FixedOffset::east_opt(19_800).unwrap());
        let now = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap().and_hms_opt(20, 0, 0).unwrap().and_utc();
        let (start, end) = card_range(&calendar, now, None, None).unwrap();
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        let day = NaiveDate::from_ymd_opt(2025, 5, 10);
        assert_eq!(card_range(&calendar, now, day, day).unwrap(), (day.unwrap(), day.unwrap()));
        assert!(card_range(&calendar, now, NaiveDate::from_ymd_opt(2025, 6, 1), day).is_err());
    }

    #[test]
    fn test_refund_cards_filter_by_request_day() {
        assert!(REFUND_CARDS_SQL.contains("COALESCE(refund_request_date, created_at) >= $1"));
        assert!(REFUND_CARDS_SQL.contains("COALESCE(refund_request_date, created_at) < $2"));
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(150, 100), 50);
        assert_eq!(percent_change(1, 3), -67);
        assert_eq!(percent_change(10, 0), 0);
        assert_eq!(change_label(12), "+12%");
        assert_eq!(change_label(0), "+0%");
        assert_eq!(change_label(-5), "-5%");
    }

    #[test]
    fn test_overview_formats_money_metrics() {
        let current = Totals { visitors: 12, orders: 4, revenue: 1_250_000, pending: 0 };
        let previous = Totals { visitors: 10, orders: 4, revenue: 1_000_000, pending: 500 };
        let overview = Overview::compare(current, previous);
        assert_eq!(overview.total_visitors.change, "+20%");
        assert_eq!(overview.total_visitors.formatted, None);
        assert_eq!(overview.total_revenue.formatted.as_deref(), Some("₹12,500.00"));
        assert_eq!(overview.pending_payments.change_value, -100);
        assert_eq!(overview.total_orders.period, "from last month");
    }

    #[test]
    fn test_trend_summary() {
        let months = vec![month("Jan", 100), month("Feb", 300), month("Mar", 300), month("Apr", 200)];
        let summary = summarize_trend(&months);
        assert_eq!(summary.total_revenue, 900);
        assert_eq!(summary.peak_revenue_month.as_deref(), Some("Feb"));
        assert_eq!(summary.trend, "downward");
        assert_eq!(summary.trend_description, "Showing downward trend with ₹3.00 peak revenue");
    }

    #[test]
    fn test_trend_edges() {
        assert!(is_upward(&[]));
        assert!(is_upward(&[5, 5]));
        assert_eq!(peak_index(&[]), None);
        assert_eq!(summarize_trend(&[]).peak_revenue, 0);
    }

    #[test]
    fn test_chart_range_from_query() {
        assert_eq!(ChartRange::from_query(None, None, None).unwrap(), ChartRange::LastMonths(6));
        assert_eq!(ChartRange::from_query(Some("last3months"), None, None).unwrap(), ChartRange::LastMonths(3));
        assert!(ChartRange::from_query(Some("last2years"), None, None).is_err());
        let from = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        assert_eq!(ChartRange::from_query(Some("last12months"), Some(from), Some(to)).unwrap(), ChartRange::Custom { from, to });
        assert!(ChartRange::from_query(None, Some(to), Some(from)).is_err());
    }

    #[test]
    fn test_catalogue_lists_every_enum() {
        let catalogue = enum_catalogue();
        assert_eq!(catalogue["stageTypes"][4], "DELIVERED");
        assert_eq!(catalogue["paymentMethods"][2], "NET_BANKING");
        assert_eq!(catalogue["validSettings"].as_array().unwrap().len(), 5);
    }
}
