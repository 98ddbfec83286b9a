//! Day and month boundaries in the business time zone.
use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveTime, TimeZone, Utc};

/// Half-open instant range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// One calendar month of a chart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonthBucket {
    pub first_day: NaiveDate,
    pub window: Window,
}

impl MonthBucket {
    pub fn short_name(&self) -> String { self.first_day.format("%b").to_string() }
    pub fn full_name(&self) -> String { self.first_day.format("%B %Y").to_string() }
}

#[derive(Clone, Copy, Debug)]
pub struct Calendar { offset: FixedOffset }

impl Calendar {
    pub fn new(offset: FixedOffset) -> Self { Self { offset } }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate { now.with_timezone(&self.offset).date_naive() }

    /// Midnight of `day` in business time, as UTC.
    pub fn start_of(&self, day: NaiveDate) -> DateTime<Utc> {
        let local = day.and_time(NaiveTime::MIN) - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&local)
    }

    /// Both days inclusive.
    pub fn days(&self, from: NaiveDate, to: NaiveDate) -> Window {
        Window { start: self.start_of(from), end: self.start_of(to + Duration::days(1)) }
    }

    pub fn month(&self, first_day: NaiveDate) -> MonthBucket {
        let next = first_day.checked_add_months(Months::new(1)).unwrap_or(first_day);
        MonthBucket { first_day, window: Window { start: self.start_of(first_day), end: self.start_of(next) } }
    }

    /// The `count` months ending with the month of `today`, oldest first.
    pub fn last_months(&self, today: NaiveDate, count: u32) -> Vec<MonthBucket> {
        let current = first_of_month(today);
        (0..count)
            .rev()
            .filter_map(|back| current.checked_sub_months(Months::new(back)))
            .map(|first| self.month(first))
            .collect()
    }

    /// Every month touched by `from..=to`, oldest first.
    pub fn months_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<MonthBucket> {
        let (mut cursor, last) = (first_of_month(from), first_of_month(to));
        let mut buckets = Vec::new();
        while cursor <= last {
            buckets.push(self.month(cursor));
            match cursor.checked_add_months(Months::new(1)) {
                Some(next) => cursor = next,
                None => break,
            }
        }
        buckets
    }
}

pub fn first_of_month(day: NaiveDate) -> NaiveDate { day - Duration::days(i64::from(day.day0())) }

#[cfg(test)]
mod tests {
    use super::*;

    fn ist() -> Calendar { Calendar::new(FixedOffset::east_opt(330 * 60).unwrap()) }
    fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

    #[test]
    fn test_business_midnight_in_utc() {
        let start = ist().start_of(date(2025, 3, 10));
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 9, 18, 30, 0).unwrap());
    }

    #[test]
    fn test_today_uses_business_offset() {
        let late_evening_utc = Utc.with_ymd_and_hms(2025, 3, 9, 20, 0, 0).unwrap();
        assert_eq!(ist().today(late_evening_utc), date(2025, 3, 10));
    }

    #[test]
    fn test_inclusive_day_window() {
        let window = ist().days(date(2025, 1, 1), date(2025, 1, 1));
        assert_eq!(window.end - window.start, Duration::days(1));
    }

    #[test]
    fn test_last_months_crosses_year() {
        let months = ist().last_months(date(2025, 2, 14), 3);
        let firsts: Vec<_> = months.iter().map(|m| m.first_day).collect();
        assert_eq!(firsts, vec![date(2024, 12, 1), date(2025, 1, 1), date(2025, 2, 1)]);
        assert_eq!(months[0].short_name(), "Dec");
        assert_eq!(months[2].full_name(), "February 2025");
    }

    #[test]
    fn test_months_between_is_inclusive() {
        assert_eq!(ist().months_between(date(2025, 1, 31), date(2025, 4, 1)).len(), 4);
        assert!(ist().months_between(date(2025, 4, 1), date(2025, 1, 1)).is_empty());
    }
}
