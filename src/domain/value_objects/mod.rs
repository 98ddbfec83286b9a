//! Value Objects for the nursery domain

use chrono::{DateTime, Duration, Utc};
use constant_time_eq::constant_time_eq;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Money in paise (1/100 rupee)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Paise(i64);

impl Paise {
    pub const ZERO: Paise = Paise(0);

    pub fn new(value: i64) -> Self { Self(value) }
    pub fn value(&self) -> i64 { self.0 }
    pub fn is_positive(&self) -> bool { self.0 > 0 }

    /// Parses a rupee amount such as `"249"` or `"249.50"`.
    pub fn from_rupees(input: &str) -> Result<Self, MoneyError> {
        let input = input.trim();
        let (whole, fraction) = input.split_once('.').unwrap_or((input, ""));
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MoneyError::Malformed(input.to_string()));
        }
        if fraction.len() > 2 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MoneyError::Malformed(input.to_string()));
        }
        let rupees: i64 = whole.parse().map_err(|_| MoneyError::Overflow)?;
        let paise: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| MoneyError::Malformed(input.to_string()))? * 10,
            _ => fraction.parse().map_err(|_| MoneyError::Malformed(input.to_string()))?,
        };
        rupees.checked_mul(100).and_then(|p| p.checked_add(paise)).map(Self).ok_or(MoneyError::Overflow)
    }

    pub fn times(&self, quantity: u32) -> Result<Paise, MoneyError> {
        self.0.checked_mul(i64::from(quantity)).map(Self).ok_or(MoneyError::Overflow)
    }

    /// Renders with Indian digit grouping, e.g. `₹1,23,456.78`.
    pub fn format_inr(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let rupees = (abs / 100).to_string();
        let paise = abs % 100;
        let grouped = if rupees.len() <= 3 {
            rupees
        } else {
            let (head, tail) = rupees.split_at(rupees.len() - 3);
            let mut groups: Vec<&str> = Vec::new();
            let mut end = head.len();
            while end > 2 {
                groups.push(&head[end - 2..end]);
                end -= 2;
            }
            groups.push(&head[..end]);
            groups.reverse();
            format!("{},{}", groups.join(","), tail)
        };
        format!("{sign}₹{grouped}.{paise:02}")
    }
}

impl fmt::Display for Paise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.format_inr()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("'{0}' is not a valid rupee amount")]
    Malformed(String),
    #[error("amount out of range")]
    Overflow,
}

/// Human-facing order code, `KP<year>-<seq>`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderCode { year: i32, seq: u32 }

impl OrderCode {
    pub const PREFIX: &'static str = "KP";

    pub fn new(year: i32, seq: u32) -> Self { Self { year, seq } }
    pub fn year(&self) -> i32 { self.year }
    pub fn seq(&self) -> u32 { self.seq }

    /// Next code after the most recently issued one. The counter restarts
    /// at 1 when the year changes or the previous code is unreadable.
    pub fn successor(last: Option<&str>, year: i32) -> Self {
        let seq = last
            .and_then(|code| code.parse::<OrderCode>().ok())
            .filter(|code| code.year == year)
            .map_or(1, |code| code.seq.saturating_add(1));
        Self { year, seq }
    }
}

impl fmt::Display for OrderCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}-{:04}", Self::PREFIX, self.year, self.seq)
    }
}

impl FromStr for OrderCode {
    type Err = OrderCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix(Self::PREFIX).ok_or(OrderCodeError)?;
        let (year, seq) = rest.split_once('-').ok_or(OrderCodeError)?;
        if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) { return Err(OrderCodeError); }
        if seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) { return Err(OrderCodeError); }
        Ok(Self { year: year.parse().map_err(|_| OrderCodeError)?, seq: seq.parse().map_err(|_| OrderCodeError)? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed order code")]
pub struct OrderCodeError;

/// One-time password sent by mail
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Otp { code: String, expires_at: DateTime<Utc> }

impl Otp {
    pub fn ttl() -> Duration { Duration::minutes(5) }

    pub fn generate(now: DateTime<Utc>) -> Self {
        let code = rand::thread_rng().gen_range(100_000..1_000_000).to_string();
        Self { code, expires_at: now + Self::ttl() }
    }

    pub fn code(&self) -> &str { &self.code }
    pub fn expires_at(&self) -> DateTime<Utc> { self.expires_at }

    /// Wrong guesses allowed per issued code.
    pub const MAX_ATTEMPTS: i32 = 5;

    /// Checks a submitted code against the stored one. `attempts` counts the
    /// wrong guesses already made against this code.
    pub fn check(stored: Option<&str>, expires_at: Option<DateTime<Utc>>, attempts: i32, submitted: &str, now: DateTime<Utc>) -> Result<(), OtpError> {
        let (Some(stored), Some(expires_at)) = (stored, expires_at) else { return Err(OtpError::NotGenerated) };
        if attempts >= Self::MAX_ATTEMPTS { return Err(OtpError::TooManyAttempts); }
        if !constant_time_eq(stored.as_bytes(), submitted.as_bytes()) { return Err(OtpError::Invalid); }
        if now > expires_at { return Err(OtpError::Expired); }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OtpError {
    #[error("OTP not generated")]
    NotGenerated,
    #[error("Invalid OTP")]
    Invalid,
    #[error("OTP expired")]
    Expired,
    #[error("Too many attempts, please request a new OTP")]
    TooManyAttempts,
}

/// Inventory month, `YYYY-MM`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonthKey { year: i32, month: u32 }

impl MonthKey {
    pub fn year(&self) -> i32 { self.year }
    pub fn month(&self) -> u32 { self.month }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:04}-{:02}", self.year, self.month) }
}

impl FromStr for MonthKey {
    type Err = MonthKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s.trim().split_once('-').ok_or(MonthKeyError)?;
        if year.len() != 4 || month.len() != 2 { return Err(MonthKeyError); }
        let year: i32 = year.parse().map_err(|_| MonthKeyError)?;
        let month: u32 = month.parse().map_err(|_| MonthKeyError)?;
        if !(1..=12).contains(&month) { return Err(MonthKeyError); }
        Ok(Self { year, month })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("month must be formatted as YYYY-MM")]
pub struct MonthKeyError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paise_from_rupees() {
        assert_eq!(Paise::from_rupees("249").unwrap().value(), 24_900);
        assert_eq!(Paise::from_rupees("249.5").unwrap().value(), 24_950);
        assert_eq!(Paise::from_rupees(" 0.05 ").unwrap().value(), 5);
        assert!(Paise::from_rupees("-3").is_err());
        assert!(Paise::from_rupees("1.005").is_err());
        assert!(Paise::from_rupees("abc").is_err());
        assert!(Paise::from_rupees("").is_err());
    }

    #[test]
    fn test_paise_times_overflow() {
        assert_eq!(Paise::new(2_500).times(4).unwrap().value(), 10_000);
        assert_eq!(Paise::new(i64::MAX).times(2), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_format_inr_grouping() {
        assert_eq!(Paise::new(5).format_inr(), "₹0.05");
        assert_eq!(Paise::new(99_900).format_inr(), "₹999.00");
        assert_eq!(Paise::new(12_345_678).format_inr(), "₹1,23,456.78");
        assert_eq!(Paise::new(1_234_567_890).format_inr(), "₹1,23,45,678.90");
    }

    #[test]
    fn test_order_code_successor() {
        assert_eq!(OrderCode::successor(None, 2025).to_string(), "KP2025-0001");
        assert_eq!(OrderCode::successor(Some("KP2025-0041"), 2025).to_string(), "KP2025-0042");
        assert_eq!(OrderCode::successor(Some("KP2024-0900"), 2025).to_string(), "KP2025-0001");
        assert_eq!(OrderCode::successor(Some("ORD-123"), 2025).to_string(), "KP2025-0001");
        assert_eq!(OrderCode::successor(Some("KP2025-9999"), 2025).to_string(), "KP2025-10000");
    }

    #[test]
    fn test_order_code_parse_rejects_garbage() {
        assert!("KP25-0001".parse::<OrderCode>().is_err());
        assert!("KP2025-".parse::<OrderCode>().is_err());
        assert!("KP2025-00a1".parse::<OrderCode>().is_err());
        assert_eq!("KP2025-0007".parse::<OrderCode>().unwrap(), OrderCode::new(2025, 7));
    }

    #[test]
    fn test_otp_check_order() {
        let now = Utc::now();
        let otp = Otp::generate(now);
        assert_eq!(otp.code().len(), 6);
        assert_eq!(Otp::check(None, None, 0, "123456", now), Err(OtpError::NotGenerated));
        assert_eq!(Otp::check(Some(otp.code()), Some(otp.expires_at()), 0, "000000x", now), Err(OtpError::Invalid));
        assert_eq!(Otp::check(Some(otp.code()), Some(otp.expires_at()), 0, otp.code(), now + Duration::minutes(6)), Err(OtpError::Expired));
        assert!(Otp::check(Some(otp.code()), Some(otp.expires_at()), 0, otp.code(), now).is_ok());
    }

    #[test]
    fn test_otp_locks_after_max_attempts() {
        let now = Utc::now();
        let otp = Otp::generate(now);
        let expires = Some(otp.expires_at());
        assert!(Otp::check(Some(otp.code()), expires, Otp::MAX_ATTEMPTS - 1, otp.code(), now).is_ok());
        assert_eq!(Otp::check(Some(otp.code()), expires, Otp::MAX_ATTEMPTS, otp.code(), now), Err(OtpError::TooManyAttempts));
        assert_eq!(Otp::check(Some("123456"), expires, 0, "12345", now), Err(OtpError::Invalid));
    }

    #[test]
    fn test_month_key() {
        let key: MonthKey = "2025-03".parse().unwrap();
        assert_eq!((key.year(), key.month()), (2025, 3));
        assert_eq!(key.to_string(), "2025-03");
        assert!("2025-13".parse::<MonthKey>().is_err());
        assert!("2025-3".parse::<MonthKey>().is_err());
    }
}
