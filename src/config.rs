//! Runtime configuration read from the environment.
use anyhow::{anyhow, Context};
use chrono::FixedOffset;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub razorpay_webhook_secret: Option<String>,
    pub resend_api_key: Option<String>,
    pub mail_from: String,
    pub admin_email: String,
    pub nats_url: Option<String>,
    pub upload_dir: PathBuf,
    pub public_base_url: String,
    pub cors_origins: Vec<String>,
    pub business_offset: FixedOffset,
    pub summary_hour: u32,
    pub admin_bootstrap: Option<AdminBootstrap>,
}

#[derive(Clone, Debug)]
pub struct AdminBootstrap { pub email: String, pub password: String }

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("missing required environment variable {key}"));
        let parsed = |key: &str, default: i64| -> anyhow::Result<i64> {
            get(key).map_or(Ok(default), |v| v.parse().with_context(|| format!("{key} must be an integer, got '{v}'")))
        };

        let offset_minutes = parsed("BUSINESS_UTC_OFFSET_MINUTES", 330)?;
        let business_offset = i32::try_from(offset_minutes * 60)
            .ok()
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| anyhow!("BUSINESS_UTC_OFFSET_MINUTES out of range: {offset_minutes}"))?;
        let summary_hour = u32::try_from(parsed("SUMMARY_HOUR", 8)?)
            .ok()
            .filter(|h| *h < 24)
            .ok_or_else(|| anyhow!("SUMMARY_HOUR must be between 0 and 23"))?;
        let port = u16::try_from(parsed("PORT", 3000)?).context("PORT out of range")?;
        let admin_bootstrap = match (get("ADMIN_BOOTSTRAP_EMAIL"), get("ADMIN_BOOTSTRAP_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminBootstrap { email, password }),
            _ => None,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            port,
            jwt_secret: required("JWT_SECRET")?,
            jwt_ttl_hours: parsed("JWT_TTL_HOURS", 24)?,
            razorpay_key_id: required("RAZORPAY_KEY_ID")?,
            razorpay_key_secret: required("RAZORPAY_KEY_SECRET")?,
            razorpay_webhook_secret: get("RAZORPAY_WEBHOOK_SECRET"),
            resend_api_key: get("RESEND_API_KEY"),
            mail_from: get("MAIL_FROM").unwrap_or_else(|| "Kumbukkal Pepper Nursery <no-reply@localhost>".to_string()),
            admin_email: required("ADMIN_EMAIL")?,
            nats_url: get("NATS_URL"),
            upload_dir: PathBuf::from(get("UPLOAD_DIR").unwrap_or_else(|| "./uploads".to_string())),
            public_base_url: get("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://localhost:{port}"))
                .trim_end_matches('/')
                .to_string(),
            cors_origins: get("CORS_ORIGINS")
                .map(|v| v.split(',').map(|o| o.trim().to_string()).filter(|o| !o.is_empty()).collect())
                .unwrap_or_default(),
            business_offset,
            summary_hour,
            admin_bootstrap,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 5] = [
        ("DATABASE_URL", "postgres://localhost/nursery"),
        ("JWT_SECRET", "secret"),
        ("RAZORPAY_KEY_ID", "rzp_test_key"),
        ("RAZORPAY_KEY_SECRET", "rzp_secret"),
        ("ADMIN_EMAIL", "admin@example.com"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(env(&BASE)).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.jwt_ttl_hours, 24);
        assert_eq!(config.business_offset.local_minus_utc(), 330 * 60);
        assert_eq!(config.summary_hour, 8);
        assert_eq!(config.public_base_url, "http://localhost:3000");
        assert!(config.razorpay_webhook_secret.is_none());
        assert!(config.admin_bootstrap.is_none());
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_missing_required_key_is_named() {
        let err = Config::from_lookup(env(&BASE[1..])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn test_overrides_and_lists() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("PORT", "8080"),
            ("CORS_ORIGINS", "https://a.example, https://b.example,"),
            ("PUBLIC_BASE_URL", "https://api.example/"),
            ("ADMIN_BOOTSTRAP_EMAIL", "root@example.com"),
            ("ADMIN_BOOTSTRAP_PASSWORD", "Secret@123"),
        ]);
        let config = Config::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(config.public_base_url, "https://api.example");
        assert_eq!(config.admin_bootstrap.unwrap().email, "root@example.com");
    }

    #[test]
    fn test_bad_summary_hour() {
        let mut pairs = BASE.to_vec();
        pairs.push(("SUMMARY_HOUR", "25"));
        assert!(Config::from_lookup(env(&pairs)).is_err());
    }
}
