//! Outgoing mail
pub mod templates;

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use crate::domain::aggregates::{Order, RefundImage};
use crate::services::summary::SummaryReport;
use templates::ContactMessage;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl Mail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, html: String) -> Self {
        Self { to: to.into(), subject: subject.into(), html }
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &Mail) -> Result<(), MailError>;
}

/// Sends through the Resend HTTP API.
pub struct ResendMailer {
    http: reqwest::Client,
    api_key: String,
    from: String,
}

impl ResendMailer {
    const ENDPOINT: &'static str = "https://api.resend.com/emails";

    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Result<Self, MailError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self { http, api_key: api_key.into(), from: from.into() })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, mail: &Mail) -> Result<(), MailError> {
        let response = self.http
            .post(Self::ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&json!({ "from": self.from, "to": [mail.to], "subject": mail.subject, "html": mail.html }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected { status: status.as_u16(), body });
        }
        Ok(())
    }
}

/// Logs mail instead of sending it. Used when no provider key is configured.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &Mail) -> Result<(), MailError> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "📧 Mail (not sent, no provider configured)");
        Ok(())
    }
}

/// Builds mails for lifecycle moments and sends them in the background.
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    admin_email: String,
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, admin_email: impl Into<String>) -> Self {
        Self { mailer, admin_email: admin_email.into() }
    }

    pub fn otp(&self, to: &str, code: &str) { self.dispatch(templates::otp(to, code)); }

    pub fn contact_form(&self, name: &str, email: &str, phone: Option<&str>, message: &str) {
        let contact = ContactMessage { name, email, phone, message };
        self.dispatch(templates::contact_to_admin(&self.admin_email, &contact));
        self.dispatch(templates::contact_thank_you(&contact));
    }

    pub fn new_order(&self, order: &Order) { self.dispatch(templates::new_order_to_admin(&self.admin_email, order)); }

    pub fn order_confirmation(&self, order: &Order) { self.dispatch(templates::order_confirmation(order)); }

    pub fn refund_request(&self, order: &Order, reason: Option<&str>, images: &[RefundImage]) {
        self.dispatch(templates::refund_request_to_admin(&self.admin_email, order, reason, images));
    }

    /// Sent inline so the scheduler knows whether the period was delivered.
    pub async fn summary(&self, report: &SummaryReport) -> Result<(), MailError> {
        self.deliver(templates::summary(&self.admin_email, report)).await
    }

    async fn deliver(&self, mail: Mail) -> Result<(), MailError> {
        let result = self.mailer.send(&mail).await;
        if let Err(e) = &result {
            tracing::error!(to = %mail.to, subject = %mail.subject, error = %e, "Failed to send mail");
        }
        result
    }

    fn dispatch(&self, mail: Mail) {
        let notifier = self.clone();
        tokio::spawn(async move {
            let _ = notifier.deliver(mail).await;
        });
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingMailer { pub sent: Mutex<Vec<Mail>> }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, mail: &Mail) -> Result<(), MailError> {
            self.sent.lock().await.push(mail.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_contact_form_mails_admin_and_sender() {
        let mailer = Arc::new(RecordingMailer::default());
        let notifier = Notifier::new(mailer.clone(), "admin@example.com");
        notifier.contact_form("Ravi", "ravi@example.com", Some("+919800000000"), "Do you ship to Idukki?");
        for _ in 0..50 {
            if mailer.sent.lock().await.len() == 2 { break; }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let sent = mailer.sent.lock().await;
        let mut recipients: Vec<&str> = sent.iter().map(|m| m.to.as_str()).collect();
        recipients.sort();
        assert_eq!(recipients, vec!["admin@example.com", "ravi@example.com"]);
    }

    #[tokio::test]
    async fn test_log_mailer_never_fails() {
        assert!(LogMailer.send(&Mail::new("a@example.com", "s", String::new())).await.is_ok());
    }
}
