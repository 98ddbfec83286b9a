//! Nursery Backend
//!
//! Ordering, payment and refund service for a plant nursery.
//!
//! ## Features
//! - Order placement with Razorpay checkout and webhook reconciliation
//! - Refund requests, admin approval and gateway settlement
//! - Fulfillment progress tracking
//! - Monthly inventory, delivery locations and site content
//! - Admin dashboards and scheduled summary mails

use thiserror::Error;

pub mod auth;
pub mod bus;
pub mod config;
pub mod domain;
pub mod gateway;
pub mod http;
pub mod notify;
pub mod services;
pub mod storage;
pub mod store;

use domain::aggregates::{OrderError, PaymentError, ProgressError, RefundError};
use domain::value_objects::{MoneyError, MonthKeyError, OtpError};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum NurseryError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Refund(#[from] RefundError),

    #[error(transparent)]
    Otp(#[from] OtpError),

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error(transparent)]
    Month(#[from] MonthKeyError),

    #[error(transparent)]
    Validation(#[from] validator::ValidationErrors),

    #[error("payment gateway error: {0}")]
    Gateway(#[from] gateway::GatewayError),

    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl NurseryError {
    pub fn not_found(what: &str) -> Self { Self::NotFound(format!("{what} not found")) }
    pub fn bad_request(message: impl Into<String>) -> Self { Self::BadRequest(message.into()) }
}

pub type Result<T> = std::result::Result<T, NurseryError>;
