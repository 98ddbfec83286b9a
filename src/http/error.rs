//! Maps crate errors onto HTTP responses.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::{ValidationErrors, ValidationErrorsKind};
use crate::domain::aggregates::OrderError;
use crate::domain::value_objects::OtpError;
use crate::storage::StorageError;
use crate::NurseryError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl NurseryError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::BadRequest(_) | Self::Money(_) | Self::Month(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Order(OrderError::Metadata) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR"),
            Self::Order(_) | Self::Payment(_) | Self::Progress(_) | Self::Refund(_) => (StatusCode::BAD_REQUEST, "INVALID_STATE"),
            Self::Otp(OtpError::Invalid) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Otp(OtpError::TooManyAttempts) => (StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_REQUESTS"),
            Self::Otp(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::Gateway(_) => (StatusCode::BAD_GATEWAY, "GATEWAY_ERROR"),
            Self::Storage(StorageError::InvalidKey(_)) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Database(sqlx::Error::RowNotFound) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Database(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Storage(_) | Self::Database(_) | Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR"),
        }
    }

    /// Message safe to show a client.
    fn public_message(&self, status: StatusCode) -> String {
        match self {
            Self::Validation(errors) => first_message(errors).unwrap_or_else(|| "Invalid request".to_string()),
            Self::Gateway(e) => format!("Payment gateway error: {e}"),
            Self::Database(sqlx::Error::RowNotFound) => "Record not found".to_string(),
            Self::Database(_) if status == StatusCode::CONFLICT => "Record already exists".to_string(),
            Self::Database(_) if status == StatusCode::BAD_REQUEST => "Referenced record does not exist".to_string(),
            _ if status.is_server_error() => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for NurseryError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %self, "Request failed");
        }
        let body = ErrorResponse { code, message: self.public_message(status) };
        (status, Json(body)).into_response()
    }
}

/// First constraint message, in field-name order so responses are stable.
pub fn first_message(errors: &ValidationErrors) -> Option<String> {
    let mut fields: Vec<_> = errors.errors().iter().collect();
    fields.sort_by_key(|(name, _)| **name);
    fields.into_iter().find_map(|(field, kind)| match kind {
        ValidationErrorsKind::Field(list) => list.first().map(|e| {
            e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| format!("{field} is invalid"))
        }),
        ValidationErrorsKind::Struct(inner) => first_message(inner),
        ValidationErrorsKind::List(items) => items.values().find_map(|inner| first_message(inner)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Probe {
        #[validate(email(message = "Invalid email"))]
        email: String,
        #[validate(length(min = 3))]
        name: String,
    }

    #[test]
    fn test_first_validation_message_is_stable() {
        let errors = Probe { email: "nope".into(), name: "x".into() }.validate().unwrap_err();
        assert_eq!(first_message(&errors).as_deref(), Some("Invalid email"));
        let errors = Probe { email: "a@b.co".into(), name: "x".into() }.validate().unwrap_err();
        assert_eq!(first_message(&errors).as_deref(), Some("name is invalid"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(NurseryError::not_found("Order").status_and_code().0, StatusCode::NOT_FOUND);
        assert_eq!(NurseryError::Otp(OtpError::Invalid).status_and_code().0, StatusCode::UNAUTHORIZED);
        assert_eq!(NurseryError::Otp(OtpError::Expired).status_and_code().0, StatusCode::BAD_REQUEST);
        assert_eq!(NurseryError::Otp(OtpError::TooManyAttempts).status_and_code().0, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(NurseryError::Order(OrderError::RefundAlreadyDecided).status_and_code().0, StatusCode::BAD_REQUEST);
        assert_eq!(NurseryError::Database(sqlx::Error::RowNotFound).status_and_code().0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let err = NurseryError::Internal(anyhow::anyhow!("connection string postgres://secret"));
        let (status, _) = err.status_and_code();
        assert_eq!(err.public_message(status), "Internal server error");
    }
}
