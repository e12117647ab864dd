use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{error, warn};

use crate::utils::response::error as error_response;

/// SQLSTATE reported by PostgreSQL for a unique index violation.
pub const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Deadline passed: {0}")]
    DeadlinePassed(String),

    #[error("Duplicate registration: {0}")]
    DuplicateRegistration(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Ticket issuance failed: {0}")]
    TicketIssuanceFailed(String),

    /// Raised by the stores when a freshly generated ticket code is already
    /// taken. The lifecycle manager regenerates and retries; it never reaches
    /// a client as-is.
    #[error("Ticket code collision")]
    TicketCodeCollision,

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_)
            | AppError::InvalidState(_)
            | AppError::DeadlinePassed(_)
            | AppError::DuplicateRegistration(_)
            | AppError::CapacityExceeded(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TicketIssuanceFailed(_)
            | AppError::TicketCodeCollision
            | AppError::DatabaseError(_)
            | AppError::ExternalServiceError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::DeadlinePassed(_) => "DEADLINE_PASSED",
            AppError::DuplicateRegistration(_) => "DUPLICATE_REGISTRATION",
            AppError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            AppError::TicketIssuanceFailed(_) | AppError::TicketCodeCollision => {
                "TICKET_ISSUANCE_FAILED"
            }
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Name of the unique index a write violated, if that is why it failed.
    pub fn violated_unique_index(err: &sqlx::Error) -> Option<&str> {
        let db_err = err.as_database_error()?;
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            db_err.constraint()
        } else {
            None
        }
    }

    fn log(&self) {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidState(msg)
            | AppError::DeadlinePassed(msg)
            | AppError::DuplicateRegistration(msg)
            | AppError::CapacityExceeded(msg) => {
                warn!(code = self.code(), message = %msg, "Request rejected");
            }
            AppError::TicketIssuanceFailed(msg)
            | AppError::ExternalServiceError(msg)
            | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::TicketCodeCollision => {
                error!("Ticket code collision escaped the retry loop");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidState(msg)
            | AppError::DeadlinePassed(msg)
            | AppError::DuplicateRegistration(msg)
            | AppError::CapacityExceeded(msg) => msg.clone(),
            AppError::TicketIssuanceFailed(_) | AppError::TicketCodeCollision => {
                "Failed to issue ticket".to_string()
            }
            AppError::ExternalServiceError(_) => "An external service failed".to_string(),
            AppError::InternalServerError(_) => "Internal server error".to_string(),
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
        };

        // Do not expose internal details in the API response
        let details = None;

        error_response(code, public_message, details, status)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        messages.sort();
        AppError::ValidationError(messages.join(", "))
    }
}
