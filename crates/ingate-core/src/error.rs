//! Error types and result handling for gateway operations.
//!
//! Defines the repository-level `CoreError` and the request-facing
//! `GatewayError` taxonomy with stable codes for client disambiguation.
//! HTTP status mapping lives in the API crate; this module only classifies.

use serde::Serialize;
use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for storage and collaborator operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Entity not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Constraint violation.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Broker or counter-store backend unavailable.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::ConstraintViolation(format!("unique constraint violation: {db_err}"))
            },
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                Self::ConstraintViolation(format!("foreign key constraint violation: {db_err}"))
            },
            _ => Self::Database(err.to_string()),
        }
    }
}

/// A single field-level validation failure.
///
/// Validation aggregates all failures into one response so integrators can
/// fix an envelope in one round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted path of the offending field, e.g. `action.function`.
    pub field: String,

    /// Human-readable description of the failure.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Request-facing error taxonomy with codes matching the gateway contract.
///
/// Every pipeline stage converts its failure into exactly one of these
/// variants; no stage after a failing stage executes.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No bearer credential was supplied (E1001).
    #[error("[E1001] Missing credential: no bearer token supplied")]
    MissingCredential,

    /// The supplied credential matched no active principal (E1002).
    ///
    /// Deliberately does not distinguish "no record" from "digest mismatch".
    #[error("[E1002] Invalid credential")]
    InvalidCredential,

    /// The principal exhausted its rate window (E1003).
    #[error("[E1003] Rate limit exceeded, window resets at {reset_at_ms}")]
    RateLimited {
        /// When the current window resets, epoch milliseconds.
        reset_at_ms: i64,
    },

    /// The envelope failed schema or temporal validation (E1004).
    #[error("[E1004] Invalid event envelope: {} error(s)", errors.len())]
    Validation {
        /// Every failure found, aggregated rather than fail-fast.
        errors: Vec<FieldError>,
    },

    /// No signature was supplied in header or body (E1005).
    #[error("[E1005] Missing signature")]
    MissingSignature,

    /// The supplied signature did not verify (E1006).
    #[error("[E1006] Signature verification failed")]
    InvalidSignature,

    /// Server-side misconfiguration, e.g. an empty signing secret (E3001).
    #[error("[E3001] Server misconfiguration: {0}")]
    Configuration(String),

    /// Durable persistence failed before any publish was attempted (E3002).
    #[error("[E3002] Failed to persist event: {0}")]
    Persist(String),

    /// Broker publish failed after the event was durably recorded (E3003).
    ///
    /// Reported to the caller as a failure so a retry with the same payload
    /// is legitimate; the duplicate-safe insert keeps storage single-copy.
    #[error("[E3003] Failed to publish event: {0}")]
    Publish(String),
}

impl GatewayError {
    /// Returns the stable error code (E1001-E3003).
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "E1001",
            Self::InvalidCredential => "E1002",
            Self::RateLimited { .. } => "E1003",
            Self::Validation { .. } => "E1004",
            Self::MissingSignature => "E1005",
            Self::InvalidSignature => "E1006",
            Self::Configuration(_) => "E3001",
            Self::Persist(_) => "E3002",
            Self::Publish(_) => "E3003",
        }
    }

    /// Whether the failure is attributable to the caller (4xx-class).
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential
                | Self::InvalidCredential
                | Self::RateLimited { .. }
                | Self::Validation { .. }
                | Self::MissingSignature
                | Self::InvalidSignature
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(GatewayError::MissingCredential.code(), "E1001");
        assert_eq!(GatewayError::InvalidCredential.code(), "E1002");
        assert_eq!(GatewayError::RateLimited { reset_at_ms: 0 }.code(), "E1003");
        assert_eq!(GatewayError::Validation { errors: vec![] }.code(), "E1004");
        assert_eq!(GatewayError::MissingSignature.code(), "E1005");
        assert_eq!(GatewayError::InvalidSignature.code(), "E1006");
        assert_eq!(GatewayError::Configuration(String::new()).code(), "E3001");
        assert_eq!(GatewayError::Persist(String::new()).code(), "E3002");
        assert_eq!(GatewayError::Publish(String::new()).code(), "E3003");
    }

    #[test]
    fn client_errors_classified() {
        assert!(GatewayError::InvalidCredential.is_client_error());
        assert!(GatewayError::RateLimited { reset_at_ms: 0 }.is_client_error());
        assert!(GatewayError::InvalidSignature.is_client_error());
        assert!(!GatewayError::Configuration("secret missing".into()).is_client_error());
        assert!(!GatewayError::Publish("broker down".into()).is_client_error());
    }

    #[test]
    fn validation_error_reports_count() {
        let err = GatewayError::Validation {
            errors: vec![
                FieldError::new("event_type", "unknown value"),
                FieldError::new("timestamp", "missing"),
            ],
        };
        assert!(err.to_string().contains("2 error(s)"));
    }
}
