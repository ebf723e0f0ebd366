//! Error types for leadgate operations

use crate::{LeadId, UserId};
use std::time::Duration;
use thiserror::Error;

/// Caller identity errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("No authenticated caller")]
    NoCaller,

    #[error("Invalid token: {reason}")]
    InvalidToken { reason: String },

    #[error("Token has expired")]
    TokenExpired,
}

/// Ledger (visit store) errors.
///
/// Every variant carries a machine-readable code, see [`LedgerError::code`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger write failed [{code}]: {reason}")]
    WriteFailed { code: String, reason: String },

    #[error("Ledger read failed [{code}]: {reason}")]
    ReadFailed { code: String, reason: String },

    #[error("Lead {lead_id} does not exist")]
    UnknownLead { lead_id: LeadId },

    #[error("No visit recorded for user {user_id} and lead {lead_id}")]
    VisitNotFound { user_id: UserId, lead_id: LeadId },

    #[error("Ledger unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Ledger operation timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },
}

impl LedgerError {
    /// Machine-readable error code.
    ///
    /// Store failures report the backend's own code (a SQLSTATE for Postgres);
    /// the remaining variants use fixed snake_case codes.
    pub fn code(&self) -> &str {
        match self {
            LedgerError::WriteFailed { code, .. } | LedgerError::ReadFailed { code, .. } => code,
            LedgerError::UnknownLead { .. } => "unknown_lead",
            LedgerError::VisitNotFound { .. } => "visit_not_found",
            LedgerError::Unavailable { .. } => "unavailable",
            LedgerError::Timeout { .. } => "timeout",
        }
    }

    /// Shorthand for a poisoned in-process lock.
    pub fn lock_poisoned() -> Self {
        LedgerError::Unavailable {
            reason: "storage lock poisoned".to_string(),
        }
    }
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Field {field} is too long: {actual} > {max}")]
    TooLong {
        field: String,
        max: usize,
        actual: usize,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all leadgate errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LeadgateError {
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl LeadgateError {
    /// Machine-readable code for the error, prefixed by its category.
    pub fn code(&self) -> String {
        match self {
            LeadgateError::Auth(AuthError::NoCaller) => "auth.no_caller".to_string(),
            LeadgateError::Auth(AuthError::InvalidToken { .. }) => "auth.invalid_token".to_string(),
            LeadgateError::Auth(AuthError::TokenExpired) => "auth.token_expired".to_string(),
            LeadgateError::Ledger(err) => format!("ledger.{}", err.code()),
            LeadgateError::Validation(_) => "validation".to_string(),
            LeadgateError::Config(_) => "config".to_string(),
        }
    }
}

/// Result type alias for leadgate operations.
pub type LeadgateResult<T> = Result<T, LeadgateError>;
