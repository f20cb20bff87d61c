//! # AppError
//!
//! Centralized error handling for the Tastemap ecosystem.
//! Maps domain-specific failures to actionable error types.

use std::fmt::Display;

use thiserror::Error;

/// The primary error type for all tm-core operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Venue, Serial code)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure tied to a request field (e.g., rating out of range)
    #[error("validation error on `{field}`: {message}")]
    ValidationError { field: String, message: String },

    /// Missing or invalid credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated, but acting on something the caller does not own
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Infrastructure failure (e.g., DB down, pool timeout)
    #[error("internal service error: {0}")]
    Internal(String),

    /// State conflict (e.g., serial code already used)
    #[error("conflict: {0}")]
    Conflict(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Display) -> Self {
        Self::NotFound(entity.into(), id.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

/// A specialized Result type for Tastemap logic.
pub type Result<T> = std::result::Result<T, AppError>;
