//! Error kinds shared across the workspace.
//!
//! Only configuration problems and broken invariants are real failures.
//! Market-driven outcomes (risk denials, kill-switch rejections) are values
//! and never travel through this type.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Invalid strategy parameters or application settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Snapshot or bar history missing for the requested instant.
    #[error("data unavailable for {subject}: {detail}")]
    DataUnavailable { subject: String, detail: String },

    /// Snapshot present but unusable (non-positive prices, missing chain).
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// Internal invariant violated; always a defect.
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Operator cancelled a run between iterations.
    #[error("CANCELLED")]
    Cancelled,
}

impl CoreError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn unavailable(subject: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DataUnavailable {
            subject: subject.into(),
            detail: detail.into(),
        }
    }

    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    /// Short machine-readable code, used as a decision or run reason.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::DataUnavailable { .. } => "DATA_UNAVAILABLE",
            Self::MalformedSnapshot(_) => "MALFORMED_SNAPSHOT",
            Self::Invariant(_) => "INVARIANT_VIOLATION",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Cancelled => "CANCELLED",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
