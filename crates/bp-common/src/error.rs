//! Error types shared by the belief-propagation crates.
//!
//! Every failure the numerical core can surface is one of a small, closed
//! set of variants. Numerical near-misses (duplicate mixture components,
//! vanishing component mass) are handled locally by pruning and never reach
//! this type; what does reach it is a genuine failure that callers must see.
//!
//! # Agent-Facing Output
//!
//! Errors convert to a structured report:
//! ```json
//! {
//!   "code": 10,
//!   "category": "numerical",
//!   "message": "integral did not converge: ...",
//!   "recoverable": true
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for belief-propagation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Quadrature and fitting failures.
    Numerical,
    /// Gaps in the message-helper table.
    Dispatch,
    /// Supports that are empty, unbounded, or disjoint.
    Support,
    /// Malformed inputs.
    Argument,
    /// Message fetches from the surrounding network layer.
    Network,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Numerical => write!(f, "numerical"),
            ErrorCategory::Dispatch => write!(f, "dispatch"),
            ErrorCategory::Support => write!(f, "support"),
            ErrorCategory::Argument => write!(f, "argument"),
            ErrorCategory::Network => write!(f, "network"),
        }
    }
}

/// Unified error type.
#[derive(Debug, Error)]
pub enum Error {
    // Numerical errors (10-19)
    #[error("integral did not converge on [{left}, {right}]: {reason} (abserr {abserr:.3e}, tolerance {tolerance:.3e})")]
    DifficultIntegral {
        left: f64,
        right: f64,
        abserr: f64,
        tolerance: f64,
        reason: String,
    },

    #[error("numerical failure: {0}")]
    Numerical(String),

    // Dispatch errors (20-29)
    #[error("no {kind} helper for ({signature})")]
    UnsupportedCombination { kind: String, signature: String },

    // Support errors (30-39)
    #[error("degenerate support: {0}")]
    DegenerateSupport(String),

    #[error("effective support undefined: {0}")]
    SupportUndefined(String),

    // Argument errors (40-49)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DomainError { expected: usize, actual: usize },

    // Network errors (50-59)
    #[error("stale reference to {0}")]
    StaleReference(String),

    #[error("message slot {slot}: cannot {action} while {state}")]
    SlotState {
        slot: String,
        action: &'static str,
        state: &'static str,
    },
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Shorthand for [`Error::DegenerateSupport`].
    pub fn degenerate(message: impl Into<String>) -> Self {
        Error::DegenerateSupport(message.into())
    }

    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Numerical errors
    /// - 20-29: Dispatch errors
    /// - 30-39: Support errors
    /// - 40-49: Argument errors
    /// - 50-59: Network errors
    pub fn code(&self) -> u32 {
        match self {
            Error::DifficultIntegral { .. } => 10,
            Error::Numerical(_) => 11,
            Error::UnsupportedCombination { .. } => 20,
            Error::DegenerateSupport(_) => 30,
            Error::SupportUndefined(_) => 31,
            Error::InvalidArgument(_) => 40,
            Error::DomainError { .. } => 41,
            Error::StaleReference(_) => 50,
            Error::SlotState { .. } => 51,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::DifficultIntegral { .. } | Error::Numerical(_) => ErrorCategory::Numerical,
            Error::UnsupportedCombination { .. } => ErrorCategory::Dispatch,
            Error::DegenerateSupport(_) | Error::SupportUndefined(_) => ErrorCategory::Support,
            Error::InvalidArgument(_) | Error::DomainError { .. } => ErrorCategory::Argument,
            Error::StaleReference(_) | Error::SlotState { .. } => ErrorCategory::Network,
        }
    }

    /// Returns whether a caller may reasonably retry.
    ///
    /// A difficult integral is retried once at a wider tolerance; a stale
    /// reference is retried after the network layer refreshes its handle.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::DifficultIntegral { .. } | Error::StaleReference(_)
        )
    }

    /// Builds the structured report for this error.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            category: self.category(),
            message: self.to_string(),
            recoverable: self.is_recoverable(),
        }
    }
}

/// Serializable summary of an [`Error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: u32,
    pub category: ErrorCategory,
    pub message: String,
    pub recoverable: bool,
}
