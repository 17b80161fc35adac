//! Shared error taxonomy for the belief-propagation crates.

pub mod error;

pub use error::{Error, ErrorCategory, ErrorReport, Result};
