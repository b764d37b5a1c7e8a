//! Platform Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A platform error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for platform operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally: a [`Network`](ErrorKind::Network) failure is a candidate for a
/// later retry, a [`Store`](ErrorKind::Store) failure means the persistent
/// layer rejected the operation.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The network fetch could not produce a response at all. HTTP error
    /// statuses are **not** reported here; they come back as responses.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The key-value store or content cache rejected an operation.
    #[display("store error: {_0}")]
    Store(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Store(_))
    }
}
