//! Worker Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A worker error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of an engine failure.
///
/// Only [`Seed`](ErrorKind::Seed) and [`Manifest`](ErrorKind::Manifest)
/// reach the platform (install must fail loudly); everything else is caught
/// at a coordinator boundary and converted into a resumable checkpoint or a
/// fallback response.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Engine configuration was missing or malformed.
    #[display("invalid engine configuration")]
    Config,
    /// The resource manifest could not be loaded from network or storage.
    #[display("manifest unavailable")]
    Manifest,
    /// An install-set entry could not be cached; the new worker version
    /// must not take over.
    #[display("install seeding failed at install-set index {_0}")]
    Seed(#[error(not(source))] usize),
    /// Persisted engine state could not be read or written.
    #[display("engine state store failure")]
    State,
    /// The lease record could not be read or written.
    #[display("lease store failure")]
    Lease,
    /// A content cache operation failed.
    #[display("content cache failure")]
    Store,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Config)
    }
}
