//! Manifest Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A manifest error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for manifest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a manifest failure.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The manifest document could not be fetched over the network.
    #[display("manifest fetch failed")]
    Fetch,
    /// The server answered the manifest request with a non-success status.
    #[display("manifest request returned status {_0}")]
    Status(#[error(not(source))] u16),
    /// The manifest document was not valid JSON or not the expected shape.
    #[display("manifest parse failed")]
    Parse,
    /// Reading or writing the persisted manifest copy failed.
    #[display("manifest persistence failed")]
    Store,
    /// No fresh copy could be fetched and no persisted copy exists.
    #[display("no manifest available from network or storage")]
    Unavailable,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch | Self::Status(_) | Self::Store | Self::Unavailable)
    }
}
