//! Error types for the virology core library.

use thiserror::Error;

/// Result type alias using the core Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading configuration. Database failures have their
/// own [`crate::db::DatabaseError`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
