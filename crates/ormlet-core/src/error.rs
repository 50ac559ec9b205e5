//! Core error types.

use thiserror::Error;

/// Engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Operator misuse or an invalid value at construction/write time.
    ///
    /// Recoverable by the caller; nothing is coerced silently.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown key, locked metamodel mutation, ambiguous primary key.
    ///
    /// Fatal for the current operation.
    #[error("metamodel error: {0}")]
    Meta(String),

    /// A feature was requested on a dialect that cannot render it.
    #[error("unsupported by dialect {dialect}: {feature}")]
    UnsupportedFeature {
        /// Dialect name.
        dialect: &'static str,
        /// The requested feature.
        feature: String,
    },

    /// Error propagated from the storage port.
    #[error("storage error: {0}")]
    Storage(String),

    /// Operation attempted on a session that is not open.
    #[error("session is {0}, expected an open session")]
    SessionState(&'static str),

    /// Record not found.
    #[error("record not found")]
    NotFound,
}

impl Error {
    /// Build a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Build a metamodel error.
    pub fn meta(msg: impl Into<String>) -> Self {
        Error::Meta(msg.into())
    }

    /// Build a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }
}
