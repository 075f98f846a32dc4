//! Error types for accounting operations.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use thiserror::Error;

/// Result type alias for accounting operations.
pub type Result<T> = std::result::Result<T, AccountingError>;

/// Errors that can occur while encoding keys or touching the mark store.
#[derive(Debug, Error)]
pub enum AccountingError {
    /// The endpoint address is not a valid IPv4 or IPv6 address.
    #[error("Invalid address '{address}': not an IPv4 or IPv6 address")]
    InvalidAddress {
        /// The rejected input.
        address: String,
    },

    /// The tag cannot be embedded in a field path.
    #[error("Invalid tag '{tag}': {reason}")]
    InvalidTag {
        /// The rejected tag.
        tag: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The identifier encoder failed.
    #[error("Endpoint identifier encoding failed: {0}")]
    Encoding(String),

    /// A store read or write failed or timed out.
    #[error("Store unavailable: {operation}: {message}")]
    StoreUnavailable {
        /// The operation that failed (e.g., "read_mark", "apply_updates").
        operation: String,
        /// Error message.
        message: String,
    },

    /// A persisted mark could not be decoded.
    #[error("Corrupt mark in {document}: field '{field}' has value '{value}'")]
    CorruptMark {
        /// The document key.
        document: String,
        /// The hash field.
        field: String,
        /// The raw stored value.
        value: String,
    },

    /// Applying a delta would overflow the stored total.
    #[error("Total overflow in {document}: field '{field}'")]
    Overflow {
        /// The document key.
        document: String,
        /// The hash field.
        field: String,
    },
}

impl AccountingError {
    /// Creates an invalid address error.
    pub fn invalid_address(address: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
        }
    }

    /// Creates an invalid tag error.
    pub fn invalid_tag(tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTag {
            tag: tag.into(),
            reason: reason.into(),
        }
    }

    /// Creates a store unavailable error.
    pub fn store_unavailable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a corrupt mark error.
    pub fn corrupt_mark(
        document: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::CorruptMark {
            document: document.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates an overflow error.
    pub fn overflow(document: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Overflow {
            document: document.into(),
            field: field.into(),
        }
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AccountingError::StoreUnavailable { .. })
    }
}
