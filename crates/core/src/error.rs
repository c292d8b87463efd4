//! Error types for the Parlor domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Parlor operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    // --- Backup import errors ---
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the failure was the store running out of space.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Error::Store(StoreError::QuotaExceeded { .. }))
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The endpoint answered with a non-2xx status. `message` is the raw body.
    #[error("API Error {status_code}: {message}")]
    ApiError { status_code: u16, message: String },

    /// The endpoint answered 2xx but the reply text was not where the vendor puts it.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Endpoint, key or model missing. Raised before any network attempt.
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether a retry or reroll can reasonably succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::NotConfigured(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    /// The write would exceed the space available to the store. Retrying does
    /// not help; the data volume has to shrink.
    #[error("Storage quota exceeded: {requested} bytes requested, {limit} bytes available")]
    QuotaExceeded { requested: usize, limit: usize },

    #[error("Stored value under '{key}' is unreadable: {reason}")]
    Corrupted { key: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum ImportError {
    #[error("Backup is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Backup has an unexpected shape: {0}")]
    InvalidShape(String),
}
