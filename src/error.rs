//! Error types for the Turnstile service.

use thiserror::Error;

use crate::admission::StoreError;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store errors raised outside a request (startup, health)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// HTTP client errors from the completion provider
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
