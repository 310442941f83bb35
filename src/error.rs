//! Error types for the Turnstile limiter.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// An operational call was made before `initialize` succeeded.
    #[error("limiter has not been initialized; call initialize() first")]
    Uninitialized,

    /// The rate limit argument was zero.
    #[error("invalid request limit {0}: the limit must be greater than zero")]
    InvalidLimit(u64),

    /// The periodic window-reset task could not be scheduled.
    #[error("failed to schedule window reset task: {0}")]
    Scheduler(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
