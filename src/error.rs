// src/error.rs

//! Unified error handling for the downloader.

use std::fmt;

use thiserror::Error;

/// Result type alias for downloader operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Embedded ledger store failed
    #[error("Ledger store error: {0}")]
    Store(#[from] sled::Error),

    /// A spawned task panicked or was aborted
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Listing filter could not be parsed
    #[error("Invalid filter '{expression}': {message}")]
    Filter { expression: String, message: String },

    /// Transport level failure for a request
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Request rejected because the circuit breaker is open
    #[error("Circuit breaker for the {pipeline} pipeline is open")]
    CircuitOpen { pipeline: &'static str },

    /// Ledger contents were unreadable
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Work stopped because the run was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a filter parsing error.
    pub fn filter(expression: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Filter {
            expression: expression.into(),
            message: message.to_string(),
        }
    }

    /// Create a transport error with the request URL as context.
    pub fn transport(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a ledger error.
    pub fn ledger(message: impl Into<String>) -> Self {
        Self::Ledger(message.into())
    }

    /// Whether a retry of the failed request could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Transport { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
