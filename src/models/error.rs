//! Error types for colloquy.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (bad input, item yields nothing usable)
//! - I^B materialized: Infrastructure failures (IO, network, timeout)
//! - K_i violated: Internal invariant violations (bugs)

use thiserror::Error;

/// Top-level error type for colloquy.
#[derive(Debug, Error)]
pub enum ColloquyError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED — Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("No themes could be extracted from item {0}")]
    NoThemes(String),

    #[error("Keyphrase extraction failed: {0}")]
    Extraction(String),

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED — Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════

    #[error("Paraphrase endpoint error: {0}")]
    Paraphrase(#[from] ParaphraseError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Item timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED — Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Worker task failed: {0}")]
    TaskFailed(String),
}

/// Errors raised by the remote paraphrasing endpoint.
#[derive(Debug, Error)]
pub enum ParaphraseError {
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl ColloquyError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether the failure concerns a single item only (drop it, keep the batch going).
    pub fn is_item_local(&self) -> bool {
        matches!(
            self,
            Self::NoThemes(_)
                | Self::Extraction(_)
                | Self::Timeout(_)
                | Self::TaskFailed(_)
                | Self::Paraphrase(_)
        )
    }

    /// Whether a remote call may succeed on retry.
    ///
    /// I^B: rate limits, server-side errors, network failures and timeouts
    /// are transient; client errors (4xx) are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) => true,
            Self::Paraphrase(ParaphraseError::RateLimited { .. }) => true,
            Self::Paraphrase(ParaphraseError::ApiError { status, .. }) => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for colloquy.
pub type Result<T> = std::result::Result<T, ColloquyError>;
