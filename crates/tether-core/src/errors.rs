//! Cross-cutting error types for Tether.
//!
//! Transport errors (`ApiError`) live in `tether-client` and session errors
//! (`SyncError`) in `tether-sync`. The binary converges everything through
//! `anyhow`.

use thiserror::Error;

/// Errors that can be raised by any Tether crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An agent id was empty or contained characters that cannot appear in a
    /// URL path segment.
    #[error("invalid agent id '{0}'")]
    InvalidAgentId(String),

    /// A prompt was empty after trimming.
    #[error("prompt text must not be empty")]
    EmptyPrompt,

    /// Data failed validation (format, constraints).
    #[error("validation error: {0}")]
    Validation(String),
}
