//! Error taxonomy for the lifecycle engine.
//!
//! The split matters operationally: `NotFound` / `InvalidState` /
//! `InvalidTrigger` are caller mistakes and never retried; `Store` aborts a
//! whole sweep tick; `Dispatch` marks a campaign as failed after retries
//! are exhausted.

use thiserror::Error;

/// All errors surfaced by Lexfront crates.
#[derive(Debug, Error)]
pub enum LexfrontError {
    /// Unknown entity id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Event not legal from the entity's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A schedule time failed its guard (campaigns require a future time).
    #[error("invalid trigger time: {0}")]
    InvalidTrigger(String),

    /// Malformed request input, rejected before touching any entity.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Downstream dispatch failure after retries were exhausted.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// Database-level failure.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration loading/parsing failure.
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LexfrontError {
    /// Whether this error is a caller mistake rather than an
    /// infrastructure problem.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::InvalidState(_) | Self::InvalidTrigger(_) | Self::Validation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, LexfrontError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(LexfrontError::NotFound("post-1".into()).is_client_error());
        assert!(LexfrontError::InvalidState("already sent".into()).is_client_error());
        assert!(LexfrontError::Validation("bad email".into()).is_client_error());
        assert!(!LexfrontError::Store("db locked".into()).is_client_error());
        assert!(!LexfrontError::Dispatch("smtp down".into()).is_client_error());
    }
}
