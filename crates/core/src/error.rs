//! Centralized error types for the Arachne workspace.

use thiserror::Error;

/// Top-level error enum. Variants map to subsystems.
///
/// `Config` is fatal and never retried; `Provider` is the transient class
/// the retry layer is allowed to re-attempt; `Mismatch` carries a
/// structured expected/actual pair so scenario reports can render a diff.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArachneError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Scenario error: {0}")]
    Scenario(String),

    #[error("Expected `{expected}`, got `{actual}`")]
    Mismatch { expected: String, actual: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ArachneResult<T> = Result<T, ArachneError>;
