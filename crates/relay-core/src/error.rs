use thiserror::Error;

/// Errors raised while validating a turn, before any stream exists.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("the inbound message has no content")]
    EmptyMessage,

    #[error("max_rounds must be at least 1")]
    ZeroRounds,

    #[error("invalid run option: {0}")]
    InvalidOption(String),

    #[error("agent configuration error: {0}")]
    Config(String),
}

pub type RelayResult<T> = Result<T, RelayError>;
