//! Error types for the signal relay

use fenced_harness_common::Token;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("A value was already published under token {0}")]
    AlreadyPublished(Token),

    #[error("The value for token {0} was already delivered")]
    AlreadyDelivered(Token),

    #[error("Token {0} is already being awaited")]
    AlreadyAwaited(Token),

    #[error("Wait for token {0} was abandoned by the store")]
    Abandoned(Token),

    #[error("Relay returned {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Invalid relay configuration: {0}")]
    InvalidConfig(String),

    #[error("Relay failed to start: {0}")]
    Startup(String),

    #[error("Relay health check failed after {0} attempts")]
    HealthCheck(usize),

    #[error("Invalid relay URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RelayResult<T> = Result<T, RelayError>;
