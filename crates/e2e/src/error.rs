//! Error types for scenario orchestration

use fenced_harness_common::{AddressSpace, Protocol};
use fenced_harness_relay::RelayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Scenario spec parse error: {0}")]
    SpecParse(String),

    #[error("No server for {protocol}-{address_space}")]
    MissingServer {
        protocol: Protocol,
        address_space: AddressSpace,
    },

    #[error("Assertion failed: {field}: expected {expected:?}, got {actual:?}")]
    AssertionFailed {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Harness error: {0}")]
    Harness(#[from] fenced_harness_common::Error),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
