//! Expected observable outcomes of scenarios

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

/// What the fetcher page reports for a fetch.
///
/// `ok` and `response_type` are only checked when set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTestResult {
    pub ok: Option<&'static str>,
    pub body: &'static str,
    pub response_type: Option<&'static str>,
    pub error: &'static str,
}

impl FetchTestResult {
    pub const SUCCESS: FetchTestResult = FetchTestResult {
        ok: Some("true"),
        body: "success",
        response_type: None,
        error: "",
    };

    pub const OPAQUE: FetchTestResult = FetchTestResult {
        ok: Some("false"),
        body: "",
        response_type: Some("opaque"),
        error: "",
    };

    pub const FAILURE: FetchTestResult = FetchTestResult {
        ok: None,
        body: "",
        response_type: None,
        error: "TypeError: Failed to fetch",
    };
}

/// Named [`FetchTestResult`], as written in scenario specs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchExpectation {
    Success,
    Opaque,
    Failure,
}

impl FetchExpectation {
    pub fn result(&self) -> FetchTestResult {
        match self {
            FetchExpectation::Success => FetchTestResult::SUCCESS,
            FetchExpectation::Opaque => FetchTestResult::OPAQUE,
            FetchExpectation::Failure => FetchTestResult::FAILURE,
        }
    }
}

/// Outcome of loading a fenced frame.
///
/// There is no direct failure signal for a fenced frame, so failure is the
/// deadline winning the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FencedFrameTestResult {
    Success,
    Failure,
}

impl FencedFrameTestResult {
    pub const LOADED: &'static str = "loaded";
    pub const TIMEOUT: &'static str = "timeout";

    pub fn as_str(&self) -> &'static str {
        match self {
            FencedFrameTestResult::Success => Self::LOADED,
            FencedFrameTestResult::Failure => Self::TIMEOUT,
        }
    }
}

/// Compare a relayed value against its expected literal
pub fn assert_field(field: &str, expected: &str, actual: &str) -> E2eResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(E2eError::AssertionFailed {
            field: field.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}
