//! Behavior specifications for the remote preflight responder
//!
//! The responder (`resources/preflight.py`) cannot be configured other than
//! through its URL, so every instruction is a query parameter. The builders
//! here are pure: each call returns a fresh [`BehaviorSpec`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::params;
use crate::token::Token;

/// A single instruction value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BehaviorValue {
    Bool(bool),
    Str(String),
}

impl fmt::Display for BehaviorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BehaviorValue::Bool(b) => write!(f, "{}", b),
            BehaviorValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for BehaviorValue {
    fn from(s: &str) -> Self {
        BehaviorValue::Str(s.to_string())
    }
}

impl From<String> for BehaviorValue {
    fn from(s: String) -> Self {
        BehaviorValue::Str(s)
    }
}

impl From<bool> for BehaviorValue {
    fn from(b: bool) -> Self {
        BehaviorValue::Bool(b)
    }
}

/// Ordered key/value instructions; inserting an existing key replaces its value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BehaviorSpec {
    entries: Vec<(String, BehaviorValue)>,
}

impl BehaviorSpec {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<BehaviorValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<BehaviorValue>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&BehaviorValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Merge `other` into `self`; keys from `other` win.
    pub fn merge(&mut self, other: &BehaviorSpec) {
        for (key, value) in &other.entries {
            self.insert(key, value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BehaviorValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render as query parameter pairs
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}

/// How the responder answers a preflight request.
///
/// `uuid` identifies the preflight so the responder can tell whether it was
/// already seen.
pub struct PreflightBehavior;

impl PreflightBehavior {
    /// The preflight fails with a non-2xx status.
    pub fn failure() -> BehaviorSpec {
        BehaviorSpec::new()
    }

    /// The preflight response is missing CORS headers.
    pub fn no_cors_header(uuid: &Token) -> BehaviorSpec {
        BehaviorSpec::new().with(params::PREFLIGHT_UUID, uuid.as_str())
    }

    /// The preflight response is missing PNA headers.
    pub fn no_pna_header(uuid: &Token) -> BehaviorSpec {
        Self::no_cors_header(uuid).with(params::PREFLIGHT_HEADERS, params::HEADERS_CORS)
    }

    pub fn success(uuid: &Token) -> BehaviorSpec {
        Self::no_cors_header(uuid).with(params::PREFLIGHT_HEADERS, params::HEADERS_CORS_PNA)
    }

    /// Success, but the client is allowed to skip the preflight altogether.
    pub fn optional_success(uuid: &Token) -> BehaviorSpec {
        Self::success(uuid).with(params::IS_PREFLIGHT_OPTIONAL, true)
    }

    /// Success only for the first preflight carrying `uuid`.
    pub fn single_preflight(uuid: &Token) -> BehaviorSpec {
        Self::success(uuid).with(params::EXPECT_SINGLE_PREFLIGHT, true)
    }
}

/// How the responder answers the final (non-preflight) request
pub struct ResponseBehavior;

impl ResponseBehavior {
    /// Succeed without CORS headers.
    pub fn default() -> BehaviorSpec {
        BehaviorSpec::new()
    }

    /// Succeed with CORS headers.
    pub fn allow_cross_origin() -> BehaviorSpec {
        BehaviorSpec::new().with(params::FINAL_HEADERS, params::HEADERS_CORS)
    }
}

/// Declarative name of a [`PreflightBehavior`] builder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreflightKind {
    #[default]
    Failure,
    NoCorsHeader,
    NoPnaHeader,
    Success,
    OptionalSuccess,
    SinglePreflight,
}

impl PreflightKind {
    pub fn build(&self, uuid: &Token) -> BehaviorSpec {
        match self {
            PreflightKind::Failure => PreflightBehavior::failure(),
            PreflightKind::NoCorsHeader => PreflightBehavior::no_cors_header(uuid),
            PreflightKind::NoPnaHeader => PreflightBehavior::no_pna_header(uuid),
            PreflightKind::Success => PreflightBehavior::success(uuid),
            PreflightKind::OptionalSuccess => PreflightBehavior::optional_success(uuid),
            PreflightKind::SinglePreflight => PreflightBehavior::single_preflight(uuid),
        }
    }
}

/// Declarative name of a [`ResponseBehavior`] builder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    #[default]
    Default,
    AllowCrossOrigin,
}

impl ResponseKind {
    pub fn build(&self) -> BehaviorSpec {
        match self {
            ResponseKind::Default => ResponseBehavior::default(),
            ResponseKind::AllowCrossOrigin => ResponseBehavior::allow_cross_origin(),
        }
    }
}

/// Full behavior of a target served by the preflight responder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetBehavior {
    pub preflight: BehaviorSpec,
    pub response: BehaviorSpec,
    /// URL to which the target redirects GET requests
    pub redirect: Option<String>,
    /// Alternate file the responder serves instead of its default body
    pub file: Option<String>,
}

impl TargetBehavior {
    /// Flatten into search parameters: preflight, response, redirect, file
    pub fn to_search_params(&self) -> Vec<(String, String)> {
        let mut merged = self.preflight.clone();
        merged.merge(&self.response);
        if let Some(redirect) = &self.redirect {
            merged.insert(params::REDIRECT, redirect.as_str());
        }
        if let Some(file) = &self.file {
            merged.insert(params::FILE, file.as_str());
        }
        merged.to_query_pairs()
    }
}
