//! Correlation tokens for relayed signals

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use uuid::Uuid;

use crate::params;

/// Opaque identifier under which exactly one value is relayed
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    /// Mint a fresh random (v4 UUID) token
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Attach `tokens` to `url` as a comma-separated `keylist` parameter.
///
/// The page loaded at the returned URL reports the value for slot `i`
/// under `tokens[i]`.
pub fn embed_tokens_in_url(url: &Url, tokens: &[Token]) -> Url {
    let mut result = url.clone();
    let keylist = tokens
        .iter()
        .map(Token::as_str)
        .collect::<Vec<_>>()
        .join(",");
    result.query_pairs_mut().append_pair(params::KEYLIST, &keylist);
    result
}

/// Recover the tokens embedded by [`embed_tokens_in_url`], in slot order
pub fn tokens_from_url(url: &Url) -> Vec<Token> {
    url.query_pairs()
        .find(|(k, _)| k == params::KEYLIST)
        .map(|(_, v)| {
            v.split(',')
                .filter(|s| !s.is_empty())
                .map(Token::from_string)
                .collect()
        })
        .unwrap_or_default()
}
