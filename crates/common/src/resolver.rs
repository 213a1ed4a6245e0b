//! URL resolution against the test page location
//!
//! Header overrides cannot be expressed in a URL directly, so they are sent
//! to the responder as `header(name,value)` pipe directives. Nothing here
//! validates header names or values: bad input shows up later as a test
//! failure, not as an error here.

use tracing::trace;
use url::Url;

use crate::behavior::TargetBehavior;
use crate::error::{Error, Result};
use crate::params;
use crate::registry::ServerDescriptor;

/// Path of the preflight responder, relative to the test directory
pub const PREFLIGHT_RESPONDER: &str = "resources/preflight.py";

/// Overrides applied on top of a resolved URL
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Protocol, with or without the trailing colon
    pub protocol: Option<String>,
    pub port: Option<u16>,
    /// Headers the responder should add, in order
    pub headers: Vec<(String, String)>,
    /// Extra search params, appended in order
    pub search_params: Vec<(String, String)>,
}

impl ResolveOptions {
    /// Options that target `server`
    pub fn from_server(server: &ServerDescriptor) -> Self {
        Self {
            protocol: Some(server.protocol.clone()),
            port: Some(server.port),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_search_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.search_params.push((name.into(), value.into()));
        self
    }
}

/// Where a test document is loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub server: ServerDescriptor,
    /// Place the document in the public address space via CSP
    pub treat_as_public: bool,
}

/// A resource served by the preflight responder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub server: ServerDescriptor,
    pub behavior: Option<TargetBehavior>,
}

/// Resolve options for a source document's URL
pub fn source_resolve_options(source: &SourceSpec) -> ResolveOptions {
    let options = ResolveOptions::from_server(&source.server);
    if source.treat_as_public {
        options.with_header("Content-Security-Policy", "treat-as-public-address")
    } else {
        options
    }
}

/// Render header overrides as the responder's `pipe` value
pub fn header_pipe(headers: &[(String, String)]) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("header({},{})", name, value))
        .collect::<Vec<_>>()
        .join("|")
}

/// Resolves relative URLs against the location of the running test page
#[derive(Debug, Clone)]
pub struct UrlResolver {
    base: Url,
}

impl UrlResolver {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    pub fn parse(base: &str) -> Result<Self> {
        let base = Url::parse(base).map_err(|source| Error::InvalidUrl {
            input: base.to_string(),
            source,
        })?;
        Ok(Self::new(base))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve `url` and apply `options`: port, protocol, headers, then search params
    pub fn resolve(&self, url: &str, options: Option<&ResolveOptions>) -> Result<Url> {
        let mut result = self.base.join(url).map_err(|source| Error::InvalidUrl {
            input: url.to_string(),
            source,
        })?;

        let Some(options) = options else {
            return Ok(result);
        };

        if let Some(port) = options.port {
            result.set_port(Some(port)).map_err(|_| Error::UrlOverride {
                url: result.to_string(),
                component: "port",
                value: port.to_string(),
            })?;
        }

        if let Some(protocol) = &options.protocol {
            let scheme = protocol.trim_end_matches(':');
            result.set_scheme(scheme).map_err(|_| Error::UrlOverride {
                url: result.to_string(),
                component: "protocol",
                value: protocol.clone(),
            })?;
        }

        if !options.headers.is_empty() {
            let pipe = header_pipe(&options.headers);
            result.query_pairs_mut().append_pair(params::PIPE, &pipe);
        }

        if !options.search_params.is_empty() {
            let mut pairs = result.query_pairs_mut();
            for (name, value) in &options.search_params {
                pairs.append_pair(name, value);
            }
        }

        trace!("Resolved {} -> {}", url, result);
        Ok(result)
    }

    /// URL of the preflight responder configured for `target`
    pub fn preflight_url(&self, target: &TargetSpec) -> Result<Url> {
        let mut options = ResolveOptions::from_server(&target.server);
        if let Some(behavior) = &target.behavior {
            options.search_params = behavior.to_search_params();
        }
        self.resolve(PREFLIGHT_RESPONDER, Some(&options))
    }
}

/// Replace every `name` parameter of `url` with a single `name=value`
pub fn set_search_param(url: &mut Url, name: &str, value: &str) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (k, v) in &kept {
        pairs.append_pair(k, v);
    }
    pairs.append_pair(name, value);
}

/// First value of the `name` parameter, if any
pub fn search_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
