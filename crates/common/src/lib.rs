//! fenced-harness common library
//!
//! Shared building blocks for the fenced-frame network-access tests:
//! - the server registry (protocol × address space → server)
//! - URL resolution with responder header/search-param overrides
//! - behavior specifications for the remote preflight responder
//! - correlation tokens for relayed signals

pub mod behavior;
pub mod config;
pub mod error;
pub mod params;
pub mod registry;
pub mod resolver;
pub mod token;

// Re-export commonly used types
pub use behavior::{
    BehaviorSpec, BehaviorValue, PreflightBehavior, PreflightKind, ResponseBehavior, ResponseKind,
    TargetBehavior,
};
pub use config::HarnessConfig;
pub use error::{Error, Result};
pub use registry::{AddressSpace, PortTable, Protocol, ServerDescriptor, ServerRegistry};
pub use resolver::{source_resolve_options, ResolveOptions, SourceSpec, TargetSpec, UrlResolver};
pub use token::{embed_tokens_in_url, tokens_from_url, Token};

/// fenced-harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
