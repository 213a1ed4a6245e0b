//! fenced-harness signal relay
//!
//! Carries values computed inside an isolated browsing context back to the
//! test orchestrator, keyed by single-use tokens.
//!
//! ```text
//!   fenced frame ──GET /key-value-store?key=T&value=V──▶ RelayServer ─┐
//!                                                                    │ SignalStore
//!   orchestrator ◀──await_value(T)── RelayClient / SignalStore ◀─────┘
//! ```

pub mod channel;
pub mod client;
pub mod error;
pub mod process;
pub mod server;
pub mod store;

pub use channel::{race_deadline, RaceOutcome, SignalChannel};
pub use client::RelayClient;
pub use error::{RelayError, RelayResult};
pub use process::{RelayProcess, RelayProcessConfig};
pub use server::{RelayServer, RelayServerConfig};
pub use store::{SignalStore, StoreStats};
