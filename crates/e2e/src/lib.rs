//! Fenced-frame network-access test orchestration
//!
//! This crate drives the fenced-frame private-network-access scenarios:
//! - Builds fetcher/frame page URLs and target behaviors from YAML specs
//! - Embeds the fenced frame through a [`FrameEmbedder`] (Playwright or simulated)
//! - Awaits the values the frame relays back through a [`SignalChannel`]
//! - Picks the signal backend: in-process store, a running relay or a spawned one
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Scenario Runner (Rust)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioRunner                                             │
//! │    ├── load specs: ScenarioSpec (YAML) -> Scenario          │
//! │    ├── run_specs() concurrently, one task per scenario      │
//! │    └── write_results() -> scenario-results.json             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario                                                   │
//! │    ├── fetch { source?, target, mode, method } -> 4 values  │
//! │    └── frame { source?, target } -> loaded | timeout        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  FrameEmbedder            │  SignalChannel                  │
//! │    ├── PlaywrightEmbedder │    ├── SignalStore (in-process) │
//! │    └── SimulatedBrowser   │    └── RelayClient (HTTP)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`SignalChannel`]: fenced_harness_relay::SignalChannel

pub mod backend;
pub mod embedder;
pub mod error;
pub mod expectation;
pub mod orchestrator;
pub mod playwright;
pub mod runner;
pub mod simulated;
pub mod spec;

pub use backend::SignalBackend;
pub use embedder::FrameEmbedder;
pub use error::{E2eError, E2eResult};
pub use expectation::{FencedFrameTestResult, FetchExpectation, FetchTestResult};
pub use orchestrator::{
    fenced_frame_fetch_test, fenced_frame_test, FetchOptions, FetchScenario, FrameScenario,
    Observation, Scenario, ScenarioContext,
};
pub use playwright::{PlaywrightConfig, PlaywrightEmbedder};
pub use runner::{RunnerConfig, ScenarioResult, ScenarioRunner, ScenarioSuiteResult};
pub use simulated::SimulatedBrowser;
pub use spec::ScenarioSpec;
