//! Scenario orchestration
//!
//! Each scenario runs as one async task:
//! Setup (resolve URLs, mint tokens, embed the frame) → WaitingForSignal
//! (await the relayed values, racing a deadline for frame loads) →
//! Asserting → Done. There are no retries; a deadline firing is final.

use fenced_harness_common::params;
use fenced_harness_common::resolver::{set_search_param, source_resolve_options};
use fenced_harness_common::{embed_tokens_in_url, SourceSpec, TargetSpec, Token, UrlResolver};
use fenced_harness_relay::{race_deadline, SignalChannel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::embedder::FrameEmbedder;
use crate::error::E2eResult;
use crate::expectation::{assert_field, FencedFrameTestResult, FetchTestResult};

/// Page that performs the fetch inside the fenced frame
pub const FETCHER_PAGE: &str = "resources/fenced-frame-fetcher.https.html";
/// Page that embeds the child frame whose load is observed
pub const FRAME_SOURCE_PAGE: &str = "resources/fenced-frame-local-network-access.https.html";
/// File the preflight responder serves as the child frame
pub const FRAME_TARGET_FILE: &str = "fenced-frame-local-network-access-target.https.html";
/// How long a frame load may take before it counts as failed
pub const FRAME_LOAD_DEADLINE: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioPhase {
    Setup,
    WaitingForSignal,
    Asserting,
    Done,
}

struct PhaseLog<'a> {
    name: &'a str,
    phase: ScenarioPhase,
}

impl<'a> PhaseLog<'a> {
    fn start(name: &'a str) -> Self {
        debug!("[{}] {:?}", name, ScenarioPhase::Setup);
        Self {
            name,
            phase: ScenarioPhase::Setup,
        }
    }

    fn advance(&mut self, next: ScenarioPhase) {
        debug_assert!(next > self.phase, "phases only move forward");
        debug!("[{}] {:?} -> {:?}", self.name, self.phase, next);
        self.phase = next;
    }
}

/// Collaborators shared by all scenarios of a run
#[derive(Clone)]
pub struct ScenarioContext {
    pub resolver: UrlResolver,
    pub channel: Arc<dyn SignalChannel>,
    pub embedder: Arc<dyn FrameEmbedder>,
    pub frame_deadline: Duration,
}

impl ScenarioContext {
    pub fn new(
        resolver: UrlResolver,
        channel: Arc<dyn SignalChannel>,
        embedder: Arc<dyn FrameEmbedder>,
    ) -> Self {
        Self {
            resolver,
            channel,
            embedder,
            frame_deadline: FRAME_LOAD_DEADLINE,
        }
    }

    fn source_url(&self, page: &str, source: Option<&SourceSpec>) -> E2eResult<Url> {
        let options = source.map(source_resolve_options);
        Ok(self.resolver.resolve(page, options.as_ref())?)
    }
}

/// Options passed to `fetch()` by the fetcher page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOptions {
    pub mode: String,
    pub method: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            mode: "cors".to_string(),
            method: "GET".to_string(),
        }
    }
}

/// Fetch a subresource from inside a fenced frame
#[derive(Debug, Clone)]
pub struct FetchScenario {
    pub name: String,
    pub source: Option<SourceSpec>,
    pub target: TargetSpec,
    pub fetch_options: FetchOptions,
    pub expected: FetchTestResult,
}

/// Load a frame inside a fenced frame
#[derive(Debug, Clone)]
pub struct FrameScenario {
    pub name: String,
    pub source: Option<SourceSpec>,
    pub target: TargetSpec,
    pub expected: FencedFrameTestResult,
}

#[derive(Debug, Clone)]
pub enum Scenario {
    Fetch(FetchScenario),
    Frame(FrameScenario),
}

impl Scenario {
    pub fn name(&self) -> &str {
        match self {
            Scenario::Fetch(s) => &s.name,
            Scenario::Frame(s) => &s.name,
        }
    }

    pub async fn run(&self, ctx: &ScenarioContext) -> E2eResult<Observation> {
        match self {
            Scenario::Fetch(s) => fenced_frame_fetch_test(ctx, s).await.map(Observation::Fetch),
            Scenario::Frame(s) => fenced_frame_test(ctx, s)
                .await
                .map(|result| Observation::Frame { result }),
        }
    }
}

/// Values relayed by the fetcher page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchObservation {
    pub error: String,
    pub ok: String,
    pub body: String,
    #[serde(rename = "type")]
    pub response_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Observation {
    Fetch(FetchObservation),
    Frame { result: String },
}

/// Fetch the target from a fenced frame and check what the fetcher reports
pub async fn fenced_frame_fetch_test(
    ctx: &ScenarioContext,
    scenario: &FetchScenario,
) -> E2eResult<FetchObservation> {
    let mut phase = PhaseLog::start(&scenario.name);

    let mut fetcher_url = ctx.source_url(FETCHER_PAGE, scenario.source.as_ref())?;
    let target_url = ctx.resolver.preflight_url(&scenario.target)?;

    set_search_param(&mut fetcher_url, params::MODE, &scenario.fetch_options.mode);
    set_search_param(&mut fetcher_url, params::METHOD, &scenario.fetch_options.method);
    set_search_param(&mut fetcher_url, params::URL, target_url.as_str());

    let error_token = Token::mint();
    let ok_token = Token::mint();
    let body_token = Token::mint();
    let type_token = Token::mint();
    let source_url = embed_tokens_in_url(
        &fetcher_url,
        &[
            error_token.clone(),
            ok_token.clone(),
            body_token.clone(),
            type_token.clone(),
        ],
    );

    ctx.embedder.embed_fenced_frame(&source_url).await?;

    phase.advance(ScenarioPhase::WaitingForSignal);
    let observed = FetchObservation {
        error: ctx.channel.await_value(&error_token).await?,
        ok: ctx.channel.await_value(&ok_token).await?,
        body: ctx.channel.await_value(&body_token).await?,
        response_type: ctx.channel.await_value(&type_token).await?,
    };

    phase.advance(ScenarioPhase::Asserting);
    let expected = &scenario.expected;
    assert_field("error", expected.error, &observed.error)?;
    assert_field("response body", expected.body, &observed.body)?;
    if let Some(ok) = expected.ok {
        assert_field("response ok", ok, &observed.ok)?;
    }
    if let Some(response_type) = expected.response_type {
        assert_field("response type", response_type, &observed.response_type)?;
    }

    phase.advance(ScenarioPhase::Done);
    Ok(observed)
}

/// Load the target as a frame nested in a fenced frame and check whether it loads
pub async fn fenced_frame_test(
    ctx: &ScenarioContext,
    scenario: &FrameScenario,
) -> E2eResult<String> {
    let mut phase = PhaseLog::start(&scenario.name);

    let mut target_url = ctx.resolver.preflight_url(&scenario.target)?;
    set_search_param(&mut target_url, params::FILE, FRAME_TARGET_FILE);

    let frame_loaded_key = Token::mint();
    let child_frame_target = embed_tokens_in_url(&target_url, &[frame_loaded_key.clone()]);

    let mut source_url = ctx.source_url(FRAME_SOURCE_PAGE, scenario.source.as_ref())?;
    set_search_param(
        &mut source_url,
        params::FENCED_FRAME_URL,
        child_frame_target.as_str(),
    );

    ctx.embedder.embed_fenced_frame(&source_url).await?;

    // The grandchild frame reports only if it loads.
    phase.advance(ScenarioPhase::WaitingForSignal);
    let outcome = race_deadline(ctx.channel.as_ref(), &frame_loaded_key, ctx.frame_deadline).await?;
    let result = outcome
        .value_or(FencedFrameTestResult::TIMEOUT)
        .to_string();

    phase.advance(ScenarioPhase::Asserting);
    assert_field("frame load", scenario.expected.as_str(), &result)?;

    phase.advance(ScenarioPhase::Done);
    Ok(result)
}
