//! Scenario runner that loads specs, runs them concurrently and reports results

use chrono::{DateTime, Utc};
use fenced_harness_common::ServerRegistry;
use futures::future::join_all;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::error::{E2eError, E2eResult};
use crate::orchestrator::{Observation, ScenarioContext, FRAME_LOAD_DEADLINE};
use crate::spec::ScenarioSpec;

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub observed: Option<Observation>,
    pub error: Option<String>,
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioSuiteResult {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl ScenarioSuiteResult {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Configuration for the scenario runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub specs_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Upper bound for one scenario, from setup to the last assertion
    pub scenario_timeout: Duration,
    /// How long a frame load may take before it counts as failed
    pub frame_deadline: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            specs_dir: PathBuf::from("tests/specs"),
            output_dir: PathBuf::from("test-results"),
            scenario_timeout: Duration::from_secs(60),
            frame_deadline: FRAME_LOAD_DEADLINE,
        }
    }
}

/// Runs scenario specs against a shared [`ScenarioContext`]
pub struct ScenarioRunner {
    ctx: ScenarioContext,
    registry: ServerRegistry,
    config: RunnerConfig,
}

impl ScenarioRunner {
    pub fn new(mut ctx: ScenarioContext, registry: ServerRegistry, config: RunnerConfig) -> Self {
        ctx.frame_deadline = config.frame_deadline;
        Self {
            ctx,
            registry,
            config,
        }
    }

    /// Run all scenarios in the specs directory
    pub async fn run_all(&self) -> E2eResult<ScenarioSuiteResult> {
        let specs = ScenarioSpec::load_all(&self.config.specs_dir)?;
        Ok(self.run_specs(&specs).await)
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<ScenarioSuiteResult> {
        let specs = ScenarioSpec::load_all(&self.config.specs_dir)?;
        let filtered: Vec<ScenarioSpec> = ScenarioSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .cloned()
            .collect();
        Ok(self.run_specs(&filtered).await)
    }

    /// Run a specific scenario by name
    pub async fn run_named(&self, name: &str) -> E2eResult<ScenarioResult> {
        let specs = ScenarioSpec::load_all(&self.config.specs_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Scenario not found: {}", name)))?;

        Ok(self.run_spec(&spec).await)
    }

    /// Run scenarios concurrently. Each one owns its tokens, so they never interfere.
    pub async fn run_specs(&self, specs: &[ScenarioSpec]) -> ScenarioSuiteResult {
        let started_at = Utc::now();
        let start = Instant::now();

        info!("Running {} scenario(s)...", specs.len());

        let results = join_all(specs.iter().map(|spec| self.run_spec(spec))).await;

        let mut passed = 0;
        let mut failed = 0;
        for result in &results {
            if result.success {
                passed += 1;
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                failed += 1;
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Scenario results: {} passed, {} failed ({} ms)",
            passed, failed, duration_ms
        );

        ScenarioSuiteResult {
            started_at,
            total: specs.len(),
            passed,
            failed,
            duration_ms,
            results,
        }
    }

    /// Run a single scenario; failures are captured in the result
    pub async fn run_spec(&self, spec: &ScenarioSpec) -> ScenarioResult {
        let start = Instant::now();
        debug!("Running scenario: {}", spec.name);

        let outcome = match spec.build(&self.registry) {
            Ok(scenario) => {
                match tokio::time::timeout(self.config.scenario_timeout, scenario.run(&self.ctx))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(E2eError::Timeout(format!("scenario {}", spec.name))),
                }
            }
            Err(e) => Err(e),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(observed) => ScenarioResult {
                name: spec.name.clone(),
                success: true,
                duration_ms,
                observed: Some(observed),
                error: None,
            },
            Err(e) => ScenarioResult {
                name: spec.name.clone(),
                success: false,
                duration_ms,
                observed: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Write results to a JSON file
    pub fn write_results(&self, results: &ScenarioSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("scenario-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
