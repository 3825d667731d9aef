//! Runs scenarios against fresh integrations and collects results

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use cssbuild_common::{HarnessConfig, OutputMode};

use crate::error::{E2eError, E2eResult};
use crate::integration::Integration;
use crate::scenarios::{self, Scenario};

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteResult {
    pub mode: OutputMode,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Runs each scenario in its own sandbox, one at a time
pub struct SuiteRunner {
    config: HarnessConfig,
    mode: OutputMode,
    output_dir: PathBuf,
}

impl SuiteRunner {
    pub fn new(config: HarnessConfig, mode: OutputMode) -> Self {
        Self {
            config,
            mode,
            output_dir: PathBuf::from("test-results"),
        }
    }

    /// Directory that receives `test-results.json`
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub async fn run_all(&self) -> E2eResult<SuiteResult> {
        self.run_scenarios(&scenarios::all()).await
    }

    /// Run scenarios carrying `tag`
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<SuiteResult> {
        let tagged: Vec<Scenario> = scenarios::all()
            .into_iter()
            .filter(|s| s.has_tag(tag))
            .collect();
        if tagged.is_empty() {
            warn!("No scenario tagged '{}'", tag);
        }
        self.run_scenarios(&tagged).await
    }

    /// Run one scenario by exact name
    pub async fn run_named(&self, name: &str) -> E2eResult<SuiteResult> {
        let scenario = scenarios::find(name).ok_or_else(|| E2eError::ScenarioNotFound(name.to_string()))?;
        self.run_scenarios(&[scenario]).await
    }

    pub async fn run_scenarios(&self, scenarios: &[Scenario]) -> E2eResult<SuiteResult> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());
        let mut passed = 0;
        let mut failed = 0;

        info!("Running {} scenario(s) in {:?} mode...", scenarios.len(), self.mode);

        for scenario in scenarios {
            let result = self.run_scenario(scenario).await;
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
            results.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!("Results: {} passed, {} failed ({} ms)", passed, failed, duration_ms);

        Ok(SuiteResult {
            mode: self.mode,
            total: scenarios.len(),
            passed,
            failed,
            duration_ms,
            results,
        })
    }

    /// Set up, run under the scenario timeout, and always tear down.
    ///
    /// A teardown failure fails an otherwise passing scenario.
    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();
        debug!("Running scenario: {}", scenario.name);

        let outcome = match Integration::setup(&self.config, self.mode).await {
            Ok(ctx) => {
                let limit = self.config.timeouts.scenario();
                let outcome = match tokio::time::timeout(limit, (scenario.run)(&ctx)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(E2eError::Timeout {
                        what: format!("scenario {}", scenario.name),
                        timeout: limit,
                    }),
                };
                let cleanup = ctx.teardown().await;
                outcome.and(cleanup)
            }
            Err(e) => Err(e),
        };

        ScenarioResult {
            name: scenario.name.to_string(),
            success: outcome.is_ok(),
            duration_ms: start.elapsed().as_millis() as u64,
            error: outcome.err().map(|e| e.to_string()),
        }
    }

    /// Write results to `test-results.json` in the output directory
    pub fn write_results(&self, results: &SuiteResult) -> E2eResult<PathBuf> {
        write_results(&self.output_dir, results)
    }
}

pub fn write_results(dir: &Path, results: &SuiteResult) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let path = dir.join("test-results.json");
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}
