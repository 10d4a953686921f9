//! Suite orchestration: registry to reports
//!
//! Loads and validates the registry, expands it into check instances,
//! runs them with bounded concurrency, and writes the suite report.
//! Checks are independent, so execution order is unconstrained; reports
//! are re-sorted into generation order so output is reproducible.

use futures::StreamExt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};

use stillframe_common::{
    expand, CheckInstance, CheckStatus, ProvenanceReporter, Registry, RunContext, SettlePolicy,
    SuiteResult, BASELINE_METADATA_FILE,
};

use crate::error::{HarnessError, HarnessResult};
use crate::playwright::{PlaywrightConfig, PlaywrightDriver};
use crate::stabilize::{CaptureDriver, StabilizeController};
use crate::visual::{VisualConfig, VisualTester};

/// Configuration for a suite run
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Path to the JSON registry of pages and elements
    pub registry_path: PathBuf,

    pub playwright: PlaywrightConfig,
    pub visual: VisualConfig,
    pub settle: SettlePolicy,

    /// Checks in flight at once; each owns its own browser context
    pub parallelism: usize,

    /// Directory the suite report is written into
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            registry_path: PathBuf::from("config/visual-test-urls.json"),
            playwright: PlaywrightConfig::default(),
            visual: VisualConfig::default(),
            settle: SettlePolicy::default(),
            parallelism: 4,
            output_dir: PathBuf::from("test-results"),
        }
    }
}

/// Runs the whole visual regression suite
pub struct SuiteRunner {
    config: RunnerConfig,
}

impl SuiteRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Run every check generated from the registry
    pub async fn run_all(&self) -> HarnessResult<SuiteResult> {
        let checks = self.generate()?;
        self.run_checks(checks).await
    }

    /// Run a single check by artifact name
    pub async fn run_named(&self, name: &str) -> HarnessResult<SuiteResult> {
        let checks: Vec<CheckInstance> = self
            .generate()?
            .into_iter()
            .filter(|c| c.artifact_name == name)
            .collect();
        if checks.is_empty() {
            return Err(HarnessError::Comparison(format!("no check named '{name}'")));
        }
        self.run_checks(checks).await
    }

    /// Load, validate, and expand the registry. Any error here is a
    /// configuration error and aborts before any check executes.
    pub fn generate(&self) -> HarnessResult<Vec<CheckInstance>> {
        let registry = Registry::from_file(&self.config.registry_path)?;
        let checks = expand(&registry);
        info!(
            "registry '{}' expands to {} check(s)",
            self.config.registry_path.display(),
            checks.len()
        );
        Ok(checks)
    }

    async fn run_checks(&self, checks: Vec<CheckInstance>) -> HarnessResult<SuiteResult> {
        let start = Instant::now();

        let driver = PlaywrightDriver::new(self.config.playwright.clone())?;
        let visual = VisualTester::new(self.config.visual.clone())?;
        let reporter = ProvenanceReporter::new(
            RunContext::from_env(),
            self.config.visual.baseline_dir.join(BASELINE_METADATA_FILE),
        );
        let controller = StabilizeController::new(
            &driver as &dyn CaptureDriver,
            &visual,
            &reporter,
            self.config.settle,
        );

        let parallelism = self.config.parallelism.max(1);
        info!("running {} check(s), {} in flight", checks.len(), parallelism);

        let mut indexed: Vec<(usize, stillframe_common::CheckReport)> =
            futures::stream::iter(checks.iter().enumerate().map(|(index, check)| {
                let controller = &controller;
                async move { (index, controller.execute(check).await) }
            }))
            .buffer_unordered(parallelism)
            .collect()
            .await;

        // Back to generation order for reproducible reporting
        indexed.sort_by_key(|(index, _)| *index);
        let results: Vec<_> = indexed.into_iter().map(|(_, report)| report).collect();

        for report in &results {
            match &report.status {
                CheckStatus::Passed => {
                    info!("✓ {} ({} ms)", report.artifact_name, report.duration_ms);
                }
                CheckStatus::Failed { reason } => {
                    error!("✗ {} - {}", report.artifact_name, reason);
                }
                CheckStatus::Skipped { reason } => {
                    warn!("- {} - {}", report.artifact_name, reason);
                }
            }
        }

        let suite = SuiteResult::from_reports(results, start.elapsed().as_millis() as u64);
        info!(
            "Suite: {} passed, {} failed, {} skipped ({} ms)",
            suite.passed, suite.failed, suite.skipped, suite.duration_ms
        );

        Ok(suite)
    }

    /// Adopt the current captures as baselines
    pub fn update_baselines(&self) -> HarnessResult<usize> {
        let visual = VisualTester::new(self.config.visual.clone())?;
        visual.update_all_baselines()
    }

    /// Write the suite report to `<output_dir>/test-results.json`
    pub fn write_results(&self, results: &SuiteResult) -> HarnessResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("results written to: {}", path.display());
        Ok(path)
    }
}
