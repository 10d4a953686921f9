//! Stabilization & capture control
//!
//! Builds a deterministic capture plan for each check and drives it
//! through a [`CaptureDriver`], then hands the captured image to the
//! comparison engine and assembles the final report. Plans are pure data
//! so the timing protocol can be unit tested without a browser.

use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info};

use stillframe_common::{
    Annotation, Artifact, CheckInstance, CheckKind, CheckReport, CheckStatus,
    ProvenanceReporter, SettlePolicy, SkipReason, TolerancePolicy,
};

use crate::error::{HarnessError, HarnessResult};
use crate::visual::VisualTester;

/// Allowance for navigation itself, on top of the settle and comparison
/// budgets. Matches the driver-side goto timeout.
pub const NAV_ALLOWANCE_MS: u64 = 30_000;

/// Everything a driver needs to bring one check's target to a steady
/// visual state and capture it. Built purely from the check, the settle
/// policy, and nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturePlan {
    /// Full-page capture: viewport, load wait, settle, scroll reset +
    /// animation-disable override, settle again, masked screenshot.
    Page {
        artifact_name: String,
        path: String,
        viewport: (u32, u32),
        masks: Vec<String>,
        post_load_ms: u64,
        post_override_ms: u64,
    },

    /// Element capture: load wait, settle, existence probe, visibility
    /// wait, settle, element screenshot.
    Element {
        artifact_name: String,
        path: String,
        selector: String,
        nav_settle_ms: u64,
        visible_timeout_ms: u64,
        pre_capture_ms: u64,
    },
}

impl CapturePlan {
    pub fn artifact_name(&self) -> &str {
        match self {
            CapturePlan::Page { artifact_name, .. } => artifact_name,
            CapturePlan::Element { artifact_name, .. } => artifact_name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            CapturePlan::Page { path, .. } => path,
            CapturePlan::Element { path, .. } => path,
        }
    }

    /// Sum of all fixed waits in the plan, including the element
    /// visibility budget
    pub fn settle_total_ms(&self) -> u64 {
        match self {
            CapturePlan::Page { post_load_ms, post_override_ms, .. } => {
                post_load_ms + post_override_ms
            }
            CapturePlan::Element {
                nav_settle_ms,
                visible_timeout_ms,
                pre_capture_ms,
                ..
            } => nav_settle_ms + visible_timeout_ms + pre_capture_ms,
        }
    }
}

/// Build the capture plan for a check
pub fn plan(check: &CheckInstance, settle: &SettlePolicy) -> CapturePlan {
    match &check.kind {
        CheckKind::Page { viewport, masks } => CapturePlan::Page {
            artifact_name: check.artifact_name.clone(),
            path: check.path.clone(),
            viewport: viewport.dimensions(),
            masks: masks.clone(),
            post_load_ms: settle.post_load_ms,
            post_override_ms: settle.post_override_ms,
        },
        CheckKind::Element { selector } => CapturePlan::Element {
            artifact_name: check.artifact_name.clone(),
            path: check.path.clone(),
            selector: selector.clone(),
            nav_settle_ms: settle.element_nav_ms,
            visible_timeout_ms: settle.element_visible_timeout_ms,
            pre_capture_ms: settle.element_pre_capture_ms,
        },
    }
}

/// Whole-capture budget for one check: navigation allowance, every fixed
/// wait in the plan, and the comparison budget from the tolerance policy.
/// Exceeding it fails only this check.
pub fn capture_budget_ms(plan: &CapturePlan, tolerance: &TolerancePolicy) -> u64 {
    NAV_ALLOWANCE_MS + plan.settle_total_ms() + tolerance.timeout_ms
}

/// How a capture attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Screenshot written to the actual directory
    Captured { screenshot: std::path::PathBuf },

    /// The element selector matched zero nodes
    ElementAbsent,

    /// The element exists but never became visible within its budget
    ElementNotVisible,
}

/// Narrow seam to the page-automation capability. One `run` call owns an
/// exclusive browser context for its whole duration, so concurrent checks
/// never share page state.
#[async_trait::async_trait]
pub trait CaptureDriver: Send + Sync {
    async fn run(&self, plan: &CapturePlan) -> HarnessResult<CaptureOutcome>;
}

/// Executes checks end to end: plan, capture, compare, annotate
pub struct StabilizeController<'a> {
    driver: &'a dyn CaptureDriver,
    visual: &'a VisualTester,
    reporter: &'a ProvenanceReporter,
    settle: SettlePolicy,
}

impl<'a> StabilizeController<'a> {
    pub fn new(
        driver: &'a dyn CaptureDriver,
        visual: &'a VisualTester,
        reporter: &'a ProvenanceReporter,
        settle: SettlePolicy,
    ) -> Self {
        Self { driver, visual, reporter, settle }
    }

    /// Run one check to completion. Never returns an error: every failure
    /// mode is scoped to this check's report, and provenance annotations
    /// are attached regardless of the outcome.
    pub async fn execute(&self, check: &CheckInstance) -> CheckReport {
        let start = Instant::now();
        let mut annotations = self.reporter.annotate();
        let plan = plan(check, &self.settle);
        let budget_ms = capture_budget_ms(&plan, &check.tolerance);

        debug!(artifact = %check.artifact_name, budget_ms, "executing check");

        let outcome = match timeout(
            Duration::from_millis(budget_ms),
            self.driver.run(&plan),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                return self.report(check, start, annotations, Vec::new(), CheckStatus::Failed {
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                let e = HarnessError::CaptureTimeout {
                    artifact: check.artifact_name.clone(),
                    budget_ms,
                };
                return self.report(check, start, annotations, Vec::new(), CheckStatus::Failed {
                    reason: e.to_string(),
                });
            }
        };

        let (status, artifacts) = match outcome {
            CaptureOutcome::ElementAbsent => (self.skip(check, SkipReason::ElementNotFound), Vec::new()),
            CaptureOutcome::ElementNotVisible => {
                (self.skip(check, SkipReason::ElementNotVisible), Vec::new())
            }
            CaptureOutcome::Captured { screenshot } => {
                let mut artifacts = vec![Artifact::png("actual", screenshot)];
                let status = self.compare(check, &mut annotations, &mut artifacts);
                (status, artifacts)
            }
        };

        self.report(check, start, annotations, artifacts, status)
    }

    /// Skip is only meaningful for element checks; a driver signalling
    /// absence for a page plan is a protocol violation and fails the
    /// check.
    fn skip(
        &self,
        check: &CheckInstance,
        reason: fn(String) -> SkipReason,
    ) -> CheckStatus {
        match &check.kind {
            CheckKind::Element { selector } => CheckStatus::Skipped {
                reason: reason(selector.clone()),
            },
            CheckKind::Page { .. } => CheckStatus::Failed {
                reason: "driver reported a missing element for a page-level check".to_string(),
            },
        }
    }

    fn compare(
        &self,
        check: &CheckInstance,
        annotations: &mut Vec<Annotation>,
        artifacts: &mut Vec<Artifact>,
    ) -> CheckStatus {
        match self.visual.compare(&check.artifact_name, &check.tolerance) {
            Ok(cmp) if cmp.matches => CheckStatus::Passed,
            Ok(cmp) => {
                if let Some(diff) = cmp.diff_image_path {
                    artifacts.push(Artifact::png("diff", diff));
                }
                CheckStatus::Failed {
                    reason: format!(
                        "{} of {} pixels differ (allowed {})",
                        cmp.diff_pixels, cmp.total_pixels, check.tolerance.max_diff_pixels
                    ),
                }
            }
            Err(HarnessError::BaselineNotFound(_)) => {
                // First run for this artifact. Not a regression signal.
                info!(
                    artifact = %check.artifact_name,
                    "no baseline stored; run with --update-baselines to adopt the capture"
                );
                annotations.push(Annotation::new(
                    "Baseline",
                    "no baseline stored for this artifact; capture kept for review",
                ));
                CheckStatus::Passed
            }
            Err(e) => CheckStatus::Failed { reason: e.to_string() },
        }
    }

    fn report(
        &self,
        check: &CheckInstance,
        start: Instant,
        annotations: Vec<Annotation>,
        artifacts: Vec<Artifact>,
        status: CheckStatus,
    ) -> CheckReport {
        CheckReport {
            artifact_name: check.artifact_name.clone(),
            description: check.description.clone(),
            status,
            duration_ms: start.elapsed().as_millis() as u64,
            annotations,
            artifacts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visual::VisualConfig;
    use image::RgbaImage;
    use std::path::{Path, PathBuf};
    use stillframe_common::{RunContext, Viewport};

    /// Driver that returns a canned outcome, optionally writing the
    /// screenshot it claims to have taken
    struct ScriptedDriver {
        outcome: CaptureOutcome,
        write_screenshot: Option<(PathBuf, RgbaImage)>,
    }

    #[async_trait::async_trait]
    impl CaptureDriver for ScriptedDriver {
        async fn run(&self, _plan: &CapturePlan) -> HarnessResult<CaptureOutcome> {
            if let Some((path, img)) = &self.write_screenshot {
                img.save(path).unwrap();
            }
            Ok(self.outcome.clone())
        }
    }

    struct FailingDriver;

    #[async_trait::async_trait]
    impl CaptureDriver for FailingDriver {
        async fn run(&self, plan: &CapturePlan) -> HarnessResult<CaptureOutcome> {
            Err(HarnessError::Navigation {
                path: plan.path().to_string(),
                reason: "net::ERR_CONNECTION_REFUSED".to_string(),
            })
        }
    }

    fn page_check(name: &str) -> CheckInstance {
        CheckInstance {
            artifact_name: format!("{name}-desktop"),
            description: format!("{name} page"),
            path: format!("/{name}"),
            kind: CheckKind::Page {
                viewport: Viewport::Desktop,
                masks: vec![".clock".to_string()],
            },
            tolerance: TolerancePolicy::page(),
        }
    }

    fn element_check(name: &str, selector: &str) -> CheckInstance {
        CheckInstance {
            artifact_name: name.to_string(),
            description: String::new(),
            path: "/".to_string(),
            kind: CheckKind::Element { selector: selector.to_string() },
            tolerance: TolerancePolicy::element(),
        }
    }

    fn flat_image(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, image::Rgba(rgba))
    }

    fn visual_in(dir: &Path) -> VisualTester {
        VisualTester::new(VisualConfig {
            baseline_dir: dir.join("baselines"),
            actual_dir: dir.join("actual"),
            diff_dir: dir.join("diffs"),
            auto_update: false,
        })
        .unwrap()
    }

    fn reporter() -> ProvenanceReporter {
        ProvenanceReporter::new(
            RunContext::default(),
            PathBuf::from("/nonexistent/baseline-meta.json"),
        )
    }

    #[test]
    fn page_plan_carries_the_settle_policy() {
        let settle = SettlePolicy::default();
        let built = plan(&page_check("home"), &settle);
        match built {
            CapturePlan::Page {
                viewport,
                post_load_ms,
                post_override_ms,
                ref masks,
                ..
            } => {
                assert_eq!(viewport, (1920, 1080));
                assert_eq!(post_load_ms, 3_000);
                assert_eq!(post_override_ms, 1_000);
                assert_eq!(masks, &vec![".clock".to_string()]);
            }
            other => panic!("expected page plan, got {other:?}"),
        }
        assert_eq!(built.settle_total_ms(), 4_000);
    }

    #[test]
    fn element_plan_carries_the_settle_policy() {
        let built = plan(&element_check("header", "header.site"), &SettlePolicy::default());
        match built {
            CapturePlan::Element {
                nav_settle_ms,
                visible_timeout_ms,
                pre_capture_ms,
                ref selector,
                ..
            } => {
                assert_eq!(nav_settle_ms, 1_000);
                assert_eq!(visible_timeout_ms, 10_000);
                assert_eq!(pre_capture_ms, 500);
                assert_eq!(selector, "header.site");
            }
            other => panic!("expected element plan, got {other:?}"),
        }
    }

    #[test]
    fn budget_covers_navigation_settle_and_comparison() {
        let check = page_check("home");
        let built = plan(&check, &SettlePolicy::default());
        assert_eq!(capture_budget_ms(&built, &check.tolerance), 30_000 + 4_000 + 30_000);
    }

    #[tokio::test]
    async fn absent_element_is_skipped_with_selector_in_reason() {
        let dir = tempfile::tempdir().unwrap();
        let visual = visual_in(dir.path());
        let reporter = reporter();
        let driver = ScriptedDriver {
            outcome: CaptureOutcome::ElementAbsent,
            write_screenshot: None,
        };
        let controller =
            StabilizeController::new(&driver, &visual, &reporter, SettlePolicy::default());

        let report = controller.execute(&element_check("hero", ".hero-banner")).await;
        match &report.status {
            CheckStatus::Skipped { reason } => {
                assert!(reason.to_string().contains(".hero-banner"));
            }
            other => panic!("expected skip, got {other:?}"),
        }
        assert!(report.artifacts.is_empty());
        assert_eq!(report.annotations.len(), 2);
    }

    #[tokio::test]
    async fn late_element_is_skipped_not_failed() {
        let dir = tempfile::tempdir().unwrap();
        let visual = visual_in(dir.path());
        let reporter = reporter();
        let driver = ScriptedDriver {
            outcome: CaptureOutcome::ElementNotVisible,
            write_screenshot: None,
        };
        let controller =
            StabilizeController::new(&driver, &visual, &reporter, SettlePolicy::default());

        let report = controller.execute(&element_check("widget", "#late-widget")).await;
        assert!(report.status.is_skip());
        assert!(!report.status.is_failure());
    }

    #[tokio::test]
    async fn matching_capture_passes_and_attaches_the_actual_image() {
        let dir = tempfile::tempdir().unwrap();
        let visual = visual_in(dir.path());
        let reporter = reporter();

        let img = flat_image(16, 16, [10, 20, 30, 255]);
        img.save(dir.path().join("baselines/home-desktop.png")).unwrap();
        let actual_path = dir.path().join("actual/home-desktop.png");
        let driver = ScriptedDriver {
            outcome: CaptureOutcome::Captured { screenshot: actual_path.clone() },
            write_screenshot: Some((actual_path, img)),
        };
        let controller =
            StabilizeController::new(&driver, &visual, &reporter, SettlePolicy::default());

        let report = controller.execute(&page_check("home")).await;
        assert!(matches!(report.status, CheckStatus::Passed));
        assert_eq!(report.artifacts.len(), 1);
        assert_eq!(report.artifacts[0].name, "actual");
        assert_eq!(report.artifacts[0].content_type, "image/png");
    }

    #[tokio::test]
    async fn divergent_capture_fails_with_diff_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let visual = visual_in(dir.path());
        let reporter = reporter();

        flat_image(64, 64, [0, 0, 0, 255])
            .save(dir.path().join("baselines/home-desktop.png"))
            .unwrap();
        let actual_path = dir.path().join("actual/home-desktop.png");
        let driver = ScriptedDriver {
            outcome: CaptureOutcome::Captured { screenshot: actual_path.clone() },
            write_screenshot: Some((actual_path, flat_image(64, 64, [255, 255, 255, 255]))),
        };
        let controller =
            StabilizeController::new(&driver, &visual, &reporter, SettlePolicy::default());

        let report = controller.execute(&page_check("home")).await;
        match &report.status {
            CheckStatus::Failed { reason } => assert!(reason.contains("pixels differ")),
            other => panic!("expected failure, got {other:?}"),
        }
        let names: Vec<&str> = report.artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["actual", "diff"]);
    }

    #[tokio::test]
    async fn missing_baseline_does_not_fail_the_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let visual = visual_in(dir.path());
        let reporter = reporter();

        let actual_path = dir.path().join("actual/home-desktop.png");
        let driver = ScriptedDriver {
            outcome: CaptureOutcome::Captured { screenshot: actual_path.clone() },
            write_screenshot: Some((actual_path, flat_image(8, 8, [1, 2, 3, 255]))),
        };
        let controller =
            StabilizeController::new(&driver, &visual, &reporter, SettlePolicy::default());

        let report = controller.execute(&page_check("home")).await;
        assert!(matches!(report.status, CheckStatus::Passed));
        assert!(report
            .annotations
            .iter()
            .any(|a| a.description.contains("no baseline stored")));
    }

    #[tokio::test]
    async fn navigation_failure_fails_only_the_check() {
        let dir = tempfile::tempdir().unwrap();
        let visual = visual_in(dir.path());
        let reporter = reporter();
        let controller =
            StabilizeController::new(&FailingDriver, &visual, &reporter, SettlePolicy::default());

        let report = controller.execute(&page_check("home")).await;
        match &report.status {
            CheckStatus::Failed { reason } => {
                assert!(reason.contains("ERR_CONNECTION_REFUSED"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        // Provenance still attached on failure
        assert_eq!(report.annotations.len(), 2);
    }

    #[tokio::test]
    async fn absent_outcome_for_a_page_plan_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let visual = visual_in(dir.path());
        let reporter = reporter();
        let driver = ScriptedDriver {
            outcome: CaptureOutcome::ElementAbsent,
            write_screenshot: None,
        };
        let controller =
            StabilizeController::new(&driver, &visual, &reporter, SettlePolicy::default());

        let report = controller.execute(&page_check("home")).await;
        assert!(report.status.is_failure());
    }
}
