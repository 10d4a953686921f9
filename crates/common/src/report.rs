//! Per-check and per-run result model
//!
//! The report sink consumes, per check: a pass/fail/skip status, ordered
//! annotations, and named binary artifacts (the "actual" capture, plus the
//! diff image when one was produced).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Final status of one check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,

    Failed { reason: String },

    /// Element-level precondition not met. A visual regression on an
    /// absent or late element is not a meaningful signal, so these never
    /// count as failures. Page-level checks are never skipped.
    Skipped { reason: SkipReason },
}

impl CheckStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, CheckStatus::Failed { .. })
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, CheckStatus::Skipped { .. })
    }
}

/// Why an element-level check was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "selector", rename_all = "snake_case")]
pub enum SkipReason {
    /// Zero matches for the selector on the live page
    ElementNotFound(String),

    /// The element exists but never became visible within its budget
    ElementNotVisible(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::ElementNotFound(selector) => {
                write!(f, "element not found: {selector}")
            }
            SkipReason::ElementNotVisible(selector) => {
                write!(f, "element not visible within timeout: {selector}")
            }
        }
    }
}

/// A human-readable note attached to a check result.
///
/// Additive and order-preserving; attaching annotations never alters the
/// pass/fail outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

impl Annotation {
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self { kind: kind.into(), description: description.into() }
    }
}

/// A binary artifact attached to a check result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Role of the artifact within the check ("actual", "diff")
    pub name: String,
    pub path: PathBuf,
    pub content_type: String,
}

impl Artifact {
    pub fn png(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
            content_type: "image/png".to_string(),
        }
    }
}

/// Result of one executed check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub artifact_name: String,
    pub description: String,
    #[serde(flatten)]
    pub status: CheckStatus,
    pub duration_ms: u64,
    pub annotations: Vec<Annotation>,
    pub artifacts: Vec<Artifact>,
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<CheckReport>,
}

impl SuiteResult {
    /// Tally reports into a suite summary
    pub fn from_reports(results: Vec<CheckReport>, duration_ms: u64) -> Self {
        let passed = results
            .iter()
            .filter(|r| matches!(r.status, CheckStatus::Passed))
            .count();
        let failed = results.iter().filter(|r| r.status.is_failure()).count();
        let skipped = results.iter().filter(|r| r.status.is_skip()).count();
        Self {
            total: results.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_reason_mentions_the_selector() {
        let reason = SkipReason::ElementNotFound(".hero-banner".to_string());
        assert!(reason.to_string().contains(".hero-banner"));

        let reason = SkipReason::ElementNotVisible("#late-widget".to_string());
        let text = reason.to_string();
        assert!(text.contains("#late-widget"));
        assert!(text.contains("timeout"));
    }

    #[test]
    fn suite_tally() {
        let report = |status: CheckStatus| CheckReport {
            artifact_name: "home-desktop".to_string(),
            description: String::new(),
            status,
            duration_ms: 10,
            annotations: Vec::new(),
            artifacts: Vec::new(),
        };
        let suite = SuiteResult::from_reports(
            vec![
                report(CheckStatus::Passed),
                report(CheckStatus::Failed { reason: "2400 pixels differ".to_string() }),
                report(CheckStatus::Skipped {
                    reason: SkipReason::ElementNotFound("nav".to_string()),
                }),
            ],
            123,
        );
        assert_eq!(suite.total, 3);
        assert_eq!(suite.passed, 1);
        assert_eq!(suite.failed, 1);
        assert_eq!(suite.skipped, 1);
    }

    #[test]
    fn status_serializes_with_a_tag() {
        let json = serde_json::to_value(CheckStatus::Skipped {
            reason: SkipReason::ElementNotVisible("nav".to_string()),
        })
        .unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"]["kind"], "element_not_visible");
    }
}
