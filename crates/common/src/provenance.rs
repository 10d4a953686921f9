//! Baseline provenance reporting
//!
//! Attaches descriptive, non-blocking annotations to each check: what
//! baseline the capture is being compared against, and when/under what
//! identity the current run executed. Pure side-effect - it never alters
//! the pass/fail outcome and never fails, even with no metadata file and
//! an empty environment.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Error, Result};
use crate::report::Annotation;

/// Display timezone for all rendered timestamps. Fixed offset, no tz
/// database.
const DISPLAY_OFFSET_SECS: i32 = 9 * 3600;

/// Metadata describing the commit/timestamp/run that produced the
/// currently-stored baseline images. Written by a separate
/// baseline-publishing process; absence is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineRecord {
    pub commit: String,

    /// ISO-8601 UTC timestamp of the baseline capture
    pub timestamp: String,

    pub run_id: String,
}

impl BaselineRecord {
    /// Read the record from its well-known path.
    ///
    /// The caller decides what the error path means; the reporter treats
    /// it as "absent".
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::BaselineMetadata(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::BaselineMetadata(format!("{}: {e}", path.display())))
    }
}

/// Identity of the current run, resolved once at construction rather than
/// read ad hoc from the process environment.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Commit under test, when running in CI
    pub commit: Option<String>,

    /// Branch under test, when running in CI
    pub branch: Option<String>,

    /// Reference to the commit the stored baselines came from
    pub baseline_ref: Option<String>,
}

impl RunContext {
    /// Resolve the run identity from CI environment variables. Missing
    /// values stay `None` and render as the literal "unknown".
    pub fn from_env() -> Self {
        Self {
            commit: first_env(&["GITHUB_SHA", "CI_COMMIT_SHA"]),
            branch: first_env(&["GITHUB_REF_NAME", "CI_COMMIT_BRANCH"]),
            baseline_ref: first_env(&["BASELINE_COMMIT"]),
        }
    }

    /// A CI identity requires both a commit and a branch
    pub fn is_ci(&self) -> bool {
        self.commit.is_some() && self.branch.is_some()
    }

    fn commit_or_unknown(&self) -> &str {
        self.commit.as_deref().unwrap_or("unknown")
    }

    fn branch_or_unknown(&self) -> &str {
        self.branch.as_deref().unwrap_or("unknown")
    }

    fn baseline_ref_or_unknown(&self) -> &str {
        self.baseline_ref.as_deref().unwrap_or("unknown")
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

/// Attaches baseline and current-run provenance to check results
#[derive(Debug, Clone)]
pub struct ProvenanceReporter {
    context: RunContext,
    metadata_path: PathBuf,
}

impl ProvenanceReporter {
    pub fn new(context: RunContext, metadata_path: PathBuf) -> Self {
        Self { context, metadata_path }
    }

    /// Produce the annotations for one check, capturing the wall clock
    /// once. A missing or malformed metadata file is logged and treated as
    /// absent; this method cannot fail.
    pub fn annotate(&self) -> Vec<Annotation> {
        let record = match BaselineRecord::load(&self.metadata_path) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("baseline metadata not used: {e}");
                None
            }
        };
        self.annotate_at(Utc::now(), record.as_ref())
    }

    /// Pure core of `annotate`, split out so tests can pin the clock and
    /// the record.
    pub fn annotate_at(
        &self,
        now: DateTime<Utc>,
        record: Option<&BaselineRecord>,
    ) -> Vec<Annotation> {
        let captured_at = render_display_time(now);
        let mut annotations = Vec::with_capacity(2);

        if self.context.is_ci() {
            let baseline = match record {
                Some(record) => format!(
                    "Baseline from commit {} captured at {}",
                    record.commit,
                    render_recorded_time(&record.timestamp)
                ),
                None => format!(
                    "Comparing against committed baseline (ref: {})",
                    self.context.baseline_ref_or_unknown()
                ),
            };
            annotations.push(Annotation::new("Baseline", baseline));
            annotations.push(Annotation::new(
                "Current Test",
                format!(
                    "Test commit {} | branch {} | screenshot captured at {}",
                    self.context.commit_or_unknown(),
                    self.context.branch_or_unknown(),
                    captured_at
                ),
            ));
        } else {
            let baseline = match record {
                Some(record) => format!(
                    "Baseline captured at {}",
                    render_recorded_time(&record.timestamp)
                ),
                None => "Comparing against local baseline".to_string(),
            };
            annotations.push(Annotation::new("Local Run", baseline));
            annotations.push(Annotation::new(
                "Current Test",
                format!("Screenshot captured at {captured_at}"),
            ));
        }

        annotations
    }
}

fn display_offset() -> FixedOffset {
    FixedOffset::east_opt(DISPLAY_OFFSET_SECS).expect("static UTC+9 offset")
}

fn render_display_time(instant: DateTime<Utc>) -> String {
    instant
        .with_timezone(&display_offset())
        .format("%Y-%m-%d %H:%M:%S JST")
        .to_string()
}

/// Render a recorded ISO-8601 timestamp in the display timezone. An
/// unparsable value degrades to the raw string rather than an error.
fn render_recorded_time(timestamp: &str) -> String {
    match DateTime::parse_from_rfc3339(timestamp) {
        Ok(parsed) => render_display_time(parsed.with_timezone(&Utc)),
        Err(e) => {
            warn!("unparsable baseline timestamp '{timestamp}': {e}");
            timestamp.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> BaselineRecord {
        BaselineRecord {
            commit: "abc1234".to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            run_id: "42".to_string(),
        }
    }

    fn ci_context() -> RunContext {
        RunContext {
            commit: Some("def5678".to_string()),
            branch: Some("main".to_string()),
            baseline_ref: Some("abc1234".to_string()),
        }
    }

    fn reporter(context: RunContext) -> ProvenanceReporter {
        ProvenanceReporter::new(context, PathBuf::from("/nonexistent/baseline-meta.json"))
    }

    #[test]
    fn utc_midnight_renders_as_nine_am_jst() {
        let annotations = reporter(ci_context()).annotate_at(Utc::now(), Some(&record()));
        assert_eq!(annotations[0].kind, "Baseline");
        assert_eq!(
            annotations[0].description,
            "Baseline from commit abc1234 captured at 2024-01-01 09:00:00 JST"
        );
    }

    #[test]
    fn ci_run_reports_commit_branch_and_capture_time() {
        let now = DateTime::parse_from_rfc3339("2024-06-01T15:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let annotations = reporter(ci_context()).annotate_at(now, None);
        assert_eq!(annotations.len(), 2);
        assert_eq!(
            annotations[0].description,
            "Comparing against committed baseline (ref: abc1234)"
        );
        assert_eq!(annotations[1].kind, "Current Test");
        assert_eq!(
            annotations[1].description,
            "Test commit def5678 | branch main | screenshot captured at 2024-06-02 00:30:00 JST"
        );
    }

    #[test]
    fn local_run_with_no_record_and_no_env_never_throws() {
        let annotations = reporter(RunContext::default()).annotate();
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].kind, "Local Run");
        assert_eq!(annotations[1].kind, "Current Test");
        assert!(annotations[1].description.contains("JST"));
    }

    #[test]
    fn commit_without_branch_is_not_a_ci_identity() {
        let context = RunContext {
            commit: Some("def5678".to_string()),
            ..Default::default()
        };
        assert!(!context.is_ci());
        let annotations = reporter(context).annotate_at(Utc::now(), None);
        assert_eq!(annotations[0].kind, "Local Run");
    }

    #[test]
    fn unparsable_record_timestamp_degrades_to_raw_text() {
        let mut bad = record();
        bad.timestamp = "yesterday-ish".to_string();
        let annotations = reporter(ci_context()).annotate_at(Utc::now(), Some(&bad));
        assert!(annotations[0].description.contains("yesterday-ish"));
    }

    #[test]
    fn record_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline-meta.json");
        std::fs::write(
            &path,
            r#"{ "commit": "abc1234", "timestamp": "2024-01-01T00:00:00Z", "run_id": "42" }"#,
        )
        .unwrap();
        let record = BaselineRecord::load(&path).unwrap();
        assert_eq!(record.commit, "abc1234");
        assert_eq!(record.run_id, "42");
    }

    #[test]
    fn malformed_record_is_an_explicit_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline-meta.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            BaselineRecord::load(&path),
            Err(Error::BaselineMetadata(_))
        ));
    }
}
