//! Stillframe capture harness
//!
//! Executes the visual regression checks generated from the declarative
//! registry: drives a browser to each page/element, stabilizes the view,
//! captures it, and compares it against the stored baseline.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     SuiteRunner                              │
//! │   Registry (JSON) ──expand──▶ [CheckInstance]                │
//! ├──────────────────────────────────────────────────────────────┤
//! │   StabilizeController (per check, concurrent)                │
//! │     ├── plan(check, SettlePolicy) -> CapturePlan             │
//! │     ├── CaptureDriver::run(plan)  -> CaptureOutcome          │
//! │     │     (PlaywrightDriver: plan -> JS -> node process)     │
//! │     ├── VisualTester::compare(artifact, tolerance)           │
//! │     └── ProvenanceReporter::annotate()                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │   SuiteResult -> test-results.json                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each check owns an exclusive browser context for its duration; the
//! only shared inputs (baseline images, baseline metadata) are read-only.

pub mod error;
pub mod playwright;
pub mod runner;
pub mod stabilize;
pub mod visual;

pub use error::{HarnessError, HarnessResult};
pub use playwright::{Browser, PlaywrightConfig, PlaywrightDriver};
pub use runner::{RunnerConfig, SuiteRunner};
pub use stabilize::{CaptureDriver, CaptureOutcome, CapturePlan, StabilizeController};
pub use visual::{ComparisonReport, VisualConfig, VisualTester};
