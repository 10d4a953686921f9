//! Stillframe Common Library
//!
//! Shared data model for the stillframe visual regression harness: the
//! declarative page/element registry, check generation, baseline
//! provenance, and the per-check report model.

pub mod check;
pub mod error;
pub mod provenance;
pub mod registry;
pub mod report;

// Re-export commonly used types
pub use check::{expand, CheckInstance, CheckKind, SettlePolicy, TolerancePolicy};
pub use error::{Error, Result};
pub use provenance::{BaselineRecord, ProvenanceReporter, RunContext};
pub use registry::{ElementSpec, PageSpec, Registry, Viewport};
pub use report::{Annotation, Artifact, CheckReport, CheckStatus, SkipReason, SuiteResult};

/// Stillframe version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Well-known baseline metadata filename, written next to the baseline
/// images by the publishing process
pub const BASELINE_METADATA_FILE: &str = "baseline-meta.json";
