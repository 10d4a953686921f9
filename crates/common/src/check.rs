//! Test case generation
//!
//! Pure expansion of the declarative registry into concrete check
//! instances: one per page x viewport, one per element. Ordering follows
//! registry order then viewport-declaration order so reports are
//! reproducible across runs.

use serde::{Deserialize, Serialize};

use crate::registry::{Registry, Viewport};

/// Tolerance applied when a capture is compared against its baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TolerancePolicy {
    /// Budget for the whole capture-and-compare phase
    pub timeout_ms: u64,

    /// Number of differing pixels allowed before the check fails
    pub max_diff_pixels: u64,
}

impl TolerancePolicy {
    /// Default tolerance for full-page comparisons
    pub fn page() -> Self {
        Self { timeout_ms: 30_000, max_diff_pixels: 2_000 }
    }

    /// Tighter tolerance for single-element comparisons
    pub fn element() -> Self {
        Self { timeout_ms: 10_000, max_diff_pixels: 500 }
    }
}

/// Named, tunable wait budgets used to bring a page to a steady visual
/// state before capture.
///
/// Dynamic content (animations, lazy loading, async widgets) cannot be
/// waited on generically, so a bounded settle window plus an explicit
/// animation-disable override is used to bound flakiness at the cost of
/// fixed per-check latency. Call sites never hard-code these values, so a
/// signal-based readiness check can replace them later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlePolicy {
    /// Wait after the load event, for deferred/async content
    pub post_load_ms: u64,

    /// Wait after the scroll reset + animation-disable override
    pub post_override_ms: u64,

    /// Wait after navigation before probing an element
    pub element_nav_ms: u64,

    /// How long an element gets to become visible before the check is
    /// skipped (not failed)
    pub element_visible_timeout_ms: u64,

    /// Final wait before an element capture
    pub element_pre_capture_ms: u64,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            post_load_ms: 3_000,
            post_override_ms: 1_000,
            element_nav_ms: 1_000,
            element_visible_timeout_ms: 10_000,
            element_pre_capture_ms: 500,
        }
    }
}

/// What a check targets on the live page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckKind {
    /// Full-page capture at a fixed viewport
    Page {
        viewport: Viewport,
        /// Regions excluded from comparison
        masks: Vec<String>,
    },

    /// Capture of a single element
    Element { selector: String },
}

/// One concrete, executable visual comparison.
///
/// Created at generation time, executed exactly once, discarded after
/// reporting. The artifact name is unique within a run by construction
/// (name + viewport concatenation) and doubles as the baseline filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInstance {
    pub artifact_name: String,
    pub description: String,
    pub path: String,
    #[serde(flatten)]
    pub kind: CheckKind,
    pub tolerance: TolerancePolicy,
}

impl CheckInstance {
    /// Whether this is an element-level check (the only kind that can be
    /// skipped)
    pub fn is_element(&self) -> bool {
        matches!(self.kind, CheckKind::Element { .. })
    }
}

/// Expand the registry into the full ordered set of check instances.
///
/// Deterministic, no I/O: registry order first, viewport-declaration order
/// within a page, elements after pages. Assumes the registry has already
/// passed validation.
pub fn expand(registry: &Registry) -> Vec<CheckInstance> {
    let mut checks = Vec::new();

    for page in &registry.pages {
        for viewport in &page.viewport {
            checks.push(CheckInstance {
                artifact_name: format!("{}-{}", page.name, viewport.as_str()),
                description: page.description.clone(),
                path: page.path.clone(),
                kind: CheckKind::Page {
                    viewport: *viewport,
                    masks: page.mask.clone(),
                },
                tolerance: TolerancePolicy::page(),
            });
        }
    }

    for element in &registry.elements {
        checks.push(CheckInstance {
            artifact_name: element.name.clone(),
            description: element.description.clone(),
            path: element.path.clone(),
            kind: CheckKind::Element {
                selector: element.selector.clone(),
            },
            tolerance: TolerancePolicy::element(),
        });
    }

    checks
}
