//! Error types for the capture harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Navigation failed for '{path}': {reason}")]
    Navigation { path: String, reason: String },

    #[error("Capture for '{artifact}' exceeded its {budget_ms} ms budget")]
    CaptureTimeout { artifact: String, budget_ms: u64 },

    #[error("Baseline not found: {0}")]
    BaselineNotFound(String),

    #[error("Visual comparison: {0}")]
    Comparison(String),

    #[error("Registry error: {0}")]
    Registry(#[from] stillframe_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
