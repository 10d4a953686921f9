//! Screenshot comparison against stored baselines
//!
//! The tolerance model is a pixel count, not a percentage: a check fails
//! once more than `max_diff_pixels` pixels differ. A small per-channel
//! tolerance absorbs anti-aliasing and compression noise.

use image::{GenericImageView, Pixel, RgbaImage};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use stillframe_common::TolerancePolicy;

use crate::error::{HarnessError, HarnessResult};

/// Result of comparing one capture against its baseline
#[derive(Debug, Clone)]
pub struct ComparisonReport {
    /// Whether the images match within the tolerance
    pub matches: bool,

    /// Number of differing pixels
    pub diff_pixels: u64,

    /// Total pixels compared
    pub total_pixels: u64,

    /// Path to the diff image, when one was written
    pub diff_image_path: Option<PathBuf>,

    /// SHA-256 of the actual capture
    pub actual_hash: String,

    /// SHA-256 of the baseline
    pub baseline_hash: String,
}

/// Configuration for baseline comparison
#[derive(Debug, Clone)]
pub struct VisualConfig {
    pub baseline_dir: PathBuf,
    pub actual_dir: PathBuf,
    pub diff_dir: PathBuf,

    /// Adopt the actual capture as the baseline when none exists
    pub auto_update: bool,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            baseline_dir: PathBuf::from("test-results/baselines"),
            actual_dir: PathBuf::from("test-results/actual"),
            diff_dir: PathBuf::from("test-results/diffs"),
            auto_update: false,
        }
    }
}

/// Compares captures against stored baselines and manages the baseline set
pub struct VisualTester {
    baseline_dir: PathBuf,
    actual_dir: PathBuf,
    diff_dir: PathBuf,
    auto_update: bool,
}

impl VisualTester {
    pub fn new(config: VisualConfig) -> HarnessResult<Self> {
        std::fs::create_dir_all(&config.baseline_dir)?;
        std::fs::create_dir_all(&config.actual_dir)?;
        std::fs::create_dir_all(&config.diff_dir)?;

        Ok(Self {
            baseline_dir: config.baseline_dir,
            actual_dir: config.actual_dir,
            diff_dir: config.diff_dir,
            auto_update: config.auto_update,
        })
    }

    /// Compare the capture named `name` against its stored baseline
    pub fn compare(
        &self,
        name: &str,
        tolerance: &TolerancePolicy,
    ) -> HarnessResult<ComparisonReport> {
        let actual_path = self.actual_dir.join(format!("{name}.png"));
        let baseline_path = self.baseline_dir.join(format!("{name}.png"));

        if !actual_path.exists() {
            return Err(HarnessError::Comparison(format!(
                "actual capture not found: {}",
                actual_path.display()
            )));
        }

        if !baseline_path.exists() {
            if self.auto_update {
                info!("adopting baseline for '{name}'");
                std::fs::copy(&actual_path, &baseline_path)?;

                let actual_hash = hash_file(&actual_path)?;
                return Ok(ComparisonReport {
                    matches: true,
                    diff_pixels: 0,
                    total_pixels: 0,
                    diff_image_path: None,
                    actual_hash: actual_hash.clone(),
                    baseline_hash: actual_hash,
                });
            }
            return Err(HarnessError::BaselineNotFound(
                baseline_path.to_string_lossy().to_string(),
            ));
        }

        let actual_hash = hash_file(&actual_path)?;
        let baseline_hash = hash_file(&baseline_path)?;

        let actual_img = image::open(&actual_path)?;
        let total_pixels = (actual_img.width() as u64) * (actual_img.height() as u64);

        // Identical files need no pixel walk
        if actual_hash == baseline_hash {
            debug!("capture '{name}' matches baseline exactly");
            return Ok(ComparisonReport {
                matches: true,
                diff_pixels: 0,
                total_pixels,
                diff_image_path: None,
                actual_hash,
                baseline_hash,
            });
        }

        let baseline_img = image::open(&baseline_path)?;

        if actual_img.dimensions() != baseline_img.dimensions() {
            warn!(
                "capture '{name}' dimensions differ: actual {:?} vs baseline {:?}",
                actual_img.dimensions(),
                baseline_img.dimensions()
            );
        }

        let (actual_w, actual_h) = actual_img.dimensions();
        let (baseline_w, baseline_h) = baseline_img.dimensions();
        let actual_rgba = actual_img.to_rgba8();
        let baseline_rgba = baseline_img.to_rgba8();

        // Walk the union of both images: a pixel present in only one of
        // them is a difference, whether the capture grew or shrank
        let union_w = actual_w.max(baseline_w);
        let union_h = actual_h.max(baseline_h);
        let total_pixels = (union_w as u64) * (union_h as u64);

        let mut diff_img = RgbaImage::new(union_w, union_h);
        let mut diff_pixels = 0u64;

        for y in 0..union_h {
            for x in 0..union_w {
                let in_actual = x < actual_w && y < actual_h;
                let in_baseline = x < baseline_w && y < baseline_h;
                let differs = !(in_actual && in_baseline)
                    || pixels_differ(actual_rgba.get_pixel(x, y), baseline_rgba.get_pixel(x, y));

                if differs {
                    diff_pixels += 1;
                    diff_img.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
                } else {
                    // Keep the original but dim it so diffs stand out
                    let channels = actual_rgba.get_pixel(x, y).channels();
                    diff_img.put_pixel(
                        x,
                        y,
                        image::Rgba([channels[0] / 2, channels[1] / 2, channels[2] / 2, 128]),
                    );
                }
            }
        }

        let matches = diff_pixels <= tolerance.max_diff_pixels;

        let diff_image_path = if diff_pixels > 0 {
            let path = self.diff_dir.join(format!("{name}-diff.png"));
            diff_img.save(&path)?;
            Some(path)
        } else {
            None
        };

        if !matches {
            warn!(
                "visual regression in '{name}': {diff_pixels} pixels differ (allowed {})",
                tolerance.max_diff_pixels
            );
        }

        Ok(ComparisonReport {
            matches,
            diff_pixels,
            total_pixels,
            diff_image_path,
            actual_hash,
            baseline_hash,
        })
    }

    /// Adopt the actual capture as the new baseline
    pub fn update_baseline(&self, name: &str) -> HarnessResult<()> {
        let actual_path = self.actual_dir.join(format!("{name}.png"));
        let baseline_path = self.baseline_dir.join(format!("{name}.png"));

        if !actual_path.exists() {
            return Err(HarnessError::Comparison(format!(
                "cannot update baseline: actual capture not found: {}",
                actual_path.display()
            )));
        }

        std::fs::copy(&actual_path, &baseline_path)?;
        info!("updated baseline for '{name}'");

        Ok(())
    }

    /// Adopt every capture in the actual directory as a baseline
    pub fn update_all_baselines(&self) -> HarnessResult<usize> {
        let mut updated = 0;
        for name in png_stems(&self.actual_dir)? {
            self.update_baseline(&name)?;
            updated += 1;
        }
        Ok(updated)
    }

    /// Names of all stored baselines
    pub fn list_baselines(&self) -> HarnessResult<Vec<String>> {
        png_stems(&self.baseline_dir)
    }

    /// Remove diff images from previous runs
    pub fn clean_diffs(&self) -> HarnessResult<()> {
        for entry in std::fs::read_dir(&self.diff_dir)? {
            let entry = entry?;
            std::fs::remove_file(entry.path())?;
        }
        Ok(())
    }
}

/// Whether two pixels differ beyond the per-channel tolerance that
/// absorbs anti-aliasing and compression noise
fn pixels_differ(a: &image::Rgba<u8>, b: &image::Rgba<u8>) -> bool {
    const CHANNEL_TOLERANCE: i32 = 5;

    let a_channels = a.channels();
    let b_channels = b.channels();

    for i in 0..4 {
        let diff = (a_channels[i] as i32 - b_channels[i] as i32).abs();
        if diff > CHANNEL_TOLERANCE {
            return true;
        }
    }

    false
}

fn hash_file(path: &Path) -> HarnessResult<String> {
    let data = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn png_stems(dir: &Path) -> HarnessResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().map(|e| e == "png").unwrap_or(false) {
            if let Some(name) = path.file_stem() {
                names.push(name.to_string_lossy().to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
