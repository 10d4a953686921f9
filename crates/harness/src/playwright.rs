//! Playwright browser automation
//!
//! Each capture plan is compiled into a single Playwright script and run
//! in its own `node` process: one browser context per check, so page
//! state survives across the stabilization sequence and concurrent
//! checks stay fully isolated from each other.

use serde::Deserialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use tokio::process::Command as TokioCommand;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};
use crate::stabilize::{CaptureDriver, CaptureOutcome, CapturePlan, NAV_ALLOWANCE_MS};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = HarnessError;

    fn from_str(s: &str) -> HarnessResult<Self> {
        match s {
            "chromium" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" => Ok(Browser::Webkit),
            other => Err(HarnessError::Playwright(format!(
                "unknown browser '{other}' (expected chromium, firefox, or webkit)"
            ))),
        }
    }
}

/// Configuration for the Playwright driver
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    /// Base URL the registry paths are relative to
    pub base_url: String,

    /// Directory captures are written into
    pub actual_dir: PathBuf,

    pub browser: Browser,
    pub headless: bool,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            actual_dir: PathBuf::from("test-results/actual"),
            browser: Browser::Chromium,
            headless: true,
        }
    }
}

/// What the generated script prints as its last stdout line
#[derive(Debug, Deserialize)]
struct ScriptVerdict {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

/// Playwright-backed capture driver
pub struct PlaywrightDriver {
    config: PlaywrightConfig,
}

impl PlaywrightDriver {
    /// Create a driver, verifying Playwright is installed
    pub fn new(config: PlaywrightConfig) -> HarnessResult<Self> {
        Self::check_playwright_installed()?;
        std::fs::create_dir_all(&config.actual_dir)?;
        Ok(Self { config })
    }

    fn check_playwright_installed() -> HarnessResult<()> {
        let status = std::process::Command::new("npx")
            .args(["playwright", "--version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(HarnessError::PlaywrightNotFound),
        }
    }

    /// Where the capture for this plan lands
    fn screenshot_path(&self, plan: &CapturePlan) -> PathBuf {
        self.config.actual_dir.join(format!("{}.png", plan.artifact_name()))
    }

    /// Compile a capture plan into a self-contained Playwright script
    pub fn build_script(&self, plan: &CapturePlan) -> String {
        let mut script = String::new();
        let url = format!("{}{}", self.config.base_url, plan.path());
        let out = self.screenshot_path(plan);

        let _ = write!(
            script,
            r#"const {{ chromium, firefox, webkit }} = require('playwright');

(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
"#,
            browser = self.config.browser.as_str(),
            headless = self.config.headless,
        );

        match plan {
            CapturePlan::Page {
                viewport: (width, height),
                masks,
                post_load_ms,
                post_override_ms,
                ..
            } => {
                let mask_locators: Vec<String> = masks
                    .iter()
                    .map(|selector| format!("page.locator({})", js_str(selector)))
                    .collect();
                let mask_option = if mask_locators.is_empty() {
                    String::new()
                } else {
                    format!(", mask: [{}]", mask_locators.join(", "))
                };

                // 'load', not 'networkidle': long-polling pages never go idle
                let _ = write!(
                    script,
                    r#"  const context = await browser.newContext({{ viewport: {{ width: {width}, height: {height} }} }});
  const page = await context.newPage();
  try {{
    await page.goto({url}, {{ waitUntil: 'load', timeout: {nav_timeout} }});
    await page.waitForTimeout({post_load_ms});
    await page.evaluate(() => {{
      window.scrollTo(0, 0);
      const style = document.createElement('style');
      style.textContent = '*, *::before, *::after {{ animation: none !important; transition: none !important; caret-color: transparent !important; }}';
      document.head.appendChild(style);
    }});
    await page.waitForTimeout({post_override_ms});
    await page.screenshot({{ path: {out}, fullPage: true, animations: 'disabled'{mask_option} }});
    console.log(JSON.stringify({{ status: 'captured' }}));
  }} catch (error) {{
    console.error(JSON.stringify({{ status: 'error', error: error.message }}));
    // exitCode, not exit(): the finally block must still close the browser
    process.exitCode = 1;
  }} finally {{
    await browser.close();
  }}
}})();
"#,
                    url = js_str(&url),
                    nav_timeout = NAV_ALLOWANCE_MS,
                    out = js_str(&out.to_string_lossy()),
                );
            }
            CapturePlan::Element {
                selector,
                nav_settle_ms,
                visible_timeout_ms,
                pre_capture_ms,
                ..
            } => {
                let _ = write!(
                    script,
                    r#"  const context = await browser.newContext();
  const page = await context.newPage();
  try {{
    await page.goto({url}, {{ waitUntil: 'load', timeout: {nav_timeout} }});
    await page.waitForTimeout({nav_settle_ms});
    const target = page.locator({selector});
    if (await target.count() === 0) {{
      console.log(JSON.stringify({{ status: 'absent' }}));
      return;
    }}
    try {{
      await target.first().waitFor({{ state: 'visible', timeout: {visible_timeout_ms} }});
    }} catch (waitError) {{
      console.log(JSON.stringify({{ status: 'not_visible' }}));
      return;
    }}
    await page.waitForTimeout({pre_capture_ms});
    await target.first().screenshot({{ path: {out}, animations: 'disabled' }});
    console.log(JSON.stringify({{ status: 'captured' }}));
  }} catch (error) {{
    console.error(JSON.stringify({{ status: 'error', error: error.message }}));
    // exitCode, not exit(): the finally block must still close the browser
    process.exitCode = 1;
  }} finally {{
    await browser.close();
  }}
}})();
"#,
                    url = js_str(&url),
                    nav_timeout = NAV_ALLOWANCE_MS,
                    selector = js_str(selector),
                    out = js_str(&out.to_string_lossy()),
                );
            }
        }

        script
    }

    /// Run the script with node and interpret its verdict
    async fn run_script(&self, plan: &CapturePlan, script: &str) -> HarnessResult<CaptureOutcome> {
        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("capture.js");
        std::fs::write(&script_path, script)?;

        debug!(
            artifact = plan.artifact_name(),
            "running Playwright script: {}",
            script_path.display()
        );

        let output = TokioCommand::new("node")
            .arg(&script_path)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            if let Some(verdict) = last_verdict(&stderr) {
                return Err(HarnessError::Navigation {
                    path: plan.path().to_string(),
                    reason: verdict.error.unwrap_or_else(|| "script failed".to_string()),
                });
            }
            return Err(HarnessError::Playwright(format!(
                "script failed:\nstdout: {stdout}\nstderr: {stderr}"
            )));
        }

        match last_verdict(&stdout) {
            Some(verdict) => match verdict.status.as_str() {
                "captured" => Ok(CaptureOutcome::Captured {
                    screenshot: self.screenshot_path(plan),
                }),
                "absent" => Ok(CaptureOutcome::ElementAbsent),
                "not_visible" => Ok(CaptureOutcome::ElementNotVisible),
                other => Err(HarnessError::Playwright(format!(
                    "unexpected script status '{other}'"
                ))),
            },
            None => Err(HarnessError::Playwright(format!(
                "script produced no verdict:\nstdout: {stdout}"
            ))),
        }
    }
}

#[async_trait::async_trait]
impl CaptureDriver for PlaywrightDriver {
    async fn run(&self, plan: &CapturePlan) -> HarnessResult<CaptureOutcome> {
        let script = self.build_script(plan);
        self.run_script(plan, &script).await
    }
}

/// Last parseable verdict line in a stream
fn last_verdict(stream: &str) -> Option<ScriptVerdict> {
    stream
        .lines()
        .rev()
        .find_map(|line| serde_json::from_str::<ScriptVerdict>(line.trim()).ok())
}

/// Quote a string as a JavaScript string literal
fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
