//! Declarative page/element registry
//!
//! The registry is a single JSON document with two ordered lists: pages to
//! screenshot at one or more viewports, and individual elements to
//! screenshot on their own. It is loaded once at startup; schema violations
//! are configuration errors reported before any check executes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{Error, Result};

/// Closed enumeration of supported viewports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Viewport {
    Desktop,
    Tablet,
    Mobile,
}

impl Viewport {
    /// Pixel dimensions (width, height) of this viewport
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Viewport::Desktop => (1920, 1080),
            Viewport::Tablet => (768, 1024),
            Viewport::Mobile => (375, 667),
        }
    }

    /// Name used in artifact file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Viewport::Desktop => "desktop",
            Viewport::Tablet => "tablet",
            Viewport::Mobile => "mobile",
        }
    }
}

/// A page to capture at one or more viewports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSpec {
    /// Unique name; becomes the artifact name prefix
    pub name: String,

    /// Human-readable description for reports
    #[serde(default)]
    pub description: String,

    /// Path relative to the base URL
    pub path: String,

    /// Viewports to capture at; defaults to desktop only
    #[serde(default = "default_viewports")]
    pub viewport: Vec<Viewport>,

    /// Selectors for regions excluded from comparison (timestamps, ads, ...)
    #[serde(default)]
    pub mask: Vec<String>,
}

fn default_viewports() -> Vec<Viewport> {
    vec![Viewport::Desktop]
}

/// A single element to capture on its own
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSpec {
    /// Unique name; becomes the artifact name
    pub name: String,

    /// Human-readable description for reports
    #[serde(default)]
    pub description: String,

    /// Path relative to the base URL
    pub path: String,

    /// Locator for the element to capture
    pub selector: String,
}

/// The complete declarative registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub pages: Vec<PageSpec>,

    #[serde(default)]
    pub elements: Vec<ElementSpec>,
}

impl Registry {
    /// Parse a registry from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let registry: Registry = serde_json::from_str(json)
            .map_err(|e| Error::InvalidRegistry(e.to_string()))?;
        registry.validate()?;
        Ok(registry)
    }

    /// Parse a registry from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Reject registries that would produce ambiguous or unusable checks.
    ///
    /// Artifact names double as baseline filenames, so a collision would
    /// silently overwrite a comparison target.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<String> = HashSet::new();

        for page in &self.pages {
            require(&page.name, &format!("page '{}'", page.path), "name")?;
            require(&page.path, &format!("page '{}'", page.name), "path")?;

            if page.viewport.is_empty() {
                return Err(Error::InvalidRegistry(format!(
                    "page '{}' declares an empty viewport list",
                    page.name
                )));
            }

            let mut declared: HashSet<Viewport> = HashSet::new();
            for viewport in &page.viewport {
                if !declared.insert(*viewport) {
                    return Err(Error::InvalidRegistry(format!(
                        "page '{}' declares viewport '{}' twice",
                        page.name,
                        viewport.as_str()
                    )));
                }
                let artifact = format!("{}-{}", page.name, viewport.as_str());
                if !seen.insert(artifact.clone()) {
                    return Err(Error::DuplicateArtifact(artifact));
                }
            }
        }

        for element in &self.elements {
            require(&element.name, &format!("element '{}'", element.path), "name")?;
            require(&element.path, &format!("element '{}'", element.name), "path")?;
            require(&element.selector, &format!("element '{}'", element.name), "selector")?;

            if !seen.insert(element.name.clone()) {
                return Err(Error::DuplicateArtifact(element.name.clone()));
            }
        }

        Ok(())
    }
}

fn require(value: &str, entry: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::MissingField {
            entry: entry.to_string(),
            field: field.to_string(),
        });
    }
    Ok(())
}
