//! Mailproof
//!
//! Quality checks for HTML email templates: structure sanity, image alt
//! coverage, inline styles and media queries, optionally paired with
//! screenshots of the template rendered at a fixed set of viewport sizes.
//!
//! # Features
//!
//! - **CDP Backend** (default): renders through headless Chrome via the
//!   Chrome DevTools Protocol
//! - **Swappable sessions**: the capture pipeline only talks to the
//!   [`BrowserSession`] trait, so any engine with navigate/resize/screenshot
//!   primitives can drive it
//! - **Graceful degradation**: a missing browser yields a report with zero
//!   screenshots, never a failed report
//!
//! # Example
//!
//! ```no_run
//! use mailproof::{validation, CaptureConfig, ViewportSet};
//! use mailproof::artifacts::ArtifactStore;
//! use mailproof::document::DocumentLoader;
//! use mailproof::orchestrator::CaptureOrchestrator;
//!
//! let html = "<html><body><img src=\"logo.png\" alt=\"Logo\"></body></html>";
//! let report = validation::validate(html);
//! assert!(report.alt_tags_present);
//!
//! let config = CaptureConfig::default();
//! let orchestrator = CaptureOrchestrator::new(
//!     mailproof::default_launcher(config.clone()),
//!     DocumentLoader::new(config.temp_dir.clone()),
//!     ArtifactStore::new("static/screenshots", "/static/screenshots"),
//! );
//! let results = orchestrator.run(html, &ViewportSet::default(), "20240101_120000_000000");
//! for result in &results {
//!     println!("{}: success={}", result.viewport_key(), result.is_success());
//! }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

// Chrome DevTools backend for browser sessions
#[cfg(feature = "cdp")]
pub mod cdp;

pub mod artifacts;
pub mod async_api;
pub mod config;
pub mod document;
pub mod normalize;
pub mod orchestrator;
pub mod report;
pub mod server;
pub mod upload;
pub mod validation;

pub use async_api::Checker;
pub use config::AppConfig;
pub use report::PersistedReport;
pub use validation::ValidationReport;

/// One rendering configuration a template is captured at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportSpec {
    /// Short identifier, also used in artifact file names
    pub key: String,
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
    /// Human readable label shown in reports
    pub display_name: String,
}

impl ViewportSpec {
    pub fn new(key: impl Into<String>, width: u32, height: u32, display_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            width,
            height,
            display_name: display_name.into(),
        }
    }

    fn default_display_name(key: &str, width: u32, height: u32) -> String {
        let mut chars = key.chars();
        let title = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        format!("{} ({}x{})", title, width, height)
    }
}

/// Parses `key:WIDTHxHEIGHT` or `key:WIDTHxHEIGHT:Display name`.
///
/// ```
/// let spec: mailproof::ViewportSpec = "mobile:375x667".parse().unwrap();
/// assert_eq!(spec.width, 375);
/// assert_eq!(spec.display_name, "Mobile (375x667)");
/// ```
impl FromStr for ViewportSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().splitn(3, ':');
        let key = parts.next().unwrap_or("").trim();
        let dims = parts
            .next()
            .ok_or_else(|| Error::ConfigError(format!("viewport '{}' is missing its size", s)))?;
        let (w, h) = dims
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| Error::ConfigError(format!("viewport size '{}' must look like WIDTHxHEIGHT", dims)))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|e| Error::ConfigError(format!("bad viewport width '{}': {}", w, e)))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|e| Error::ConfigError(format!("bad viewport height '{}': {}", h, e)))?;
        let display_name = match parts.next().map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => Self::default_display_name(key, width, height),
        };
        Ok(Self::new(key, width, height, display_name))
    }
}

/// A validated, ordered, non-empty set of viewports with unique keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewportSet(Vec<ViewportSpec>);

impl ViewportSet {
    pub fn new(specs: Vec<ViewportSpec>) -> Result<Self> {
        if specs.is_empty() {
            return Err(Error::ConfigError("at least one viewport is required".into()));
        }
        let mut seen = HashSet::new();
        for spec in &specs {
            if spec.key.is_empty()
                || !spec
                    .key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(Error::ConfigError(format!(
                    "viewport key '{}' must be non-empty and use only [A-Za-z0-9_-]",
                    spec.key
                )));
            }
            if spec.width == 0 || spec.height == 0 {
                return Err(Error::ConfigError(format!(
                    "viewport '{}' must have positive dimensions",
                    spec.key
                )));
            }
            if !seen.insert(spec.key.as_str()) {
                return Err(Error::ConfigError(format!("duplicate viewport key '{}'", spec.key)));
            }
        }
        Ok(Self(specs))
    }

    /// Parses a comma separated list of viewport specs.
    pub fn parse_list(s: &str) -> Result<Self> {
        let specs = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<ViewportSpec>>>()?;
        Self::new(specs)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ViewportSpec> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a constructed set; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ViewportSpec> {
        self.0.iter().find(|spec| spec.key == key)
    }
}

/// Desktop, tablet and mobile, in that order.
impl Default for ViewportSet {
    fn default() -> Self {
        Self(vec![
            ViewportSpec::new("desktop", 1200, 800, "Desktop (1200x800)"),
            ViewportSpec::new("tablet", 768, 1024, "Tablet (768x1024)"),
            ViewportSpec::new("mobile", 375, 667, "Mobile (375x667)"),
        ])
    }
}

impl<'a> IntoIterator for &'a ViewportSet {
    type Item = &'a ViewportSpec;
    type IntoIter = std::slice::Iter<'a, ViewportSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Configuration for browser sessions and capture runs
///
/// All timeouts are in milliseconds. Every blocking browser operation is
/// bounded by one of them so a hung engine cannot hang a run.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Upper bound for launching the browser process
    pub startup_timeout_ms: u64,
    /// Upper bound for loading the document
    pub navigation_timeout_ms: u64,
    /// Upper bound for waiting on `document.readyState`
    pub settle_timeout_ms: u64,
    /// Fixed pause after the document reports ready
    pub settle_grace_ms: u64,
    /// Upper bound for resizing and rasterizing one viewport
    pub capture_timeout_ms: u64,
    /// Upper bound for shutting the browser down
    pub close_timeout_ms: u64,
    /// Explicit Chrome/Chromium binary; auto-detected when unset
    pub chrome_path: Option<PathBuf>,
    /// Whether Chrome runs with its own sandbox
    pub sandbox: bool,
    /// Where scratch documents are written; the system temp dir when unset
    pub temp_dir: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            startup_timeout_ms: 15000,
            navigation_timeout_ms: 10000,
            settle_timeout_ms: 3000,
            settle_grace_ms: 500,
            capture_timeout_ms: 5000,
            close_timeout_ms: 3000,
            chrome_path: None,
            sandbox: false,
            temp_dir: None,
        }
    }
}

/// A reference to a loaded document that a browser can navigate to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator(url::Url);

impl Locator {
    pub fn from_path(path: &Path) -> Result<Self> {
        url::Url::from_file_path(path)
            .map(Locator)
            .map_err(|_| Error::NavigationError(format!("not an absolute path: {}", path.display())))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn url(&self) -> &url::Url {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Outcome of capturing a single viewport.
///
/// A run yields exactly one entry per configured viewport, in configuration
/// order; failures are reported explicitly rather than omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaptureResult {
    Success {
        viewport_key: String,
        display_name: String,
        /// Location of the persisted artifact on disk
        artifact_path: PathBuf,
        /// Publicly addressable path of the artifact
        public_path: String,
    },
    Failure {
        viewport_key: String,
        error_message: String,
    },
}

impl CaptureResult {
    pub fn viewport_key(&self) -> &str {
        match self {
            CaptureResult::Success { viewport_key, .. } | CaptureResult::Failure { viewport_key, .. } => {
                viewport_key
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CaptureResult::Success { .. })
    }
}

/// One live browser instance driving a single document.
///
/// Failures of `navigate`, `resize`, `await_stable_render` and `capture`
/// leave the session usable for the next viewport. `close` must be
/// idempotent and safe to call on a session in a failed state.
pub trait BrowserSession {
    /// Load the document behind `locator`
    fn navigate(&mut self, locator: &Locator) -> Result<()>;

    /// Set the rendering viewport
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    /// Block (bounded) until the page is safe to rasterize
    fn await_stable_render(&mut self) -> Result<()>;

    /// Rasterize the current viewport, returning encoded image bytes
    fn capture(&mut self) -> Result<Vec<u8>>;

    /// Terminate the browser
    fn close(&mut self) -> Result<()>;
}

/// Starts browser sessions. One launcher may serve many concurrent runs,
/// each with its own session.
pub trait SessionLauncher {
    type Session: BrowserSession;

    /// Start a browser; fails with [`Error::EngineUnavailable`] when no
    /// browser can be started within the startup timeout.
    fn open(&self) -> Result<Self::Session>;
}

/// Launcher used when the crate is built without a browser backend.
#[derive(Debug, Clone, Default)]
pub struct UnavailableLauncher;

/// A session that can never exist.
#[derive(Debug)]
pub enum NoSession {}

impl BrowserSession for NoSession {
    fn navigate(&mut self, _locator: &Locator) -> Result<()> {
        match *self {}
    }

    fn resize(&mut self, _width: u32, _height: u32) -> Result<()> {
        match *self {}
    }

    fn await_stable_render(&mut self) -> Result<()> {
        match *self {}
    }

    fn capture(&mut self) -> Result<Vec<u8>> {
        match *self {}
    }

    fn close(&mut self) -> Result<()> {
        match *self {}
    }
}

impl SessionLauncher for UnavailableLauncher {
    type Session = NoSession;

    fn open(&self) -> Result<NoSession> {
        Err(Error::EngineUnavailable(
            "built without a browser backend (enable the `cdp` feature)".into(),
        ))
    }
}

/// Create the default session launcher
///
/// This is the CDP launcher when the `cdp` feature is enabled (default);
/// otherwise every run degrades to zero screenshots.
#[cfg(feature = "cdp")]
pub fn default_launcher(config: CaptureConfig) -> cdp::CdpLauncher {
    cdp::CdpLauncher::new(config)
}

#[cfg(not(feature = "cdp"))]
pub fn default_launcher(_config: CaptureConfig) -> UnavailableLauncher {
    UnavailableLauncher
}
