//! Application configuration with environment variable support.
//!
//! Defaults can be overridden with environment variables; CLI flags in turn
//! override the environment.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `MAILPROOF_UPLOAD_DIR` | Where accepted uploads are kept | `uploads` |
//! | `MAILPROOF_REPORT_DIR` | Where JSON reports are written | `reports` |
//! | `MAILPROOF_SCREENSHOT_DIR` | Where screenshots are written | `static/screenshots` |
//! | `MAILPROOF_PUBLIC_PREFIX` | URL prefix screenshots are served under | `/static/screenshots` |
//! | `MAILPROOF_MAX_UPLOAD_BYTES` | Upload size limit | `16777216` |
//! | `MAILPROOF_RETENTION_DAYS` | Age after which screenshots are swept | `7` |
//! | `MAILPROOF_BIND` | HTTP listen address | `127.0.0.1:5000` |
//! | `MAILPROOF_VIEWPORTS` | `key:WxH[:Name],...` | desktop, tablet, mobile |
//! | `MAILPROOF_CHROME_PATH` | Chrome/Chromium binary | auto-detected |
//! | `MAILPROOF_CAPTURE_TIMEOUT_MS` | Per-viewport capture bound | `5000` |
//! | `MAILPROOF_STARTUP_TIMEOUT_MS` | Browser startup bound | `15000` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{CaptureConfig, Error, Result, ViewportSet};

/// Default upload directory
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Default report directory
pub const DEFAULT_REPORT_DIR: &str = "reports";

/// Default screenshot directory
pub const DEFAULT_SCREENSHOT_DIR: &str = "static/screenshots";

/// Default public prefix for screenshots
pub const DEFAULT_PUBLIC_PREFIX: &str = "/static/screenshots";

/// Default upload size limit (16 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Default screenshot retention (days)
pub const DEFAULT_RETENTION_DAYS: u64 = 7;

/// Default HTTP listen address
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

pub const ENV_UPLOAD_DIR: &str = "MAILPROOF_UPLOAD_DIR";
pub const ENV_REPORT_DIR: &str = "MAILPROOF_REPORT_DIR";
pub const ENV_SCREENSHOT_DIR: &str = "MAILPROOF_SCREENSHOT_DIR";
pub const ENV_PUBLIC_PREFIX: &str = "MAILPROOF_PUBLIC_PREFIX";
pub const ENV_MAX_UPLOAD_BYTES: &str = "MAILPROOF_MAX_UPLOAD_BYTES";
pub const ENV_RETENTION_DAYS: &str = "MAILPROOF_RETENTION_DAYS";
pub const ENV_BIND: &str = "MAILPROOF_BIND";
pub const ENV_VIEWPORTS: &str = "MAILPROOF_VIEWPORTS";
pub const ENV_CHROME_PATH: &str = "MAILPROOF_CHROME_PATH";
pub const ENV_CAPTURE_TIMEOUT_MS: &str = "MAILPROOF_CAPTURE_TIMEOUT_MS";
pub const ENV_STARTUP_TIMEOUT_MS: &str = "MAILPROOF_STARTUP_TIMEOUT_MS";

/// Everything the binary needs to run checks and serve reports.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub upload_dir: PathBuf,
    pub report_dir: PathBuf,
    pub screenshot_dir: PathBuf,
    pub public_prefix: String,
    pub max_upload_bytes: usize,
    pub retention_days: u64,
    pub bind: String,
    pub viewports: ViewportSet,
    pub capture: CaptureConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            report_dir: PathBuf::from(DEFAULT_REPORT_DIR),
            screenshot_dir: PathBuf::from(DEFAULT_SCREENSHOT_DIR),
            public_prefix: DEFAULT_PUBLIC_PREFIX.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            retention_days: DEFAULT_RETENTION_DAYS,
            bind: DEFAULT_BIND.to_string(),
            viewports: ViewportSet::default(),
            capture: CaptureConfig::default(),
        }
    }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| Error::ConfigError(format!("{}={}: {}", name, raw, e)))
}

impl AppConfig {
    /// Defaults overlaid with `MAILPROOF_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup(ENV_UPLOAD_DIR) {
            config.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_REPORT_DIR) {
            config.report_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_SCREENSHOT_DIR) {
            config.screenshot_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_PUBLIC_PREFIX) {
            config.public_prefix = v;
        }
        if let Some(v) = lookup(ENV_MAX_UPLOAD_BYTES) {
            config.max_upload_bytes = parse_var(ENV_MAX_UPLOAD_BYTES, &v)?;
        }
        if let Some(v) = lookup(ENV_RETENTION_DAYS) {
            config.retention_days = parse_var(ENV_RETENTION_DAYS, &v)?;
        }
        if let Some(v) = lookup(ENV_BIND) {
            config.bind = v;
        }
        if let Some(v) = lookup(ENV_VIEWPORTS) {
            config.viewports = ViewportSet::parse_list(&v)?;
        }
        if let Some(v) = lookup(ENV_CHROME_PATH) {
            config.capture.chrome_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup(ENV_CAPTURE_TIMEOUT_MS) {
            config.capture.capture_timeout_ms = parse_var(ENV_CAPTURE_TIMEOUT_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_STARTUP_TIMEOUT_MS) {
            config.capture.startup_timeout_ms = parse_var(ENV_STARTUP_TIMEOUT_MS, &v)?;
        }

        Ok(config)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 86_400)
    }
}
