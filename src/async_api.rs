//! Async-friendly checking pipeline.
//!
//! [`Checker::check`] runs validation and (optionally) the capture run on
//! tokio's blocking pool at the same time, merges both into a
//! [`PersistedReport`] and writes it. Capture problems never fail a check:
//! the report then simply lists fewer screenshots.
//!
//! Dropping the future returned by `check` does not interrupt a capture run
//! that has already started; the blocking task finishes on its own and its
//! scoped guards still close the browser and remove the scratch document.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use log::{info, warn};

use crate::artifacts::{ArtifactStore, SweepSummary};
use crate::config::AppConfig;
use crate::document::DocumentLoader;
use crate::orchestrator::CaptureOrchestrator;
use crate::report::{PersistedReport, ReportStore};
use crate::upload::Upload;
use crate::validation::validate_bytes;
use crate::{Error, Result, SessionLauncher};

/// New run id: local time with microseconds, sortable as text. Ids handed
/// out by one process are strictly increasing, so they never collide.
pub fn new_run_id() -> String {
    static LAST_MICROS: AtomicI64 = AtomicI64::new(0);

    let now = chrono::Local::now();
    let micros = now.timestamp_micros();
    let mut last = LAST_MICROS.load(Ordering::Relaxed);
    let next = loop {
        let next = micros.max(last + 1);
        match LAST_MICROS.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break next,
            Err(current) => last = current,
        }
    };
    let stamp = now + chrono::Duration::microseconds(next - micros);
    stamp.format("%Y%m%d_%H%M%S_%6f").to_string()
}

/// Runs checks for uploads and owns where their outputs go.
pub struct Checker<L: SessionLauncher> {
    config: AppConfig,
    orchestrator: Arc<CaptureOrchestrator<L>>,
    reports: ReportStore,
}

impl<L> Checker<L>
where
    L: SessionLauncher + Send + Sync + 'static,
{
    pub fn new(config: AppConfig, launcher: L) -> Self {
        let orchestrator = CaptureOrchestrator::new(
            launcher,
            DocumentLoader::new(config.capture.temp_dir.clone()),
            ArtifactStore::new(config.screenshot_dir.clone(), config.public_prefix.clone()),
        );
        Self {
            reports: ReportStore::new(config.report_dir.clone()),
            orchestrator: Arc::new(orchestrator),
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn reports(&self) -> &ReportStore {
        &self.reports
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        self.orchestrator.artifacts()
    }

    /// Validate an incoming file against this checker's upload limits.
    pub fn accept(&self, filename: &str, content: Vec<u8>, take_screenshots: bool) -> Result<Upload> {
        Upload::new(filename, content, take_screenshots, self.config.max_upload_bytes)
    }

    /// Check `upload` and persist the report.
    ///
    /// All file I/O (the kept upload copy, scratch documents, artifacts and
    /// the report itself) runs on the blocking pool.
    pub async fn check(&self, upload: Upload) -> Result<PersistedReport> {
        let run_id = new_run_id();
        let Upload {
            filename,
            content,
            take_screenshots,
        } = upload;
        let content = Arc::new(content);

        let kept = tokio::task::spawn_blocking({
            let upload_dir = self.config.upload_dir.clone();
            let run_id = run_id.clone();
            let filename = filename.clone();
            let content = Arc::clone(&content);
            move || keep_upload(&upload_dir, &run_id, &filename, &content)
        });

        let validation = tokio::task::spawn_blocking({
            let content = Arc::clone(&content);
            move || validate_bytes(&content)
        });

        let capture = take_screenshots.then(|| {
            let orchestrator = Arc::clone(&self.orchestrator);
            let viewports = self.config.viewports.clone();
            let content = Arc::clone(&content);
            let run_id = run_id.clone();
            tokio::task::spawn_blocking(move || {
                let html = String::from_utf8_lossy(&content);
                orchestrator.run(&html, &viewports, &run_id)
            })
        });

        if let Err(e) = kept.await {
            warn!("Run {}: upload copy task failed: {}", run_id, e);
        }

        let validation = validation
            .await
            .map_err(|e| Error::Other(format!("validation task failed: {}", e)))?;

        let captures = match capture {
            Some(task) => Some(task.await.unwrap_or_else(|e| {
                warn!("Run {}: capture task failed: {}", run_id, e);
                Vec::new()
            })),
            None => None,
        };

        let report = PersistedReport::assemble(run_id, filename, validation, captures);
        let reports = self.reports.clone();
        let report = tokio::task::spawn_blocking(move || reports.save(&report).map(|_| report))
            .await
            .map_err(|e| Error::Other(format!("report write task failed: {}", e)))??;

        info!(
            "Run {}: checked {} (html_valid={}, screenshots={})",
            report.run_id,
            report.original_filename,
            report.validation.html_valid,
            report.screenshots.as_ref().map_or(0, Vec::len)
        );
        Ok(report)
    }

    /// Remove screenshots older than the configured retention.
    pub fn sweep(&self) -> SweepSummary {
        self.artifacts().sweep(self.config.retention())
    }
}

/// Keep a copy of the upload as `{upload_dir}/{run_id}_{filename}`. Failure
/// is logged; the check itself does not depend on it.
fn keep_upload(upload_dir: &Path, run_id: &str, filename: &str, content: &[u8]) -> Option<PathBuf> {
    let path = upload_dir.join(format!("{}_{}", run_id, filename));
    let res = std::fs::create_dir_all(upload_dir).and_then(|_| std::fs::write(&path, content));
    match res {
        Ok(()) => Some(path),
        Err(e) => {
            warn!("Run {}: failed to keep upload at {}: {}", run_id, path.display(), e);
            None
        }
    }
}
