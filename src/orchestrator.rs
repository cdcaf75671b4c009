//! Viewport capture orchestration
//!
//! A run loads the document once, opens one browser session and walks the
//! configured viewports strictly in order: resize, wait for a stable render,
//! capture, normalize, persist. A failing viewport becomes a
//! [`CaptureResult::Failure`] and the walk continues. Infrastructure failures
//! (no scratch document, no browser) degrade to an empty result.
//!
//! The session is closed and the document released on every exit path,
//! in that order, including unwinding.

use log::{debug, info, warn};

use crate::artifacts::{ArtifactStore, StoredArtifact};
use crate::document::{DocumentLoader, LoadedDocument};
use crate::normalize::normalize;
use crate::{BrowserSession, CaptureResult, Result, SessionLauncher, ViewportSet, ViewportSpec};

/// Closes the wrapped session exactly once, on `finish` or on drop.
struct SessionGuard<S: BrowserSession> {
    session: S,
    closed: bool,
}

impl<S: BrowserSession> SessionGuard<S> {
    fn new(session: S) -> Self {
        Self { session, closed: false }
    }

    fn finish(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.session.close() {
            warn!("Failed to close browser session: {}", e);
        }
    }
}

impl<S: BrowserSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Drives capture runs. Holds no per-run state, so one orchestrator can serve
/// many concurrent runs; each run opens its own session.
pub struct CaptureOrchestrator<L: SessionLauncher> {
    launcher: L,
    loader: DocumentLoader,
    artifacts: ArtifactStore,
}

impl<L: SessionLauncher> CaptureOrchestrator<L> {
    pub fn new(launcher: L, loader: DocumentLoader, artifacts: ArtifactStore) -> Self {
        Self {
            launcher,
            loader,
            artifacts,
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Capture `html` at every viewport in `viewports`.
    ///
    /// Returns one entry per viewport in configuration order, or an empty
    /// sequence when the document could not be materialized or no browser
    /// could be started.
    pub fn run(&self, html: &str, viewports: &ViewportSet, run_id: &str) -> Vec<CaptureResult> {
        let mut document = match self.loader.load(html) {
            Ok(document) => document,
            Err(e) => {
                warn!("Run {}: screenshots unavailable, cannot load document: {}", run_id, e);
                return Vec::new();
            }
        };

        let mut session = match self.launcher.open() {
            Ok(session) => SessionGuard::new(session),
            Err(e) => {
                warn!("Run {}: screenshots unavailable: {}", run_id, e);
                document.release();
                return Vec::new();
            }
        };

        let results = self.capture_all(&mut session.session, &document, viewports, run_id);

        session.finish();
        document.release();

        let captured = results.iter().filter(|r| r.is_success()).count();
        info!("Run {}: captured {}/{} viewports", run_id, captured, viewports.len());
        results
    }

    fn capture_all(
        &self,
        session: &mut L::Session,
        document: &LoadedDocument,
        viewports: &ViewportSet,
        run_id: &str,
    ) -> Vec<CaptureResult> {
        if let Err(e) = session.navigate(document.locator()) {
            warn!("Run {}: navigation failed, no viewport can be captured: {}", run_id, e);
            let message = e.to_string();
            return viewports
                .iter()
                .map(|spec| CaptureResult::Failure {
                    viewport_key: spec.key.clone(),
                    error_message: message.clone(),
                })
                .collect();
        }

        viewports
            .iter()
            .map(|spec| match self.capture_viewport(session, spec, run_id) {
                Ok(stored) => {
                    debug!("Run {}: {} -> {}", run_id, spec.key, stored.path.display());
                    CaptureResult::Success {
                        viewport_key: spec.key.clone(),
                        display_name: spec.display_name.clone(),
                        artifact_path: stored.path,
                        public_path: stored.public_path,
                    }
                }
                Err(e) => {
                    warn!("Run {}: error capturing {} screenshot: {}", run_id, spec.key, e);
                    CaptureResult::Failure {
                        viewport_key: spec.key.clone(),
                        error_message: e.to_string(),
                    }
                }
            })
            .collect()
    }

    fn capture_viewport(&self, session: &mut L::Session, spec: &ViewportSpec, run_id: &str) -> Result<StoredArtifact> {
        session.resize(spec.width, spec.height)?;
        session.await_stable_render()?;
        let raw = session.capture()?;
        let png = normalize(&raw)?;
        self.artifacts.persist(run_id, &spec.key, &png)
    }
}
