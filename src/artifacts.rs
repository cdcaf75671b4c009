//! Persisted screenshot artifacts and their retention.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::{info, warn};

use crate::{Error, Result};

/// A stored artifact and where the public can fetch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub path: PathBuf,
    pub public_path: String,
}

/// Counts from a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub removed: usize,
    pub failed: usize,
}

/// Directory of screenshot artifacts named `{run_id}_{viewport_key}.png`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    public_prefix: String,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(run_id: &str, viewport_key: &str) -> String {
        format!("{}_{}.png", run_id, viewport_key)
    }

    pub fn public_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.public_prefix, file_name)
    }

    /// Write `png` for the given run and viewport.
    pub fn persist(&self, run_id: &str, viewport_key: &str, png: &[u8]) -> Result<StoredArtifact> {
        std::fs::create_dir_all(&self.dir)?;
        let name = Self::file_name(run_id, viewport_key);
        let path = self.dir.join(&name);
        std::fs::write(&path, png)
            .map_err(|e| Error::Storage(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(StoredArtifact {
            public_path: self.public_path(&name),
            path,
        })
    }

    /// Resolve a public file name to a file in the store, refusing anything
    /// that is not a plain file name.
    pub fn resolve(&self, file_name: &str) -> Result<PathBuf> {
        let plain = !file_name.is_empty()
            && !file_name.starts_with('.')
            && file_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !plain {
            return Err(Error::NotFound(file_name.to_string()));
        }
        let path = self.dir.join(file_name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::NotFound(file_name.to_string()))
        }
    }

    /// Remove artifacts last modified more than `max_age` ago. Individual
    /// failures are logged and counted; the sweep always visits every file.
    pub fn sweep(&self, max_age: Duration) -> SweepSummary {
        let mut summary = SweepSummary::default();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Cannot read screenshot directory {}: {}", self.dir.display(), e);
                }
                return summary;
            }
        };

        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        for entry in entries.flatten() {
            let path = entry.path();
            let modified = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta.modified(),
                Ok(_) => continue,
                Err(e) => Err(e),
            };
            match modified {
                Ok(mtime) if mtime < cutoff => match std::fs::remove_file(&path) {
                    Ok(()) => {
                        info!("Removed old screenshot: {}", path.display());
                        summary.removed += 1;
                    }
                    Err(e) => {
                        warn!("Error removing {}: {}", path.display(), e);
                        summary.failed += 1;
                    }
                },
                Ok(_) => {}
                Err(e) => {
                    warn!("Cannot stat {}: {}", path.display(), e);
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}
