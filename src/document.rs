//! Scratch documents a browser can open.
//!
//! Each load writes the HTML to a uniquely named file (the name is chosen by
//! `tempfile`, so concurrent loads never collide). The file is removed when
//! the returned [`LoadedDocument`] is released or dropped, whichever comes
//! first; a failed removal is logged and never aborts the caller.

use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempPath;

use crate::{Error, Locator, Result};

/// Materializes HTML as files under a private directory.
#[derive(Debug, Clone, Default)]
pub struct DocumentLoader {
    dir: Option<PathBuf>,
}

impl DocumentLoader {
    /// `dir` of `None` uses the system temp directory.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn load(&self, html: &str) -> Result<LoadedDocument> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mailproof-").suffix(".html");
        let mut file = match &self.dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempfile_in(dir)?
            }
            None => builder.tempfile()?,
        };
        file.write_all(html.as_bytes())?;
        file.flush()?;

        let path = file.into_temp_path();
        let absolute = path
            .canonicalize()
            .map_err(|e| Error::Other(format!("cannot resolve {}: {}", path.display(), e)))?;
        let locator = Locator::from_path(&absolute)?;
        debug!("Loaded document at {}", locator);

        Ok(LoadedDocument {
            path: Some(path),
            locator,
        })
    }
}

/// A document on disk, removed on release.
#[derive(Debug)]
pub struct LoadedDocument {
    path: Option<TempPath>,
    locator: Locator,
}

impl LoadedDocument {
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Backing file, or `None` once released.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Delete the backing file now. Further calls (and the eventual drop)
    /// are no-ops.
    pub fn release(&mut self) {
        if let Some(path) = self.path.take() {
            let shown = path.display().to_string();
            match path.close() {
                Ok(()) => debug!("Removed document {}", shown),
                Err(e) => warn!("Failed to remove document {}: {}", shown, e),
            }
        }
    }
}

impl Drop for LoadedDocument {
    fn drop(&mut self) {
        self.release();
    }
}
