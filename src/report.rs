//! Report assembly and storage
//!
//! A report merges the validation outcome and the capture results of one
//! upload. It is written once as `report_{run_id}.json` and never modified.

use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::validation::ValidationReport;
use crate::{CaptureResult, Error, Result};

/// Public reference to a captured screenshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotRef {
    pub name: String,
    pub path: String,
    pub viewport: String,
}

/// A viewport that was attempted but not captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotFailure {
    pub viewport: String,
    pub error: String,
}

/// The persisted record of one checked upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedReport {
    pub run_id: String,
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub validation: ValidationReport,
    /// `None` when screenshots were not requested
    pub screenshots: Option<Vec<ScreenshotRef>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub screenshot_failures: Vec<ScreenshotFailure>,
}

impl PersistedReport {
    /// Merge validation output with capture results (if capture ran).
    pub fn assemble(
        run_id: impl Into<String>,
        original_filename: impl Into<String>,
        validation: ValidationReport,
        captures: Option<Vec<CaptureResult>>,
    ) -> Self {
        let mut screenshot_failures = Vec::new();
        let screenshots = captures.map(|results| {
            let mut refs = Vec::with_capacity(results.len());
            for result in results {
                match result {
                    CaptureResult::Success {
                        viewport_key,
                        display_name,
                        public_path,
                        ..
                    } => refs.push(ScreenshotRef {
                        name: display_name,
                        path: public_path,
                        viewport: viewport_key,
                    }),
                    CaptureResult::Failure {
                        viewport_key,
                        error_message,
                    } => screenshot_failures.push(ScreenshotFailure {
                        viewport: viewport_key,
                        error: error_message,
                    }),
                }
            }
            refs
        });

        Self {
            run_id: run_id.into(),
            original_filename: original_filename.into(),
            created_at: Utc::now(),
            validation,
            screenshots,
            screenshot_failures,
        }
    }
}

/// Directory of JSON reports keyed by run id.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, run_id: &str) -> Result<PathBuf> {
        let safe = !run_id.is_empty()
            && run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !safe {
            return Err(Error::NotFound(format!("report {}", run_id)));
        }
        Ok(self.dir.join(format!("report_{}.json", run_id)))
    }

    /// Write `report`. A report is immutable once written: saving the same
    /// run id twice is a storage error.
    pub fn save(&self, report: &PersistedReport) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&report.run_id)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    Error::Storage(format!("report {} already exists", report.run_id))
                }
                _ => Error::Storage(format!("Failed to create {}: {}", path.display(), e)),
            })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, report)?;
        writer.flush()?;
        Ok(path)
    }

    pub fn get(&self, run_id: &str) -> Result<PersistedReport> {
        let path = self.path_for(run_id)?;
        let file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("report {}", run_id)))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// All readable reports, newest first. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<PersistedReport>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with("report_") && name.ends_with(".json"))
            .collect();
        names.sort_unstable_by(|a, b| b.cmp(a));

        let mut reports = Vec::with_capacity(names.len());
        for name in names {
            let path = self.dir.join(&name);
            let parsed: Result<PersistedReport> = std::fs::File::open(&path)
                .map_err(Error::from)
                .and_then(|f| serde_json::from_reader(BufReader::new(f)).map_err(Error::from));
            match parsed {
                Ok(report) => reports.push(report),
                Err(e) => warn!("Skipping unreadable report {}: {}", path.display(), e),
            }
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate;

    fn report(run_id: &str, captures: Option<Vec<CaptureResult>>) -> PersistedReport {
        PersistedReport::assemble(
            run_id,
            "newsletter.html",
            validate("<html><body><img src=a.png></body></html>"),
            captures,
        )
    }

    #[test]
    fn assemble_splits_successes_and_failures() {
        let captures = vec![
            CaptureResult::Success {
                viewport_key: "desktop".into(),
                display_name: "Desktop (1200x800)".into(),
                artifact_path: PathBuf::from("static/screenshots/r_desktop.png"),
                public_path: "/static/screenshots/r_desktop.png".into(),
            },
            CaptureResult::Failure {
                viewport_key: "mobile".into(),
                error_message: "Capture failed: boom".into(),
            },
        ];
        let report = report("r", Some(captures));
        let shots = report.screenshots.as_ref().unwrap();
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].viewport, "desktop");
        assert_eq!(shots[0].path, "/static/screenshots/r_desktop.png");
        assert_eq!(report.screenshot_failures.len(), 1);
        assert_eq!(report.screenshot_failures[0].viewport, "mobile");
    }

    #[test]
    fn validation_fields_are_flat_in_json() {
        let json = serde_json::to_value(report("r1", None)).unwrap();
        assert_eq!(json["run_id"], "r1");
        assert_eq!(json["total_images"], 1);
        assert_eq!(json["missing_alt_count"], 1);
        assert_eq!(json["html_valid"], true);
        assert!(json["screenshots"].is_null());
        assert!(json.get("screenshot_failures").is_none());
    }

    #[test]
    fn save_get_and_list_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        store.save(&report("20240101_090000_000000", None)).unwrap();
        store.save(&report("20240301_090000_000000", Some(vec![]))).unwrap();
        store.save(&report("20240201_090000_000000", None)).unwrap();

        let loaded = store.get("20240301_090000_000000").unwrap();
        assert_eq!(loaded.screenshots, Some(vec![]));

        let ids: Vec<String> = store.list().unwrap().into_iter().map(|r| r.run_id).collect();
        assert_eq!(
            ids,
            vec![
                "20240301_090000_000000",
                "20240201_090000_000000",
                "20240101_090000_000000"
            ]
        );
    }

    #[test]
    fn reports_are_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        store.save(&report("same", None)).unwrap();
        assert!(matches!(store.save(&report("same", None)), Err(Error::Storage(_))));
    }

    #[test]
    fn missing_and_unsafe_ids_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        assert!(matches!(store.get("nope"), Err(Error::NotFound(_))));
        assert!(matches!(store.get("../etc/passwd"), Err(Error::NotFound(_))));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn list_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        store.save(&report("good", None)).unwrap();
        std::fs::write(dir.path().join("report_zzz.json"), "{not json").unwrap();
        let reports = store.list().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].run_id, "good");
    }
}
