//! Upload boundary: the checks an incoming template must pass before any
//! work is done on it.

use unicode_normalization::UnicodeNormalization;

use crate::{Error, Result};

/// Extensions accepted for uploaded templates.
pub const ALLOWED_EXTENSIONS: &[&str] = &["html"];

/// A template accepted for checking.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Sanitized file name, safe to use as a path component
    pub filename: String,
    pub content: Vec<u8>,
    pub take_screenshots: bool,
}

impl Upload {
    /// Validate an incoming file.
    ///
    /// Rejects a missing file name, a non-HTML extension, an empty body and
    /// a body larger than `max_bytes`, all as [`Error::InputError`].
    pub fn new(filename: &str, content: Vec<u8>, take_screenshots: bool, max_bytes: usize) -> Result<Self> {
        if filename.trim().is_empty() {
            return Err(Error::InputError("No file selected".into()));
        }
        if !allowed_file(filename) {
            return Err(Error::InputError(
                "Invalid file type. Only HTML files allowed.".into(),
            ));
        }
        if content.is_empty() {
            return Err(Error::InputError("Uploaded file is empty".into()));
        }
        if content.len() > max_bytes {
            return Err(Error::InputError(format!(
                "File too large: {} bytes (limit {} bytes)",
                content.len(),
                max_bytes
            )));
        }
        let sanitized = secure_filename(filename);
        if sanitized.is_empty() || !allowed_file(&sanitized) {
            return Err(Error::InputError(format!("Unusable file name '{}'", filename)));
        }
        Ok(Self {
            filename: sanitized,
            content,
            take_screenshots,
        })
    }
}

pub fn allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Reduce a client-supplied file name to a safe single path component,
/// following werkzeug's `secure_filename`.
///
/// The name is NFKD-normalized and non-ASCII is dropped (`café` becomes
/// `cafe`). Path separators and whitespace runs become `_`, anything outside
/// ASCII alphanumerics and `._-` is removed, and leading or trailing dots
/// and underscores are stripped. Both `/` and `\` count as separators.
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename.nfkd().filter(char::is_ascii).collect();
    let joined = ascii
        .replace(['/', '\\'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    cleaned.trim_matches(['.', '_']).to_string()
}
