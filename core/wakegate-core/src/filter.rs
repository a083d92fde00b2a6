//! Which filesystem touches count as session activity.
//!
//! A path is recorded when it is outside the system-path denylist, carries an
//! allow-listed extension, and its file name does not look like a cache or
//! lock artifact. Update the junk patterns when new artifact shapes show up.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::RecorderConfig;

// ═══════════════════════════════════════════════════════════════════════════════
// Junk File Name Patterns
// ═══════════════════════════════════════════════════════════════════════════════

/// Browser cache copies: `app.br[1].js`, `style[2].css`.
pub static RE_CACHE_COPY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]\.[^.]+$").unwrap());
/// Office owner files: `~$report.docx`.
pub static RE_OFFICE_OWNER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^~\$").unwrap());
/// LibreOffice locks: `.~lock.report.docx#`.
pub static RE_LIBRE_LOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\.~lock\.").unwrap());
/// Emacs lock and autosave files: `.#notes.txt`, `#notes.txt#`.
pub static RE_EDITOR_LOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\.#|#.*#$)").unwrap());

static JUNK_PATTERNS: Lazy<[&'static Lazy<Regex>; 4]> =
    Lazy::new(|| [&RE_CACHE_COPY, &RE_OFFICE_OWNER, &RE_LIBRE_LOCK, &RE_EDITOR_LOCK]);

pub fn is_junk_file_name(name: &str) -> bool {
    JUNK_PATTERNS.iter().any(|re| re.is_match(name))
}

#[derive(Debug, Clone)]
pub struct ActivityFilter {
    excluded_dirs: Vec<PathBuf>,
    allowed_extensions: Vec<String>,
}

impl ActivityFilter {
    pub fn new(excluded_dirs: Vec<PathBuf>, allowed_extensions: Vec<String>) -> Self {
        let allowed_extensions = allowed_extensions
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self {
            excluded_dirs,
            allowed_extensions,
        }
    }

    /// Filter for the configured recorder. The state directory is always
    /// excluded so the recorder never records its own writes.
    pub fn from_config(config: &RecorderConfig, state_dir: &Path) -> Self {
        let mut excluded = config.excluded_dirs.clone();
        excluded.push(state_dir.to_path_buf());
        Self::new(excluded, config.allowed_extensions.clone())
    }

    pub fn is_excluded_dir(&self, path: &Path) -> bool {
        self.excluded_dirs.iter().any(|dir| path.starts_with(dir))
    }

    /// Returns the file name to record for `path`, if it counts as activity.
    pub fn accept(&self, path: &Path) -> Option<String> {
        if self.is_excluded_dir(path) {
            return None;
        }

        let name = path.file_name()?.to_str()?;
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())?;
        if !self.allowed_extensions.contains(&extension) {
            return None;
        }

        if is_junk_file_name(name) {
            return None;
        }

        Some(name.to_string())
    }
}
