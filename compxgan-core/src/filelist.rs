//! Audio file lists.
//!
//! One path per line. Blank lines and `#` comments are skipped and surrounding whitespace is
//! trimmed. Relative entries resolve against a base directory chosen by the caller (the working
//! directory of the external process).

use crate::error::HarnessError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A parsed file list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filelist {
    pub source: PathBuf,
    pub entries: Vec<PathBuf>,
}

/// Result of checking a file list against the filesystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilelistReport {
    pub total: usize,
    pub missing: Vec<PathBuf>,
}

impl FilelistReport {
    pub fn found(&self) -> usize {
        self.total - self.missing.len()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Parse file list text into its entries, as written.
pub fn parse_filelist(text: &str) -> Vec<PathBuf> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect()
}

/// Check which `entries` exist once resolved against `base`.
pub fn check_entries(entries: &[PathBuf], base: &Path) -> FilelistReport {
    let missing = entries
        .iter()
        .filter(|entry| !resolve_entry(entry, base).is_file())
        .cloned()
        .collect();
    FilelistReport {
        total: entries.len(),
        missing,
    }
}

fn resolve_entry(entry: &Path, base: &Path) -> PathBuf {
    if entry.is_absolute() {
        entry.to_path_buf()
    } else {
        base.join(entry)
    }
}

/// Read and parse a file list.
pub fn read_filelist(path: &Path) -> Result<Filelist, HarnessError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        HarnessError::filelist(format!("cannot read {}: {e}", path.display()))
    })?;
    Ok(Filelist {
        source: path.to_path_buf(),
        entries: parse_filelist(&text),
    })
}

impl Filelist {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check which entries exist on disk.
    pub fn check(&self, base: &Path) -> FilelistReport {
        check_entries(&self.entries, base)
    }

    /// Inference needs at least one entry that exists.
    pub fn require_usable(&self, base: &Path) -> Result<FilelistReport, HarnessError> {
        if self.is_empty() {
            return Err(HarnessError::filelist(format!(
                "{} has no entries",
                self.source.display()
            )));
        }
        let report = self.check(base);
        if report.found() == 0 {
            return Err(HarnessError::filelist(format!(
                "none of the {} entries in {} exist",
                report.total,
                self.source.display()
            )));
        }
        Ok(report)
    }
}
