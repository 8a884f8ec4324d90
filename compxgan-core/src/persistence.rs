//! Atomic file writes for run records and resolved configs.
//!
//! Every write goes to a `.tmp` sibling first and is then renamed over the target, so a
//! crashed harness never leaves a half-written `run.json` behind.

use crate::error::HarnessError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Write raw bytes atomically, creating parent directories.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), HarnessError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Serialise `data` as pretty JSON and write it atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<(), HarnessError> {
    let json = serde_json::to_string_pretty(data)?;
    atomic_write(path, json.as_bytes())
}

/// Load a JSON file. A missing file is `Ok(None)`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, HarnessError> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&data)?))
}
