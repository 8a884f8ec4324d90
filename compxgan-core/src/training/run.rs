//! Run records.
//!
//! Each launch gets a directory `<runs_dir>/<id>/` holding the resolved experiment document
//! (`config.yaml`) and a `run.json` record that is rewritten as the run progresses.

use crate::error::HarnessError;
use crate::experiment::parser::render_document;
use crate::persistence::{atomic_write, atomic_write_json, load_json};
use crate::training::launcher::RunMode;
use crate::training::reproducibility::{EnvironmentSnapshot, ResolvedSeed};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RECORD_FILE: &str = "run.json";
const CONFIG_FILE: &str = "config.yaml";

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Resolved and written, not launched (`--dry-run`, or launch pending).
    Prepared,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, RunStatus::Prepared | RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Prepared => "prepared",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

/// Persisted description of one launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub mode: RunMode,
    /// Experiment document as given on the command line.
    pub config_path: PathBuf,
    /// Resolved document written into the run directory.
    pub resolved_config_path: PathBuf,
    pub config_sha256: String,
    pub seed: Option<u32>,
    #[serde(default)]
    pub seed_drawn: bool,
    pub filelist: Option<PathBuf>,
    #[serde(default)]
    pub overrides: Vec<String>,
    /// Full command line, program first.
    #[serde(default)]
    pub command: Vec<String>,
    pub environment: EnvironmentSnapshot,
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn duration_secs(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_seconds())
    }
}

/// What a new run is made from.
#[derive(Debug, Clone)]
pub struct NewRun<'a> {
    pub mode: RunMode,
    pub config_path: &'a Path,
    pub document: &'a Value,
    pub seed: Option<ResolvedSeed>,
    pub filelist: Option<&'a Path>,
    pub overrides: &'a [String],
}

/// SHA-256 of a rendered document, hex encoded.
pub fn config_digest(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Sortable, unique run id: UTC timestamp plus a short random suffix.
fn new_run_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.format("%Y%m%d-%H%M%S"), &suffix[..8])
}

/// Directory-backed store of run records.
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Allocate a run id and build its record without touching the filesystem.
    pub fn prepare(&self, new: &NewRun<'_>) -> Result<(RunRecord, String), HarnessError> {
        let rendered = render_document(new.document)?;
        let started_at = Utc::now();
        let id = new_run_id(started_at);
        let record = RunRecord {
            resolved_config_path: self.run_dir(&id).join(CONFIG_FILE),
            id,
            mode: new.mode,
            config_path: new.config_path.to_path_buf(),
            config_sha256: config_digest(&rendered),
            seed: new.seed.map(|s| s.value),
            seed_drawn: new.seed.is_some_and(|s| s.drawn),
            filelist: new.filelist.map(Path::to_path_buf),
            overrides: new.overrides.to_vec(),
            command: Vec::new(),
            environment: EnvironmentSnapshot::capture(),
            status: RunStatus::Prepared,
            exit_code: None,
            started_at,
            finished_at: None,
        };
        Ok((record, rendered))
    }

    /// Create the run directory, write the resolved document, and persist the record.
    pub fn create(&self, new: &NewRun<'_>) -> Result<RunRecord, HarnessError> {
        let (record, rendered) = self.prepare(new)?;
        self.commit(&record, &rendered)?;
        Ok(record)
    }

    /// Write a record produced by [`RunStore::prepare`] along with its document.
    pub fn commit(&self, record: &RunRecord, rendered: &str) -> Result<(), HarnessError> {
        atomic_write(&record.resolved_config_path, rendered.as_bytes())?;
        self.save(record)?;
        debug!(id = %record.id, dir = %self.run_dir(&record.id).display(), "Created run");
        Ok(())
    }

    pub fn save(&self, record: &RunRecord) -> Result<(), HarnessError> {
        atomic_write_json(&self.run_dir(&record.id).join(RECORD_FILE), record)
    }

    pub fn load(&self, id: &str) -> Result<RunRecord, HarnessError> {
        load_json(&self.run_dir(id).join(RECORD_FILE))?
            .ok_or_else(|| HarnessError::not_found(format!("run '{id}'")))
    }

    /// All readable records, newest first. Unreadable entries are skipped with a warning.
    pub fn list(&self) -> Result<Vec<RunRecord>, HarnessError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(HarnessError::RunStore(format!(
                    "cannot read {}: {e}",
                    self.root.display()
                )));
            }
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let path = entry.path().join(RECORD_FILE);
            match load_json::<RunRecord>(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable run record")
                }
            }
        }
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc() -> Value {
        serde_yaml::from_str("seed_everything: 4444\ntrainer:\n  max_steps: 10\n").unwrap()
    }

    fn new_run<'a>(document: &'a Value, config: &'a Path) -> NewRun<'a> {
        NewRun {
            mode: RunMode::Train,
            config_path: config,
            document,
            seed: Some(ResolvedSeed {
                value: 4444,
                drawn: false,
            }),
            filelist: None,
            overrides: &[],
        }
    }

    #[test]
    fn test_create_writes_config_and_record() {
        let dir = TempDir::new().unwrap();
        let store = RunStore::new(dir.path().join("runs"));
        let document = doc();
        let record = store
            .create(&new_run(&document, Path::new("configs/compxgan.yaml")))
            .unwrap();

        let written = std::fs::read_to_string(&record.resolved_config_path).unwrap();
        assert_eq!(config_digest(&written), record.config_sha256);
        assert_eq!(record.status, RunStatus::Prepared);
        assert_eq!(record.seed, Some(4444));

        let loaded = store.load(&record.id).unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.config_sha256, record.config_sha256);
    }

    #[test]
    fn test_prepare_does_not_write() {
        let dir = TempDir::new().unwrap();
        let store = RunStore::new(dir.path().join("runs"));
        let document = doc();
        let (record, _) = store
            .prepare(&new_run(&document, Path::new("a.yaml")))
            .unwrap();
        assert!(!record.resolved_config_path.exists());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_load_unknown_run() {
        let dir = TempDir::new().unwrap();
        let store = RunStore::new(dir.path());
        assert!(matches!(
            store.load("nope"),
            Err(HarnessError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_newest_first_and_skips_junk() {
        let dir = TempDir::new().unwrap();
        let store = RunStore::new(dir.path());
        let document = doc();

        let mut older = store.create(&new_run(&document, Path::new("a.yaml"))).unwrap();
        older.started_at -= chrono::Duration::hours(1);
        store.save(&older).unwrap();
        let newer = store.create(&new_run(&document, Path::new("b.yaml"))).unwrap();

        std::fs::create_dir_all(dir.path().join("broken")).unwrap();
        std::fs::write(dir.path().join("broken").join(RECORD_FILE), "{").unwrap();
        std::fs::write(dir.path().join("stray.txt"), "x").unwrap();

        let ids: Vec<String> = store.list().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[test]
    fn test_status_update_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = RunStore::new(dir.path());
        let document = doc();
        let mut record = store.create(&new_run(&document, Path::new("a.yaml"))).unwrap();
        record.status = RunStatus::Failed;
        record.exit_code = Some(3);
        record.finished_at = Some(Utc::now());
        store.save(&record).unwrap();

        let loaded = store.load(&record.id).unwrap();
        assert_eq!(loaded.status, RunStatus::Failed);
        assert_eq!(loaded.exit_code, Some(3));
        assert!(loaded.status.is_finished());
        assert!(loaded.duration_secs().is_some());
    }

    #[test]
    fn test_missing_root_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let store = RunStore::new(dir.path().join("never-created"));
        assert!(store.list().unwrap().is_empty());
    }
}
