//! One harness invocation: load, resolve, record, launch.

use crate::config::HarnessSettings;
use crate::error::HarnessError;
use crate::experiment::parser::{LoadedExperiment, load_experiment};
use crate::experiment::schema::SeedSetting;
use crate::experiment::validate::ValidationOptions;
use crate::filelist::{FilelistReport, read_filelist};
use crate::registry::ClassPathRegistry;
use crate::training::launcher::{LaunchOutcome, LaunchPlan, Launcher, RunMode};
use crate::training::reproducibility::{ResolvedSeed, pin_seed};
use crate::training::run::{NewRun, RunRecord, RunStatus, RunStore};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What the user asked for.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub mode: RunMode,
    pub config: PathBuf,
    pub filelist: Option<PathBuf>,
    pub overrides: Vec<String>,
    /// Resolve and print, but write nothing and launch nothing.
    pub dry_run: bool,
}

/// A resolved run, ready to launch.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub experiment: LoadedExperiment,
    pub seed: Option<ResolvedSeed>,
    pub filelist: Option<FilelistReport>,
    pub record: RunRecord,
    pub plan: LaunchPlan,
    /// Resolved document as written to (or, for a dry run, destined for) the run directory.
    pub rendered: String,
}

/// Validation options derived from harness settings.
pub fn validation_options(settings: &HarnessSettings, workspace: &Path) -> ValidationOptions {
    ValidationOptions {
        strict: settings.validation.strict,
        filelist_base: settings
            .validation
            .check_filelists
            .then(|| workspace.to_path_buf()),
    }
}

fn absolute(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

/// Load and validate the experiment, resolve its seed, and build the run record and launch
/// plan. Unless `dry_run` is set the run directory is written.
pub fn prepare_run(
    request: &RunRequest,
    settings: &HarnessSettings,
    registry: &ClassPathRegistry,
    launcher: &Launcher,
    store: &RunStore,
) -> Result<PreparedRun, HarnessError> {
    let workspace = launcher.workspace();
    let options = validation_options(settings, workspace);
    let config_path = absolute(workspace, &request.config);
    let mut experiment = load_experiment(&config_path, &request.overrides, registry, &options)?;

    let filelist_path = request.filelist.as_deref().map(|p| absolute(workspace, p));
    let filelist = match (request.mode, &filelist_path) {
        (RunMode::Infer, Some(path)) => {
            let list = read_filelist(path)?;
            let report = list.require_usable(workspace)?;
            if !report.is_complete() {
                warn!(
                    filelist = %path.display(),
                    missing = report.missing.len(),
                    total = report.total,
                    "Some file list entries do not exist"
                );
            }
            Some(report)
        }
        (RunMode::Infer, None) => {
            return Err(HarnessError::filelist("inference requires a file list"));
        }
        (RunMode::Train, _) => None,
    };

    let seed = experiment.config.seed_everything.resolve()?;
    if let Some(seed) = &seed {
        pin_seed(&mut experiment.document, seed);
        experiment.config.seed_everything = SeedSetting::Fixed(i64::from(seed.value));
        if seed.drawn {
            info!(seed = seed.value, "Drew random seed");
        }
    }

    let new_run = NewRun {
        mode: request.mode,
        config_path: &config_path,
        document: &experiment.document,
        seed,
        filelist: filelist_path.as_deref(),
        overrides: &request.overrides,
    };
    let (mut record, rendered) = store.prepare(&new_run)?;
    let plan = launcher.plan(
        request.mode,
        &record.resolved_config_path,
        filelist_path.as_deref(),
        seed.map(|s| s.value),
    )?;
    record.command = plan.command_line();

    if !request.dry_run {
        store.commit(&record, &rendered)?;
        info!(id = %record.id, mode = %record.mode, "Prepared run");
    }

    Ok(PreparedRun {
        experiment,
        seed,
        filelist,
        record,
        plan,
        rendered,
    })
}

/// Launch a prepared run and keep its record current.
pub async fn execute_run(
    prepared: PreparedRun,
    launcher: &Launcher,
    store: &RunStore,
) -> Result<(RunRecord, LaunchOutcome), HarnessError> {
    let mut record = prepared.record;
    record.status = RunStatus::Running;
    record.started_at = Utc::now();
    store.save(&record)?;

    let result = launcher.run(&prepared.plan).await;
    record.finished_at = Some(Utc::now());
    match result {
        Ok(outcome) => {
            record.status = outcome.status;
            record.exit_code = outcome.exit_code;
            store.save(&record)?;
            Ok((record, outcome))
        }
        Err(e) => {
            record.status = RunStatus::Failed;
            if let Err(save_err) = store.save(&record) {
                warn!(id = %record.id, error = %save_err, "Failed to update run record");
            }
            Err(e)
        }
    }
}
