//! Launching the external framework.
//!
//! The harness never trains anything itself. It resolves a run, then hands the resolved
//! document to the framework's train or inference entry point as a child process and
//! supervises it: output is forwarded line by line into `tracing`, an optional timeout kills
//! the child, and so does Ctrl-C.

use crate::config::{EntrypointSettings, HarnessSettings};
use crate::error::HarnessError;
use crate::training::run::RunStatus;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Exit code reported when the child is killed after its timeout.
pub const EXIT_TIMEOUT: i32 = 124;
/// Exit code reported when the child is killed after Ctrl-C.
pub const EXIT_INTERRUPTED: i32 = 130;
/// How long to keep reading output once the child has exited or been killed.
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

/// Which entry point a run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Train,
    Infer,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Train => write!(f, "train"),
            RunMode::Infer => write!(f, "infer"),
        }
    }
}

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchPlan {
    pub mode: RunMode,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Extra environment for the child, on top of the inherited one.
    pub env: Vec<(String, String)>,
}

impl LaunchPlan {
    /// Program followed by its arguments.
    pub fn command_line(&self) -> Vec<String> {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl std::fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{key}={value} ")?;
        }
        write!(f, "{}", self.command_line().join(" "))
    }
}

/// How a supervised child ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub status: RunStatus,
    /// The child's own exit code. `None` when it was killed or died from a signal.
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl LaunchOutcome {
    /// Exit code the harness itself should return.
    pub fn process_exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Succeeded => 0,
            RunStatus::Cancelled => EXIT_INTERRUPTED,
            RunStatus::TimedOut => EXIT_TIMEOUT,
            _ => self.exit_code.filter(|code| *code != 0).unwrap_or(1),
        }
    }
}

enum Finish {
    Exited(std::process::ExitStatus),
    TimedOut,
    Interrupted,
}

/// Builds launch plans and supervises the child process.
#[derive(Debug, Clone)]
pub struct Launcher {
    program: PathBuf,
    entrypoints: EntrypointSettings,
    workspace: PathBuf,
    timeout: Option<Duration>,
}

impl Launcher {
    pub fn new(settings: &HarnessSettings, workspace: impl Into<PathBuf>) -> Self {
        Self {
            program: settings.runtime.interpreter(),
            entrypoints: settings.entrypoints.clone(),
            workspace: workspace.into(),
            timeout: settings.runtime.timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Build the command line for one run.
    ///
    /// Arguments are `<script> <config_flag> <config>`, then `<filelist_flag> <filelist>` for
    /// inference, then any configured extra arguments.
    pub fn plan(
        &self,
        mode: RunMode,
        config: &Path,
        filelist: Option<&Path>,
        seed: Option<u32>,
    ) -> Result<LaunchPlan, HarnessError> {
        let script = match mode {
            RunMode::Train => &self.entrypoints.train_script,
            RunMode::Infer => &self.entrypoints.infer_script,
        };
        if script.as_os_str().is_empty() {
            return Err(HarnessError::launch(format!("no {mode} script configured")));
        }

        let mut args = vec![
            script.display().to_string(),
            self.entrypoints.config_flag.clone(),
            config.display().to_string(),
        ];
        match (mode, filelist) {
            (RunMode::Infer, Some(list)) => {
                args.push(self.entrypoints.filelist_flag.clone());
                args.push(list.display().to_string());
            }
            (RunMode::Infer, None) => {
                return Err(HarnessError::launch("inference requires a file list"));
            }
            (RunMode::Train, _) => {}
        }
        args.extend(self.entrypoints.extra_args.iter().cloned());

        let mut env = vec![("PYTHONUNBUFFERED".to_string(), "1".to_string())];
        if let Some(seed) = seed {
            env.push(("PL_GLOBAL_SEED".to_string(), seed.to_string()));
        }

        Ok(LaunchPlan {
            mode,
            program: self.program.clone(),
            args,
            cwd: self.workspace.clone(),
            env,
        })
    }

    /// Spawn the plan and wait for it, forwarding output into `tracing`.
    pub async fn run(&self, plan: &LaunchPlan) -> Result<LaunchOutcome, HarnessError> {
        info!(mode = %plan.mode, command = %plan, "Launching");
        let started = Instant::now();

        let mut child = Command::new(&plan.program)
            .args(&plan.args)
            .current_dir(&plan.cwd)
            .envs(plan.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HarnessError::launch(format!(
                    "failed to spawn {}: {e}",
                    plan.program.display()
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, "stdout")));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, "stderr")));

        let finish = tokio::select! {
            status = child.wait() => Finish::Exited(status?),
            _ = deadline(self.timeout) => Finish::TimedOut,
            _ = interrupted() => Finish::Interrupted,
        };

        if !matches!(finish, Finish::Exited(_)) {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill child process");
            }
        }

        // Descendants of the child can hold its pipes open after it is gone.
        for mut task in [stdout, stderr].into_iter().flatten() {
            match tokio::time::timeout(OUTPUT_DRAIN, &mut task).await {
                Ok(Ok(lines)) => debug!(lines, "Output stream closed"),
                Ok(Err(e)) => warn!(error = %e, "Output forwarder failed"),
                Err(_) => {
                    task.abort();
                    warn!("Child output still open after exit, detaching");
                }
            }
        }

        let duration = started.elapsed();
        let outcome = match finish {
            Finish::Exited(status) => LaunchOutcome {
                status: if status.success() {
                    RunStatus::Succeeded
                } else {
                    RunStatus::Failed
                },
                exit_code: status.code(),
                duration,
            },
            Finish::TimedOut => {
                warn!(
                    timeout_secs = self.timeout.map(|t| t.as_secs_f64()),
                    "Run timed out, child killed"
                );
                LaunchOutcome {
                    status: RunStatus::TimedOut,
                    exit_code: None,
                    duration,
                }
            }
            Finish::Interrupted => {
                warn!("Interrupted, child killed");
                LaunchOutcome {
                    status: RunStatus::Cancelled,
                    exit_code: None,
                    duration,
                }
            }
        };

        info!(
            status = %outcome.status,
            exit_code = outcome.exit_code,
            elapsed_secs = outcome.duration.as_secs_f64(),
            "Run finished"
        );
        Ok(outcome)
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R, stream: &'static str) -> usize {
    let mut lines = BufReader::new(reader).lines();
    let mut count = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                count += 1;
                info!(target: "external", stream, "{line}");
            }
            Ok(None) => break,
            Err(e) => {
                warn!(stream, error = %e, "Stopped reading child output");
                break;
            }
        }
    }
    count
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(t) => tokio::time::sleep(t).await,
        None => std::future::pending::<()>().await,
    }
}

async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
