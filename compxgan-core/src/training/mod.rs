//! Runs: callbacks, seeds, launching, run records.

pub mod callbacks;
pub mod launcher;
pub mod reproducibility;
pub mod run;
pub mod session;

pub use launcher::{LaunchOutcome, LaunchPlan, Launcher, RunMode};
pub use reproducibility::{EnvironmentSnapshot, ResolvedSeed};
pub use run::{RunRecord, RunStatus, RunStore};
pub use session::{PreparedRun, RunRequest, execute_run, prepare_run};
