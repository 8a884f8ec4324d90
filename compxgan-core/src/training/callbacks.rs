//! Trainer callbacks: classification and checkpoint-policy checks.
//!
//! The callbacks themselves run inside the external framework. The harness only needs to know
//! which role each configured callback plays so it can check the combination before launch.

use crate::error::HarnessError;
use crate::experiment::schema::{ComponentSpec, LoggerSetting, TrainerConfig};
use crate::experiment::validate::ValidationReport;
use crate::registry::{ClassPathRegistry, ComponentKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role a configured callback plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackRole {
    Checkpoint,
    LearningRateMonitor,
    ModelSummary,
    GradNorm,
    Other,
}

/// Classify a callback. Only registered class paths get a specific role.
pub fn classify(component: &ComponentSpec, registry: &ClassPathRegistry) -> CallbackRole {
    if registry.kind_of(&component.class_path) != Some(ComponentKind::Callback) {
        return CallbackRole::Other;
    }
    match component.short_name() {
        "ModelCheckpoint" => CallbackRole::Checkpoint,
        "LearningRateMonitor" => CallbackRole::LearningRateMonitor,
        "ModelSummary" => CallbackRole::ModelSummary,
        "GradNormCallback" => CallbackRole::GradNorm,
        _ => CallbackRole::Other,
    }
}

/// Checkpoint policy carried by a `ModelCheckpoint` callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default = "default_save_top_k")]
    pub save_top_k: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_last: Option<bool>,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every_n_train_steps: Option<u64>,
}

fn default_save_top_k() -> i64 {
    1
}

fn default_mode() -> String {
    "min".to_string()
}

/// The first checkpoint policy configured on the trainer, if any.
pub fn checkpoint_policy(
    trainer: &TrainerConfig,
    registry: &ClassPathRegistry,
) -> Result<Option<CheckpointArgs>, HarnessError> {
    trainer
        .callbacks
        .iter()
        .find(|cb| classify(cb, registry) == CallbackRole::Checkpoint)
        .map(|cb| cb.args::<CheckpointArgs>())
        .transpose()
}

fn braces_balanced(template: &str) -> bool {
    let mut depth = 0i32;
    for c in template.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Check the configured callbacks as a set.
pub fn check_callbacks(
    trainer: &TrainerConfig,
    registry: &ClassPathRegistry,
    report: &mut ValidationReport,
) {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut checkpoints = 0usize;
    let logger_disabled = matches!(trainer.logger, Some(LoggerSetting::Enabled(false)));

    for (i, cb) in trainer.callbacks.iter().enumerate() {
        let path = format!("trainer.callbacks.{i}");
        let role = classify(cb, registry);

        if role != CallbackRole::Checkpoint {
            if let Some(first) = seen.insert(cb.class_path.as_str(), i) {
                report.warning(
                    format!("{path}.class_path"),
                    format!("'{}' is already configured at index {first}", cb.class_path),
                );
            }
        }

        match role {
            CallbackRole::Checkpoint => {
                checkpoints += 1;
                check_checkpoint(cb, &path, report);
            }
            CallbackRole::LearningRateMonitor if logger_disabled => {
                report.error(
                    format!("{path}.class_path"),
                    "LearningRateMonitor needs a logger, but trainer.logger is false",
                );
            }
            _ => {}
        }
    }

    if checkpoints > 1 {
        report.warning(
            "trainer.callbacks",
            format!("{checkpoints} checkpoint callbacks are configured"),
        );
    }
}

fn check_checkpoint(cb: &ComponentSpec, path: &str, report: &mut ValidationReport) {
    let args_path = format!("{path}.init_args");
    let args: CheckpointArgs = match cb.args() {
        Ok(args) => args,
        Err(e) => {
            report.error(args_path, e.to_string());
            return;
        }
    };

    if args.save_top_k < -1 {
        report.error(
            format!("{args_path}.save_top_k"),
            "must be -1 (keep all), 0 (keep none), or a positive count",
        );
    } else if args.monitor.is_none() && args.save_top_k > 1 {
        report.error(
            format!("{args_path}.save_top_k"),
            format!(
                "keeping the best {} checkpoints requires a monitored metric",
                args.save_top_k
            ),
        );
    }
    if args.mode != "min" && args.mode != "max" {
        report.error(
            format!("{args_path}.mode"),
            format!("'{}' is neither 'min' nor 'max'", args.mode),
        );
    }
    if args.save_top_k == 0 && args.save_last != Some(true) {
        report.warning(
            format!("{args_path}.save_top_k"),
            "no checkpoints will be written",
        );
    }
    if let Some(template) = &args.filename {
        if !braces_balanced(template) {
            report.warning(
                format!("{args_path}.filename"),
                format!("unbalanced braces in filename template '{template}'"),
            );
        }
    }
    if args.every_n_train_steps == Some(0) {
        report.warning(
            format!("{args_path}.every_n_train_steps"),
            "0 disables step-based checkpointing",
        );
    }
}
