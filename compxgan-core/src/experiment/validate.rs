//! Experiment document validation.
//!
//! Two passes over a document:
//! 1. Well-formedness: every key the external framework reads is present and of the expected
//!    YAML type. Rules come from the document skeleton and from the registry entry of each
//!    component's class path. All problems are collected; nothing fails fast.
//! 2. Consistency: once the document decodes, cross-field checks (shared sample rates, matching
//!    STFT geometry between the feature extractor and the head, trainer limits, checkpoint policy).

use crate::experiment::schema::{
    BatchLimit, Devices, ExperimentConfig, FeatureExtractorArgs, SeedSetting, TrainerConfig,
};
use crate::registry::{ClassPathRegistry, ComponentKind};
use crate::training::callbacks;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::borrow::Cow;
use std::path::PathBuf;

/// Expected YAML type of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Integer,
    Float,
    Number,
    Bool,
    String,
    Mapping,
    Sequence,
    IntegerOrBool,
    BoolOrMapping,
    Devices,
    Padding,
    BatchLimit,
}

impl KeyType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            KeyType::Integer => is_integer(value),
            KeyType::Float => matches!(value, Value::Number(n) if n.is_f64()),
            KeyType::Number | KeyType::BatchLimit => value.is_number(),
            KeyType::Bool => value.is_bool(),
            KeyType::String => value.is_string(),
            KeyType::Mapping => value.is_mapping(),
            KeyType::Sequence => value.is_sequence(),
            KeyType::IntegerOrBool => is_integer(value) || value.is_bool(),
            KeyType::BoolOrMapping => value.is_bool() || value.is_mapping(),
            KeyType::Devices => match value {
                Value::Sequence(items) => items.iter().all(is_integer),
                other => is_integer(other) || other.is_string(),
            },
            KeyType::Padding => matches!(value.as_str(), Some("center") | Some("same")),
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            KeyType::Integer => "an integer",
            KeyType::Float => "a float",
            KeyType::Number => "a number",
            KeyType::Bool => "a boolean",
            KeyType::String => "a string",
            KeyType::Mapping => "a mapping",
            KeyType::Sequence => "a sequence",
            KeyType::IntegerOrBool => "an integer or boolean",
            KeyType::BoolOrMapping => "a boolean or mapping",
            KeyType::Devices => "a device count, list of device ids, or string",
            KeyType::Padding => "'center' or 'same'",
            KeyType::BatchLimit => "a batch count or fraction",
        };
        f.write_str(name)
    }
}

fn is_integer(value: &Value) -> bool {
    matches!(value, Value::Number(n) if n.is_i64() || n.is_u64())
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

/// A key the framework reads, relative to some prefix in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRule {
    pub key: Cow<'static, str>,
    pub ty: KeyType,
    pub required: bool,
}

impl KeyRule {
    pub const fn required(key: &'static str, ty: KeyType) -> Self {
        Self {
            key: Cow::Borrowed(key),
            ty,
            required: true,
        }
    }

    pub const fn optional(key: &'static str, ty: KeyType) -> Self {
        Self {
            key: Cow::Borrowed(key),
            ty,
            required: false,
        }
    }

    pub fn required_owned(key: String, ty: KeyType) -> Self {
        Self {
            key: Cow::Owned(key),
            ty,
            required: true,
        }
    }
}

/// Document skeleton, independent of which classes are configured.
const SKELETON: &[KeyRule] = &[
    KeyRule::optional("seed_everything", KeyType::IntegerOrBool),
    KeyRule::required("data", KeyType::Mapping),
    KeyRule::required("model", KeyType::Mapping),
    KeyRule::required("trainer", KeyType::Mapping),
    KeyRule::optional("trainer.logger", KeyType::BoolOrMapping),
    KeyRule::optional("trainer.callbacks", KeyType::Sequence),
    KeyRule::required("trainer.max_steps", KeyType::Integer),
    KeyRule::optional("trainer.limit_val_batches", KeyType::BatchLimit),
    KeyRule::required("trainer.accelerator", KeyType::String),
    KeyRule::optional("trainer.strategy", KeyType::String),
    KeyRule::required("trainer.devices", KeyType::Devices),
    KeyRule::required("trainer.log_every_n_steps", KeyType::Integer),
];

const ACCELERATORS: [&str; 6] = ["cpu", "gpu", "cuda", "mps", "tpu", "auto"];

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// A single validation finding, anchored at a dotted key path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub path: String,
    pub message: String,
}

/// Collected findings for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    pub fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(Issue {
            severity: Severity::Error,
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.issues.push(Issue {
            severity: Severity::Warning,
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Whether any issue is anchored exactly at `path`.
    pub fn mentions(&self, path: &str) -> bool {
        self.issues.iter().any(|i| i.path == path)
    }

    /// Turn every warning into an error.
    pub fn promote_warnings(&mut self) {
        for issue in &mut self.issues {
            issue.severity = Severity::Error;
        }
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.issues.is_empty() {
            return write!(f, "no issues");
        }
        for (i, issue) in self.issues.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let label = match issue.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            let path = if issue.path.is_empty() {
                "<root>"
            } else {
                issue.path.as_str()
            };
            write!(f, "  {label}: {path}: {}", issue.message)?;
        }
        Ok(())
    }
}

/// Validation knobs.
#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    /// Treat warnings as errors.
    pub strict: bool,
    /// When set, file lists named in the data module are checked for existence,
    /// resolving relative paths against this directory.
    pub filelist_base: Option<PathBuf>,
}

/// Look up a dotted path. Numeric segments index into sequences.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    let mut node = root;
    for segment in path.split('.') {
        node = match node {
            Value::Sequence(items) => items.get(segment.parse::<usize>().ok()?)?,
            Value::Mapping(map) => map.get(segment)?,
            _ => return None,
        };
    }
    Some(node)
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Apply key rules below `prefix`. Children of a missing or non-mapping parent are skipped so a
/// single structural problem is reported once.
pub fn check_rules(root: &Value, prefix: &str, rules: &[KeyRule], report: &mut ValidationReport) {
    for rule in rules {
        let path = join(prefix, &rule.key);
        if let Some((parent, _)) = path.rsplit_once('.') {
            if !lookup(root, parent).is_some_and(Value::is_mapping) {
                continue;
            }
        }
        match lookup(root, &path) {
            None if rule.required => {
                report.error(&path, format!("missing required key (expected {})", rule.ty));
            }
            None => {}
            Some(Value::Null) if !rule.required => {}
            Some(value) if !rule.ty.matches(value) => {
                report.error(
                    &path,
                    format!("expected {}, found {}", rule.ty, value_kind(value)),
                );
            }
            Some(_) => {}
        }
    }
}

/// Check one `class_path`/`init_args` node against the registry.
fn check_component(
    root: &Value,
    path: &str,
    expected: ComponentKind,
    registry: &ClassPathRegistry,
    report: &mut ValidationReport,
) {
    let Some(node) = lookup(root, path) else {
        return;
    };
    if !node.is_mapping() {
        return;
    }

    let class_path_key = join(path, "class_path");
    let class_path = match node.get("class_path") {
        Some(Value::String(s)) => s.as_str(),
        Some(other) => {
            report.error(
                &class_path_key,
                format!("expected a string, found {}", value_kind(other)),
            );
            return;
        }
        None => {
            report.error(&class_path_key, format!("missing class path for the {expected}"));
            return;
        }
    };

    let init_args_key = join(path, "init_args");
    if let Some(args) = node.get("init_args") {
        if !args.is_mapping() && !args.is_null() {
            report.error(
                &init_args_key,
                format!("expected a mapping, found {}", value_kind(args)),
            );
            return;
        }
    }

    match registry.lookup(class_path) {
        Some(entry) if entry.kind != expected => {
            report.error(
                &class_path_key,
                format!(
                    "'{class_path}' is a {}, but this slot expects a {expected}",
                    entry.kind
                ),
            );
        }
        Some(entry) if node.get("init_args").is_none_or(Value::is_null) => {
            for rule in entry.rules.iter().filter(|r| r.required && !r.key.contains('.')) {
                report.error(
                    join(&init_args_key, &rule.key),
                    format!("missing required key (expected {})", rule.ty),
                );
            }
        }
        Some(entry) => check_rules(root, &init_args_key, &entry.rules, report),
        None => {
            report.warning(
                &class_path_key,
                format!("unknown class path '{class_path}'; init_args were not checked"),
            );
        }
    }
}

/// Validate a raw experiment document.
pub fn validate_document(
    root: &Value,
    registry: &ClassPathRegistry,
    options: &ValidationOptions,
) -> ValidationReport {
    let mut report = ValidationReport::new();

    if !root.is_mapping() {
        report.error("", format!("expected a mapping, found {}", value_kind(root)));
        return report;
    }

    check_rules(root, "", SKELETON, &mut report);
    check_seed_range(root, &mut report);

    check_component(root, "data", ComponentKind::DataModule, registry, &mut report);
    check_component(root, "model", ComponentKind::Model, registry, &mut report);
    for (slot, kind) in [
        ("feature_extractor", ComponentKind::FeatureExtractor),
        ("backbone", ComponentKind::Backbone),
        ("head", ComponentKind::Head),
    ] {
        check_component(
            root,
            &format!("model.init_args.{slot}"),
            kind,
            registry,
            &mut report,
        );
    }
    check_component(root, "trainer.logger", ComponentKind::Logger, registry, &mut report);

    if let Some(Value::Sequence(items)) = lookup(root, "trainer.callbacks") {
        for (i, item) in items.iter().enumerate() {
            let path = format!("trainer.callbacks.{i}");
            if item.is_mapping() {
                check_component(root, &path, ComponentKind::Callback, registry, &mut report);
            } else {
                report.error(
                    &path,
                    format!("expected a mapping, found {}", value_kind(item)),
                );
            }
        }
    }

    if !report.has_errors() {
        match ExperimentConfig::from_value(root.clone()) {
            Ok(config) => check_consistency(&config, registry, options, &mut report),
            Err(e) => report.error("", e.to_string()),
        }
    }

    if options.strict {
        report.promote_warnings();
    }
    report
}

/// Integer seeds outside `u32` are reported here; ones beyond `i64` would not decode at all.
fn check_seed_range(root: &Value, report: &mut ValidationReport) {
    let Some(Value::Number(n)) = lookup(root, "seed_everything") else {
        return;
    };
    if n.is_f64() {
        return;
    }
    if !n.as_u64().is_some_and(|seed| seed <= u64::from(u32::MAX)) {
        report.error(
            "seed_everything",
            format!("seed {n} is outside the range 0..={}", u32::MAX),
        );
    }
}

fn is_kind(registry: &ClassPathRegistry, class_path: &str, kind: ComponentKind) -> bool {
    registry.kind_of(class_path) == Some(kind)
}

/// Cross-field checks on a decoded document. Components with unknown class paths are skipped.
pub fn check_consistency(
    config: &ExperimentConfig,
    registry: &ClassPathRegistry,
    options: &ValidationOptions,
    report: &mut ValidationReport,
) {
    if let SeedSetting::Fixed(seed) = config.seed_everything {
        if !(0..=i64::from(u32::MAX)).contains(&seed) {
            report.error(
                "seed_everything",
                format!("seed {seed} is outside the range 0..={}", u32::MAX),
            );
        }
    }

    check_trainer(&config.trainer, report);
    callbacks::check_callbacks(&config.trainer, registry, report);

    let mut data_rate = None;
    let mut clips: Vec<(&str, u64)> = Vec::new();
    if is_kind(registry, &config.data.class_path, ComponentKind::DataModule) {
        match config.data_args() {
            Ok(data) => {
                for (split, params) in [
                    ("train_params", &data.train_params),
                    ("val_params", &data.val_params),
                ] {
                    let base = format!("data.init_args.{split}");
                    if params.sampling_rate == 0 {
                        report.error(join(&base, "sampling_rate"), "must be positive");
                    }
                    if params.batch_size == 0 {
                        report.error(join(&base, "batch_size"), "must be positive");
                    }
                    if params.num_samples == 0 {
                        report.error(join(&base, "num_samples"), "must be positive");
                    }
                    if let Some(dir) = &options.filelist_base {
                        let list = dir.join(&params.filelist_path);
                        if !list.is_file() {
                            report.warning(
                                join(&base, "filelist_path"),
                                format!("file list {} does not exist", list.display()),
                            );
                        }
                    }
                }
                if data.train_params.sampling_rate != data.val_params.sampling_rate {
                    report.error(
                        "data.init_args.val_params.sampling_rate",
                        format!(
                            "{} Hz differs from the training split ({} Hz)",
                            data.val_params.sampling_rate, data.train_params.sampling_rate
                        ),
                    );
                }
                data_rate = Some(data.train_params.sampling_rate);
                clips = vec![
                    ("train_params", data.train_params.num_samples),
                    ("val_params", data.val_params.num_samples),
                ];
            }
            Err(e) => report.error("data.init_args", e.to_string()),
        }
    }

    if !is_kind(registry, &config.model.class_path, ComponentKind::Model) {
        return;
    }
    let model = match config.model_args() {
        Ok(model) => model,
        Err(e) => {
            report.error("model.init_args", e.to_string());
            return;
        }
    };

    if let Some(rate) = data_rate {
        if model.sample_rate != rate {
            report.error(
                "model.init_args.sample_rate",
                format!(
                    "{} Hz differs from the data sampling rate ({rate} Hz)",
                    model.sample_rate
                ),
            );
        }
    }
    if model.initial_learning_rate <= 0.0 || !model.initial_learning_rate.is_finite() {
        report.error("model.init_args.initial_learning_rate", "must be a positive number");
    }
    for (key, coeff) in [
        ("mel_loss_coeff", model.mel_loss_coeff),
        ("mrd_loss_coeff", model.mrd_loss_coeff),
    ] {
        if coeff < 0.0 || !coeff.is_finite() {
            report.error(join("model.init_args", key), "must be a non-negative number");
        }
    }
    if config.trainer.max_steps > 0 {
        let max_steps = config.trainer.max_steps as u64;
        for (key, steps) in [
            ("num_warmup_steps", model.num_warmup_steps),
            ("pretrain_mel_steps", model.pretrain_mel_steps),
        ] {
            if steps > max_steps {
                report.warning(
                    join("model.init_args", key),
                    format!("{steps} exceeds trainer.max_steps ({max_steps})"),
                );
            }
        }
    }

    const FE: &str = "model.init_args.feature_extractor.init_args";
    const BB: &str = "model.init_args.backbone.init_args";
    const HEAD: &str = "model.init_args.head.init_args";

    let mut features: Option<FeatureExtractorArgs> = None;
    if is_kind(registry, &model.feature_extractor.class_path, ComponentKind::FeatureExtractor) {
        match model.feature_extractor_args() {
            Ok(fe) => {
                if fe.sample_rate != model.sample_rate {
                    report.error(
                        join(FE, "sample_rate"),
                        format!(
                            "{} Hz differs from the model sample rate ({} Hz)",
                            fe.sample_rate, model.sample_rate
                        ),
                    );
                }
                if fe.n_fft == 0 || fe.n_fft % 2 != 0 {
                    report.error(join(FE, "n_fft"), "must be a positive even number");
                }
                if fe.hop_length == 0 || fe.hop_length > fe.n_fft {
                    report.error(
                        join(FE, "hop_length"),
                        format!("must be in 1..={}", fe.n_fft),
                    );
                }
                if fe.n_mels == 0 {
                    report.error(join(FE, "n_mels"), "must be positive");
                } else if fe.n_mels > fe.n_fft / 2 + 1 {
                    report.warning(
                        join(FE, "n_mels"),
                        format!(
                            "{} mel bands exceed the {} frequency bins of a {}-point FFT",
                            fe.n_mels,
                            fe.n_fft / 2 + 1,
                            fe.n_fft
                        ),
                    );
                }
                for (split, clip) in clips.iter().copied().filter(|(_, clip)| *clip > 0) {
                    let key = format!("data.init_args.{split}.num_samples");
                    let hop = u64::from(fe.hop_length);
                    if hop == 0 {
                        continue;
                    }
                    if clip < hop {
                        report.error(
                            key,
                            format!("{clip} is shorter than hop_length {}", fe.hop_length),
                        );
                    } else if clip < u64::from(fe.n_fft) {
                        report.warning(
                            key,
                            format!("{clip} is shorter than one {}-point STFT frame", fe.n_fft),
                        );
                    } else if clip % hop != 0 {
                        report.warning(
                            key,
                            format!("{clip} is not a multiple of hop_length {}", fe.hop_length),
                        );
                    }
                }
                features = Some(fe);
            }
            Err(e) => report.error(FE, e.to_string()),
        }
    }

    let mut backbone_dim = None;
    if is_kind(registry, &model.backbone.class_path, ComponentKind::Backbone) {
        match model.backbone_args() {
            Ok(bb) => {
                if let Some(fe) = &features {
                    if bb.input_channels != fe.n_mels {
                        report.error(
                            join(BB, "input_channels"),
                            format!(
                                "{} does not match the feature extractor's n_mels ({})",
                                bb.input_channels, fe.n_mels
                            ),
                        );
                    }
                }
                for (key, v) in [
                    ("dim", bb.dim),
                    ("intermediate_dim", bb.intermediate_dim),
                    ("num_layers", bb.num_layers),
                ] {
                    if v == 0 {
                        report.error(join(BB, key), "must be positive");
                    }
                }
                match bb.block_size {
                    Some(0) => report.error(join(BB, "block_size"), "must be positive"),
                    Some(bs) => {
                        for (key, v) in
                            [("dim", bb.dim), ("intermediate_dim", bb.intermediate_dim)]
                        {
                            if v % bs != 0 {
                                report.error(
                                    join(BB, "block_size"),
                                    format!("{bs} does not divide {key} ({v})"),
                                );
                            }
                        }
                    }
                    None => {}
                }
                backbone_dim = Some(bb.dim);
            }
            Err(e) => report.error(BB, e.to_string()),
        }
    }

    if is_kind(registry, &model.head.class_path, ComponentKind::Head) {
        match model.head_args() {
            Ok(head) => {
                if let Some(dim) = backbone_dim {
                    if head.dim != dim {
                        report.error(
                            join(HEAD, "dim"),
                            format!("{} does not match the backbone dim ({dim})", head.dim),
                        );
                    }
                }
                if let Some(fe) = &features {
                    if head.n_fft != fe.n_fft {
                        report.error(
                            join(HEAD, "n_fft"),
                            format!(
                                "{} does not match the feature extractor ({})",
                                head.n_fft, fe.n_fft
                            ),
                        );
                    }
                    if head.hop_length != fe.hop_length {
                        report.error(
                            join(HEAD, "hop_length"),
                            format!(
                                "{} does not match the feature extractor ({})",
                                head.hop_length, fe.hop_length
                            ),
                        );
                    }
                    if head.padding != fe.padding {
                        report.error(
                            join(HEAD, "padding"),
                            format!(
                                "'{}' does not match the feature extractor ('{}')",
                                head.padding, fe.padding
                            ),
                        );
                    }
                }
                if let Some(levels) = head.phase_levels {
                    if levels < 2 {
                        report.error(
                            join(HEAD, "phase_levels"),
                            "phase quantization needs at least 2 levels",
                        );
                    }
                }
            }
            Err(e) => report.error(HEAD, e.to_string()),
        }
    }
}

fn check_trainer(trainer: &TrainerConfig, report: &mut ValidationReport) {
    if trainer.max_steps == 0 || trainer.max_steps < -1 {
        report.error("trainer.max_steps", "must be positive, or -1 for no step limit");
    }
    if trainer.log_every_n_steps == 0 {
        report.error("trainer.log_every_n_steps", "must be positive");
    }
    match trainer.limit_val_batches {
        Some(BatchLimit::Fraction(f)) if !(f > 0.0 && f <= 1.0) => {
            report.error(
                "trainer.limit_val_batches",
                format!("fraction {f} is outside (0, 1]"),
            );
        }
        Some(BatchLimit::Batches(0)) => {
            report.warning("trainer.limit_val_batches", "0 disables validation");
        }
        _ => {}
    }
    if !ACCELERATORS.contains(&trainer.accelerator.as_str()) {
        report.error(
            "trainer.accelerator",
            format!(
                "'{}' is not one of {}",
                trainer.accelerator,
                ACCELERATORS.join(", ")
            ),
        );
    }
    match &trainer.devices {
        Devices::Count(n) if *n == 0 || *n < -1 => {
            report.error("trainer.devices", "device count must be positive, or -1 for all");
        }
        Devices::List(ids) if ids.is_empty() => {
            report.error("trainer.devices", "device list is empty");
        }
        Devices::Named(s) if s.as_str() != "auto" && s.as_str() != "-1" => {
            let all_ids = s
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .all(|p| p.parse::<u32>().is_ok());
            if !all_ids || s.trim().is_empty() {
                report.error(
                    "trainer.devices",
                    format!("'{s}' is neither 'auto' nor a comma-separated list of device ids"),
                );
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_key_type_matching() {
        assert!(KeyType::Integer.matches(&doc("3")));
        assert!(!KeyType::Integer.matches(&doc("3.5")));
        assert!(KeyType::Number.matches(&doc("3")));
        assert!(KeyType::Number.matches(&doc("5.0e-4")));
        assert!(KeyType::IntegerOrBool.matches(&doc("true")));
        assert!(KeyType::Devices.matches(&doc("[0, 1]")));
        assert!(KeyType::Devices.matches(&doc("auto")));
        assert!(!KeyType::Devices.matches(&doc("[a]")));
        assert!(KeyType::Padding.matches(&doc("same")));
        assert!(!KeyType::Padding.matches(&doc("reflect")));
    }

    #[test]
    fn test_lookup_paths() {
        let root = doc("a:\n  b:\n    - x: 1\n    - x: 2\n");
        assert_eq!(lookup(&root, "a.b.1.x"), Some(&doc("2")));
        assert!(lookup(&root, "a.b.2.x").is_none());
        assert!(lookup(&root, "a.c").is_none());
        assert_eq!(lookup(&root, ""), Some(&root));
    }

    #[test]
    fn test_non_mapping_root() {
        let report = validate_document(
            &doc("- 1\n- 2\n"),
            &ClassPathRegistry::builtin(),
            &ValidationOptions::default(),
        );
        assert!(report.has_errors());
        assert!(report.mentions(""));
    }

    #[test]
    fn test_missing_parent_reported_once() {
        let report = validate_document(
            &doc("data:\n  class_path: x.Data\nmodel:\n  class_path: x.Model\n"),
            &ClassPathRegistry::builtin(),
            &ValidationOptions::default(),
        );
        assert!(report.mentions("trainer"));
        assert!(!report.mentions("trainer.max_steps"));
    }

    #[test]
    fn test_check_rules_optional_null_is_accepted() {
        let root = doc("a:\n  b: null\n");
        let mut report = ValidationReport::new();
        check_rules(
            &root,
            "a",
            &[KeyRule::optional("b", KeyType::Integer)],
            &mut report,
        );
        assert!(report.is_clean());

        check_rules(
            &root,
            "a",
            &[KeyRule::required("b", KeyType::Integer)],
            &mut report,
        );
        assert!(report.mentions("a.b"));
    }

    #[test]
    fn test_seed_beyond_i64_is_a_range_error() {
        let mut report = ValidationReport::new();
        check_seed_range(&doc("seed_everything: 18446744073709551615\n"), &mut report);
        assert!(report.mentions("seed_everything"));
        assert!(report.to_string().contains("outside the range"));

        let mut report = ValidationReport::new();
        check_seed_range(&doc("seed_everything: -1\n"), &mut report);
        assert!(report.mentions("seed_everything"));

        let mut report = ValidationReport::new();
        check_seed_range(&doc("seed_everything: 4294967295\n"), &mut report);
        check_seed_range(&doc("seed_everything: true\n"), &mut report);
        assert!(report.is_clean());
    }

    #[test]
    fn test_strict_promotes_warnings() {
        let mut report = ValidationReport::new();
        report.warning("x", "something odd");
        assert!(!report.has_errors());
        report.promote_warnings();
        assert!(report.has_errors());
        assert_eq!(report.warnings().count(), 0);
    }

    #[test]
    fn test_report_display() {
        let mut report = ValidationReport::new();
        assert_eq!(report.to_string(), "no issues");
        report.error("trainer.max_steps", "must be positive");
        report.warning("", "odd root");
        let text = report.to_string();
        assert!(text.contains("error: trainer.max_steps: must be positive"));
        assert!(text.contains("warning: <root>: odd root"));
    }
}
