//! Experiment document schema.
//!
//! Mirrors the YAML layout consumed by the external training framework: a seed, a data module,
//! a model assembled from feature extractor / backbone / head, and the trainer block. Every
//! instantiable node is a [`ComponentSpec`] (`class_path` + `init_args`); typed views over the
//! `init_args` live alongside.

use crate::error::HarnessError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root of an experiment document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub seed_everything: SeedSetting,
    pub data: ComponentSpec,
    pub model: ComponentSpec,
    pub trainer: TrainerConfig,
}

impl ExperimentConfig {
    /// Decode a raw YAML tree.
    pub fn from_value(value: serde_yaml::Value) -> Result<Self, HarnessError> {
        serde_yaml::from_value(value).map_err(|e| HarnessError::parse(e.to_string()))
    }

    pub fn data_args(&self) -> Result<DataModuleArgs, HarnessError> {
        self.data.args()
    }

    pub fn model_args(&self) -> Result<VocoderArgs, HarnessError> {
        self.model.args()
    }
}

/// A class to be instantiated by the external framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSpec {
    pub class_path: String,
    #[serde(default, skip_serializing_if = "serde_yaml::Mapping::is_empty")]
    pub init_args: serde_yaml::Mapping,
}

impl ComponentSpec {
    pub fn new(class_path: impl Into<String>) -> Self {
        Self {
            class_path: class_path.into(),
            init_args: serde_yaml::Mapping::new(),
        }
    }

    /// Decode `init_args` into a typed view.
    pub fn args<T: DeserializeOwned>(&self) -> Result<T, HarnessError> {
        serde_yaml::from_value(serde_yaml::Value::Mapping(self.init_args.clone()))
            .map_err(|e| HarnessError::config(format!("{}: {e}", self.class_path)))
    }

    /// Raw lookup of a single init argument.
    pub fn arg(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.init_args.get(key)
    }

    /// Final segment of the dotted class path.
    pub fn short_name(&self) -> &str {
        self.class_path
            .rsplit('.')
            .next()
            .unwrap_or(&self.class_path)
    }
}

/// `seed_everything`: an integer seed, `true` to draw one, `false` (or absent) to skip seeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawSeed", into = "RawSeed")]
pub enum SeedSetting {
    Fixed(i64),
    Random,
    #[default]
    Disabled,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawSeed {
    Flag(bool),
    Value(i64),
}

impl From<RawSeed> for SeedSetting {
    fn from(raw: RawSeed) -> Self {
        match raw {
            RawSeed::Flag(true) => SeedSetting::Random,
            RawSeed::Flag(false) => SeedSetting::Disabled,
            RawSeed::Value(v) => SeedSetting::Fixed(v),
        }
    }
}

impl From<SeedSetting> for RawSeed {
    fn from(seed: SeedSetting) -> Self {
        match seed {
            SeedSetting::Fixed(v) => RawSeed::Value(v),
            SeedSetting::Random => RawSeed::Flag(true),
            SeedSetting::Disabled => RawSeed::Flag(false),
        }
    }
}

/// Data module `init_args`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataModuleArgs {
    pub train_params: DataParams,
    pub val_params: DataParams,
}

/// Per-split data parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataParams {
    pub filelist_path: PathBuf,
    pub sampling_rate: u32,
    pub num_samples: u64,
    pub batch_size: u32,
    pub num_workers: u32,
}

/// Model `init_args` for the vocoder experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocoderArgs {
    pub sample_rate: u32,
    pub initial_learning_rate: f64,
    pub mel_loss_coeff: f64,
    pub mrd_loss_coeff: f64,
    #[serde(default)]
    pub num_warmup_steps: u64,
    #[serde(default)]
    pub pretrain_mel_steps: u64,
    #[serde(default)]
    pub decay_mel_coeff: bool,
    #[serde(default)]
    pub evaluate_utmos: bool,
    #[serde(default)]
    pub evaluate_pesq: bool,
    #[serde(default)]
    pub evaluate_periodicty: bool,
    pub feature_extractor: ComponentSpec,
    pub backbone: ComponentSpec,
    pub head: ComponentSpec,
}

impl VocoderArgs {
    pub fn feature_extractor_args(&self) -> Result<FeatureExtractorArgs, HarnessError> {
        self.feature_extractor.args()
    }

    pub fn backbone_args(&self) -> Result<BackboneArgs, HarnessError> {
        self.backbone.args()
    }

    pub fn head_args(&self) -> Result<HeadArgs, HarnessError> {
        self.head.args()
    }
}

/// STFT padding mode shared by the feature extractor and the iSTFT head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Padding {
    #[default]
    Center,
    Same,
}

impl std::fmt::Display for Padding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Padding::Center => write!(f, "center"),
            Padding::Same => write!(f, "same"),
        }
    }
}

/// Mel-spectrogram feature extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureExtractorArgs {
    pub sample_rate: u32,
    pub n_fft: u32,
    pub hop_length: u32,
    pub n_mels: u32,
    #[serde(default)]
    pub padding: Padding,
}

/// Complex-valued backbone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackboneArgs {
    pub input_channels: u32,
    pub dim: u32,
    pub intermediate_dim: u32,
    pub num_layers: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_scale_init_value: Option<f64>,
    /// Block size of the block-matrix computation scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_size: Option<u32>,
}

/// Complex iSTFT head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadArgs {
    pub dim: u32,
    pub n_fft: u32,
    pub hop_length: u32,
    #[serde(default)]
    pub padding: Padding,
    /// Number of discrete phase levels used by phase quantization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_levels: Option<u32>,
}

/// `trainer` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<LoggerSetting>,
    #[serde(default)]
    pub callbacks: Vec<ComponentSpec>,
    pub max_steps: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_val_batches: Option<BatchLimit>,
    pub accelerator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    pub devices: Devices,
    pub log_every_n_steps: u64,
    /// Remaining trainer keys, forwarded untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// `trainer.logger`: a flag or a logger component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LoggerSetting {
    Enabled(bool),
    Component(ComponentSpec),
}

/// `trainer.devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Devices {
    Count(i64),
    List(Vec<u32>),
    Named(String),
}

impl Devices {
    /// Number of devices requested, when it can be known statically.
    pub fn count(&self) -> Option<usize> {
        match self {
            Devices::Count(n) if *n > 0 => Some(*n as usize),
            Devices::List(ids) => Some(ids.len()),
            Devices::Named(s) if s.as_str() != "auto" => {
                let ids: Vec<&str> = s.split(',').filter(|p| !p.trim().is_empty()).collect();
                (!ids.is_empty()).then_some(ids.len())
            }
            _ => None,
        }
    }
}

/// `trainer.limit_val_batches`: an absolute count or a fraction of the loader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchLimit {
    Batches(u64),
    Fraction(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_setting_forms() {
        let fixed: SeedSetting = serde_yaml::from_str("4444").unwrap();
        assert_eq!(fixed, SeedSetting::Fixed(4444));
        let random: SeedSetting = serde_yaml::from_str("true").unwrap();
        assert_eq!(random, SeedSetting::Random);
        let off: SeedSetting = serde_yaml::from_str("false").unwrap();
        assert_eq!(off, SeedSetting::Disabled);
        assert_eq!(serde_yaml::to_string(&SeedSetting::Fixed(7)).unwrap().trim(), "7");
    }

    #[test]
    fn test_component_args_and_short_name() {
        let component: ComponentSpec = serde_yaml::from_str(
            r#"
class_path: compxgan.heads.ComplexISTFTHead
init_args:
  dim: 512
  n_fft: 1024
  hop_length: 256
  phase_levels: 32
"#,
        )
        .unwrap();
        assert_eq!(component.short_name(), "ComplexISTFTHead");
        let head: HeadArgs = component.args().unwrap();
        assert_eq!(head.n_fft, 1024);
        assert_eq!(head.padding, Padding::Center);
        assert_eq!(head.phase_levels, Some(32));
    }

    #[test]
    fn test_component_args_error_names_class() {
        let component = ComponentSpec::new("compxgan.heads.ComplexISTFTHead");
        let err = component.args::<HeadArgs>().unwrap_err();
        assert!(err.to_string().contains("ComplexISTFTHead"));
    }

    #[test]
    fn test_devices_forms() {
        let d: Devices = serde_yaml::from_str("[0, 1]").unwrap();
        assert_eq!(d.count(), Some(2));
        let d: Devices = serde_yaml::from_str("4").unwrap();
        assert_eq!(d.count(), Some(4));
        let d: Devices = serde_yaml::from_str("auto").unwrap();
        assert_eq!(d.count(), None);
        let d: Devices = serde_yaml::from_str("\"0,1,2\"").unwrap();
        assert_eq!(d.count(), Some(3));
        let d: Devices = serde_yaml::from_str("-1").unwrap();
        assert_eq!(d.count(), None);
    }

    #[test]
    fn test_batch_limit_forms() {
        let b: BatchLimit = serde_yaml::from_str("100").unwrap();
        assert_eq!(b, BatchLimit::Batches(100));
        let b: BatchLimit = serde_yaml::from_str("0.25").unwrap();
        assert_eq!(b, BatchLimit::Fraction(0.25));
    }

    #[test]
    fn test_trainer_keeps_extra_keys() {
        let trainer: TrainerConfig = serde_yaml::from_str(
            r#"
max_steps: 1000
accelerator: gpu
devices: [0]
log_every_n_steps: 50
gradient_clip_val: 1.0
"#,
        )
        .unwrap();
        assert!(trainer.extra.contains_key("gradient_clip_val"));
        assert!(trainer.callbacks.is_empty());
        assert!(trainer.logger.is_none());
    }
}
