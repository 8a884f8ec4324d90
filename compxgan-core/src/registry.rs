//! Class-path registry: the components the external framework is expected to instantiate.
//!
//! Each entry records which slot of the experiment document the class belongs in and the
//! `init_args` keys the framework will read from it. The validator uses the entries to check
//! documents; unknown class paths are allowed through with a warning since the framework can
//! import arbitrary user classes.

use crate::experiment::validate::{KeyRule, KeyType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Slot a component occupies in the experiment document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    DataModule,
    Model,
    FeatureExtractor,
    Backbone,
    Head,
    Logger,
    Callback,
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ComponentKind::DataModule => "data module",
            ComponentKind::Model => "model",
            ComponentKind::FeatureExtractor => "feature extractor",
            ComponentKind::Backbone => "backbone",
            ComponentKind::Head => "head",
            ComponentKind::Logger => "logger",
            ComponentKind::Callback => "callback",
        };
        f.write_str(name)
    }
}

/// A registered component.
#[derive(Debug, Clone)]
pub struct ComponentEntry {
    pub class_path: String,
    pub kind: ComponentKind,
    pub description: String,
    /// Rules for keys under `init_args`.
    pub rules: Vec<KeyRule>,
}

impl ComponentEntry {
    pub fn new(
        class_path: impl Into<String>,
        kind: ComponentKind,
        description: impl Into<String>,
        rules: &[KeyRule],
    ) -> Self {
        Self {
            class_path: class_path.into(),
            kind,
            description: description.into(),
            rules: rules.to_vec(),
        }
    }
}

/// Registry of known class paths.
#[derive(Debug, Clone, Default)]
pub struct ClassPathRegistry {
    entries: HashMap<String, ComponentEntry>,
}

pub const DATA_MODULE: &str = "compxgan.dataset.AudioDataModule";
pub const VOCODER_EXP: &str = "compxgan.experiment.CompxGanExp";
pub const MEL_FEATURES: &str = "compxgan.feature_extractors.MelSpectrogramFeatures";
pub const COMPLEX_BACKBONE: &str = "compxgan.models.ComplexBackbone";
pub const COMPLEX_ISTFT_HEAD: &str = "compxgan.heads.ComplexISTFTHead";
pub const GRAD_NORM_CALLBACK: &str = "compxgan.helpers.GradNormCallback";

/// Both namespaces the framework publishes its classes under.
const FRAMEWORK_PREFIXES: [&str; 2] = ["pytorch_lightning", "lightning.pytorch"];

const DATA_PARAMS_RULES: [(&str, KeyType); 5] = [
    ("filelist_path", KeyType::String),
    ("sampling_rate", KeyType::Integer),
    ("num_samples", KeyType::Integer),
    ("batch_size", KeyType::Integer),
    ("num_workers", KeyType::Integer),
];

impl ClassPathRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registry pre-populated with the vocoder components and the framework loggers/callbacks
    /// the reference experiments use.
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        let mut data_rules = vec![
            KeyRule::required("train_params", KeyType::Mapping),
            KeyRule::required("val_params", KeyType::Mapping),
        ];
        for split in ["train_params", "val_params"] {
            for (key, ty) in DATA_PARAMS_RULES {
                data_rules.push(KeyRule::required_owned(format!("{split}.{key}"), ty));
            }
        }
        registry.register(ComponentEntry::new(
            DATA_MODULE,
            ComponentKind::DataModule,
            "Audio clip data module reading train/val file lists",
            &data_rules,
        ));

        registry.register(ComponentEntry::new(
            VOCODER_EXP,
            ComponentKind::Model,
            "Complex-valued GAN vocoder with multi-resolution discriminator",
            &[
                KeyRule::required("sample_rate", KeyType::Integer),
                KeyRule::required("initial_learning_rate", KeyType::Number),
                KeyRule::required("mel_loss_coeff", KeyType::Number),
                KeyRule::required("mrd_loss_coeff", KeyType::Number),
                KeyRule::optional("num_warmup_steps", KeyType::Integer),
                KeyRule::optional("pretrain_mel_steps", KeyType::Integer),
                KeyRule::optional("decay_mel_coeff", KeyType::Bool),
                KeyRule::optional("evaluate_utmos", KeyType::Bool),
                KeyRule::optional("evaluate_pesq", KeyType::Bool),
                KeyRule::optional("evaluate_periodicty", KeyType::Bool),
                KeyRule::required("feature_extractor", KeyType::Mapping),
                KeyRule::required("backbone", KeyType::Mapping),
                KeyRule::required("head", KeyType::Mapping),
            ],
        ));

        registry.register(ComponentEntry::new(
            MEL_FEATURES,
            ComponentKind::FeatureExtractor,
            "Log-mel spectrogram front end",
            &[
                KeyRule::required("sample_rate", KeyType::Integer),
                KeyRule::required("n_fft", KeyType::Integer),
                KeyRule::required("hop_length", KeyType::Integer),
                KeyRule::required("n_mels", KeyType::Integer),
                KeyRule::optional("padding", KeyType::Padding),
            ],
        ));

        registry.register(ComponentEntry::new(
            COMPLEX_BACKBONE,
            ComponentKind::Backbone,
            "Complex-valued backbone with block-matrix computation",
            &[
                KeyRule::required("input_channels", KeyType::Integer),
                KeyRule::required("dim", KeyType::Integer),
                KeyRule::required("intermediate_dim", KeyType::Integer),
                KeyRule::required("num_layers", KeyType::Integer),
                KeyRule::optional("layer_scale_init_value", KeyType::Number),
                KeyRule::optional("block_size", KeyType::Integer),
            ],
        ));

        registry.register(ComponentEntry::new(
            COMPLEX_ISTFT_HEAD,
            ComponentKind::Head,
            "Complex iSTFT head with phase quantization",
            &[
                KeyRule::required("dim", KeyType::Integer),
                KeyRule::required("n_fft", KeyType::Integer),
                KeyRule::required("hop_length", KeyType::Integer),
                KeyRule::optional("padding", KeyType::Padding),
                KeyRule::optional("phase_levels", KeyType::Integer),
            ],
        ));

        registry.register(ComponentEntry::new(
            GRAD_NORM_CALLBACK,
            ComponentKind::Callback,
            "Logs the generator/discriminator gradient norms",
            &[],
        ));

        for prefix in FRAMEWORK_PREFIXES {
            registry.register(ComponentEntry::new(
                format!("{prefix}.loggers.TensorBoardLogger"),
                ComponentKind::Logger,
                "TensorBoard event logger",
                &[
                    KeyRule::required("save_dir", KeyType::String),
                    KeyRule::optional("name", KeyType::String),
                    KeyRule::optional("version", KeyType::String),
                ],
            ));
            registry.register(ComponentEntry::new(
                format!("{prefix}.loggers.CSVLogger"),
                ComponentKind::Logger,
                "CSV metrics logger",
                &[
                    KeyRule::required("save_dir", KeyType::String),
                    KeyRule::optional("name", KeyType::String),
                ],
            ));
            registry.register(ComponentEntry::new(
                format!("{prefix}.callbacks.LearningRateMonitor"),
                ComponentKind::Callback,
                "Logs the learning rate of each optimizer",
                &[KeyRule::optional("logging_interval", KeyType::String)],
            ));
            registry.register(ComponentEntry::new(
                format!("{prefix}.callbacks.ModelSummary"),
                ComponentKind::Callback,
                "Prints a layer summary at fit start",
                &[KeyRule::optional("max_depth", KeyType::Integer)],
            ));
            registry.register(ComponentEntry::new(
                format!("{prefix}.callbacks.ModelCheckpoint"),
                ComponentKind::Callback,
                "Checkpoint policy: what to monitor and how many checkpoints to keep",
                &[
                    KeyRule::optional("monitor", KeyType::String),
                    KeyRule::optional("filename", KeyType::String),
                    KeyRule::optional("save_top_k", KeyType::Integer),
                    KeyRule::optional("save_last", KeyType::Bool),
                    KeyRule::optional("mode", KeyType::String),
                    KeyRule::optional("every_n_train_steps", KeyType::Integer),
                ],
            ));
        }

        registry
    }

    /// Register a component, replacing any previous entry for the same class path.
    pub fn register(&mut self, entry: ComponentEntry) {
        self.entries.insert(entry.class_path.clone(), entry);
    }

    pub fn lookup(&self, class_path: &str) -> Option<&ComponentEntry> {
        self.entries.get(class_path)
    }

    pub fn kind_of(&self, class_path: &str) -> Option<ComponentKind> {
        self.lookup(class_path).map(|e| e.kind)
    }

    /// All entries, sorted by class path.
    pub fn entries(&self) -> Vec<&ComponentEntry> {
        let mut entries: Vec<&ComponentEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.class_path.cmp(&b.class_path));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds() {
        let registry = ClassPathRegistry::builtin();
        assert_eq!(registry.kind_of(VOCODER_EXP), Some(ComponentKind::Model));
        assert_eq!(
            registry.kind_of(MEL_FEATURES),
            Some(ComponentKind::FeatureExtractor)
        );
        assert_eq!(
            registry.kind_of("pytorch_lightning.callbacks.ModelCheckpoint"),
            Some(ComponentKind::Callback)
        );
        assert_eq!(
            registry.kind_of("lightning.pytorch.loggers.TensorBoardLogger"),
            Some(ComponentKind::Logger)
        );
        assert_eq!(registry.kind_of("my.project.CustomHead"), None);
    }

    #[test]
    fn test_data_module_rules_cover_both_splits() {
        let registry = ClassPathRegistry::builtin();
        let entry = registry.lookup(DATA_MODULE).unwrap();
        let keys: Vec<&str> = entry.rules.iter().map(|r| r.key.as_ref()).collect();
        assert!(keys.contains(&"train_params.batch_size"));
        assert!(keys.contains(&"val_params.filelist_path"));
        assert_eq!(keys.len(), 12);
    }

    #[test]
    fn test_register_replaces_and_sorts() {
        let mut registry = ClassPathRegistry::new();
        assert!(registry.is_empty());
        registry.register(ComponentEntry::new("b.Head", ComponentKind::Head, "", &[]));
        registry.register(ComponentEntry::new("a.Model", ComponentKind::Model, "", &[]));
        registry.register(ComponentEntry::new(
            "b.Head",
            ComponentKind::Backbone,
            "replaced",
            &[],
        ));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.kind_of("b.Head"), Some(ComponentKind::Backbone));
        let order: Vec<&str> = registry
            .entries()
            .iter()
            .map(|e| e.class_path.as_str())
            .collect();
        assert_eq!(order, vec!["a.Model", "b.Head"]);
    }
}
