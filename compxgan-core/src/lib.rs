//! # compxgan-core: experiment harness for the CompxGAN vocoder
//!
//! The vocoder itself (complex-valued generator, complex multi-resolution discriminator,
//! phase quantization, block-matrix computation) runs inside an external deep-learning
//! framework. This crate is everything in front of it:
//!
//! 1. **Experiment documents**: typed schema, YAML parsing, dotted overrides
//! 2. **Validation**: key/type checks, class-path registry, cross-field consistency
//! 3. **Runs**: seed resolution, run records, launching and supervising the framework

// Foundation
pub mod config;
pub mod error;
pub mod persistence;

// Experiment documents
pub mod experiment;
pub mod filelist;
pub mod registry;

// Runs
pub mod training;

pub use config::{HarnessSettings, load_settings};
pub use error::HarnessError;
pub use experiment::{ExperimentConfig, LoadedExperiment, ValidationReport, load_experiment};
pub use registry::{ClassPathRegistry, ComponentKind};
pub use training::{Launcher, RunMode, RunRecord, RunStore};
