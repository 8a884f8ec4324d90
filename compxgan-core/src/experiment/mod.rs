//! Experiment documents: schema, parsing, validation.

pub mod parser;
pub mod schema;
pub mod validate;

pub use parser::{LoadedExperiment, apply_override, load_experiment, parse_document};
pub use schema::{ComponentSpec, ExperimentConfig, SeedSetting, TrainerConfig};
pub use validate::{Issue, Severity, ValidationOptions, ValidationReport, validate_document};
