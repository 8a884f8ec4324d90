//! Experiment document loading: YAML parsing, dotted overrides, and validation.

use crate::error::HarnessError;
use crate::experiment::schema::ExperimentConfig;
use crate::experiment::validate::{
    ValidationOptions, ValidationReport, validate_document, value_kind,
};
use crate::registry::ClassPathRegistry;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A validated experiment document.
#[derive(Debug, Clone)]
pub struct LoadedExperiment {
    /// File the document was read from.
    pub source: PathBuf,
    /// Raw tree after overrides. This is what gets handed to the external framework, so keys
    /// the typed view does not model survive.
    pub document: Value,
    /// Typed view of `document`.
    pub config: ExperimentConfig,
    /// Warnings (and, in non-strict mode, nothing worse) found during validation.
    pub report: ValidationReport,
}

/// Parse a YAML document. Merge keys (`<<: *anchor`) are expanded.
pub fn parse_document(text: &str) -> Result<Value, HarnessError> {
    let mut value: Value =
        serde_yaml::from_str(text).map_err(|e| HarnessError::parse(e.to_string()))?;
    value
        .apply_merge()
        .map_err(|e| HarnessError::parse(e.to_string()))?;
    match value {
        Value::Mapping(_) => Ok(value),
        Value::Null => Err(HarnessError::parse("document is empty")),
        other => Err(HarnessError::parse(format!(
            "document root must be a mapping, found {}",
            value_kind(&other)
        ))),
    }
}

/// Serialise a document back to YAML.
pub fn render_document(document: &Value) -> Result<String, HarnessError> {
    Ok(serde_yaml::to_string(document)?)
}

fn parse_index(segment: &str, len: usize, assignment: &str) -> Result<usize, HarnessError> {
    let idx: usize = segment.parse().map_err(|_| {
        HarnessError::invalid_override(assignment, format!("'{segment}' is not a sequence index"))
    })?;
    if idx >= len {
        return Err(HarnessError::invalid_override(
            assignment,
            format!("index {idx} is out of bounds for a sequence of {len}"),
        ));
    }
    Ok(idx)
}

/// Apply a `dotted.key=value` override.
///
/// The value is read as YAML, so `trainer.max_steps=1000` sets an integer and
/// `trainer.devices=[0,1]` a sequence; anything that fails to parse is kept as a string.
/// Missing intermediate mappings are created. Numeric segments index into existing sequences.
pub fn apply_override(document: &mut Value, assignment: &str) -> Result<(), HarnessError> {
    let (key, raw) = assignment
        .split_once('=')
        .ok_or_else(|| HarnessError::invalid_override(assignment, "expected key=value"))?;
    let key = key.trim();
    let segments: Vec<&str> = key.split('.').collect();
    if key.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(HarnessError::invalid_override(assignment, "empty key segment"));
    }

    let raw = raw.trim();
    let value = if raw.is_empty() {
        Value::String(String::new())
    } else {
        serde_yaml::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    };

    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| HarnessError::invalid_override(assignment, "empty key"))?;

    let mut node = document;
    for (depth, segment) in parents.iter().enumerate() {
        if node.is_null() {
            *node = Value::Mapping(Mapping::new());
        }
        node = match node {
            Value::Mapping(map) => map
                .entry(Value::String((*segment).to_string()))
                .or_insert(Value::Mapping(Mapping::new())),
            Value::Sequence(items) => {
                let idx = parse_index(segment, items.len(), assignment)?;
                &mut items[idx]
            }
            other => {
                return Err(HarnessError::invalid_override(
                    assignment,
                    format!(
                        "'{}' is not a mapping (found {})",
                        segments[..depth].join("."),
                        value_kind(other)
                    ),
                ));
            }
        };
    }

    if node.is_null() {
        *node = Value::Mapping(Mapping::new());
    }
    match node {
        Value::Mapping(map) => {
            map.insert(Value::String((*last).to_string()), value);
        }
        Value::Sequence(items) => {
            let idx = parse_index(last, items.len(), assignment)?;
            items[idx] = value;
        }
        other => {
            return Err(HarnessError::invalid_override(
                assignment,
                format!(
                    "'{}' is not a mapping (found {})",
                    parents.join("."),
                    value_kind(other)
                ),
            ));
        }
    }
    Ok(())
}

/// Read, override, validate, and decode an experiment document.
pub fn load_experiment(
    path: &Path,
    overrides: &[String],
    registry: &ClassPathRegistry,
    options: &ValidationOptions,
) -> Result<LoadedExperiment, HarnessError> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            HarnessError::not_found(format!("experiment config {}", path.display()))
        }
        _ => HarnessError::Io(e),
    })?;

    let mut document = parse_document(&text)?;
    for assignment in overrides {
        apply_override(&mut document, assignment)?;
        debug!(%assignment, "Applied override");
    }

    let report = validate_document(&document, registry, options);
    if report.has_errors() {
        return Err(HarnessError::Validation(report));
    }
    for issue in report.warnings() {
        warn!(path = %issue.path, "{}", issue.message);
    }

    let config = ExperimentConfig::from_value(document.clone())?;
    debug!(
        source = %path.display(),
        model = %config.model.class_path,
        "Loaded experiment"
    );

    Ok(LoadedExperiment {
        source: path.to_path_buf(),
        document,
        config,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::validate::lookup;

    #[test]
    fn test_parse_rejects_non_mapping_roots() {
        assert!(parse_document("").is_err());
        assert!(parse_document("- a\n- b\n").is_err());
        assert!(parse_document("just a string").is_err());
        assert!(parse_document("a: 1").is_ok());
    }

    #[test]
    fn test_parse_expands_merge_keys() {
        let doc = parse_document(
            r#"
defaults: &split
  sampling_rate: 24000
  batch_size: 16
train:
  <<: *split
  num_samples: 16384
"#,
        )
        .unwrap();
        assert_eq!(
            lookup(&doc, "train.batch_size"),
            Some(&Value::Number(16.into()))
        );
    }

    #[test]
    fn test_override_sets_typed_values() {
        let mut doc = parse_document("trainer:\n  max_steps: 10\n").unwrap();
        apply_override(&mut doc, "trainer.max_steps=2000").unwrap();
        apply_override(&mut doc, "trainer.devices=[0, 1]").unwrap();
        apply_override(&mut doc, "trainer.accelerator = cpu").unwrap();
        assert_eq!(
            lookup(&doc, "trainer.max_steps"),
            Some(&Value::Number(2000.into()))
        );
        assert!(lookup(&doc, "trainer.devices").unwrap().is_sequence());
        assert_eq!(
            lookup(&doc, "trainer.accelerator").and_then(Value::as_str),
            Some("cpu")
        );
    }

    #[test]
    fn test_override_creates_intermediate_mappings() {
        let mut doc = parse_document("a: 1").unwrap();
        apply_override(&mut doc, "model.init_args.head.init_args.phase_levels=16").unwrap();
        assert_eq!(
            lookup(&doc, "model.init_args.head.init_args.phase_levels"),
            Some(&Value::Number(16.into()))
        );
    }

    #[test]
    fn test_override_indexes_sequences() {
        let mut doc =
            parse_document("trainer:\n  callbacks:\n    - class_path: a.B\n").unwrap();
        apply_override(&mut doc, "trainer.callbacks.0.init_args.max_depth=3").unwrap();
        assert_eq!(
            lookup(&doc, "trainer.callbacks.0.init_args.max_depth"),
            Some(&Value::Number(3.into()))
        );
        assert!(apply_override(&mut doc, "trainer.callbacks.5.class_path=x").is_err());
    }

    #[test]
    fn test_override_errors() {
        let mut doc = parse_document("trainer:\n  max_steps: 10\n").unwrap();
        assert!(apply_override(&mut doc, "no_equals_sign").is_err());
        assert!(apply_override(&mut doc, "=5").is_err());
        assert!(apply_override(&mut doc, "trainer..x=5").is_err());
        let err = apply_override(&mut doc, "trainer.max_steps.inner=5").unwrap_err();
        assert!(err.to_string().contains("trainer.max_steps"));
    }

    #[test]
    fn test_override_unparseable_value_is_string() {
        let mut doc = parse_document("a: 1").unwrap();
        apply_override(&mut doc, "name=compxgan_checkpoint_{epoch}_{step}").unwrap();
        assert_eq!(
            lookup(&doc, "name").and_then(Value::as_str),
            Some("compxgan_checkpoint_{epoch}_{step}")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_experiment(
            Path::new("/definitely/not/here.yaml"),
            &[],
            &ClassPathRegistry::builtin(),
            &ValidationOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, HarnessError::NotFound(_)));
    }
}
