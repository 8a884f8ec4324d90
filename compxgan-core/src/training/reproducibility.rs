//! Reproducibility tracking: seed resolution, environment snapshots.

use crate::error::HarnessError;
use crate::experiment::schema::SeedSetting;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use sha2::{Digest, Sha256};

/// Environment variables that change what the external framework does.
const TRACKED_ENV_VARS: [&str; 4] = ["PATH", "PYTHONPATH", "CUDA_VISIBLE_DEVICES", "VIRTUAL_ENV"];

/// Snapshot of the launch environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub platform: String,
    pub arch: String,
    pub harness_version: String,
    pub timestamp: DateTime<Utc>,
    /// Hash of the tracked environment variables.
    pub env_vars_hash: String,
}

impl EnvironmentSnapshot {
    pub fn capture() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            harness_version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            env_vars_hash: Self::compute_env_vars_hash(),
        }
    }

    fn compute_env_vars_hash() -> String {
        let mut hasher = Sha256::new();
        for var in TRACKED_ENV_VARS {
            let value = std::env::var(var).unwrap_or_default();
            hasher.update(var.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

/// A concrete seed for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSeed {
    pub value: u32,
    /// Whether the harness drew the seed (`seed_everything: true`).
    pub drawn: bool,
}

/// Turn `seed_everything` into a concrete seed, drawing one when asked to.
pub fn resolve_seed(setting: SeedSetting) -> Result<Option<ResolvedSeed>, HarnessError> {
    match setting {
        SeedSetting::Fixed(v) => {
            let value = u32::try_from(v).map_err(|_| {
                HarnessError::config(format!(
                    "seed_everything {v} is outside the range 0..={}",
                    u32::MAX
                ))
            })?;
            Ok(Some(ResolvedSeed {
                value,
                drawn: false,
            }))
        }
        SeedSetting::Random => Ok(Some(ResolvedSeed {
            value: rand::random::<u32>(),
            drawn: true,
        })),
        SeedSetting::Disabled => Ok(None),
    }
}

impl SeedSetting {
    pub fn resolve(self) -> Result<Option<ResolvedSeed>, HarnessError> {
        resolve_seed(self)
    }
}

/// Write the resolved seed back into the document so the run can be replayed from its
/// resolved config alone.
pub fn pin_seed(document: &mut Value, seed: &ResolvedSeed) {
    if let Value::Mapping(map) = document {
        map.insert(
            Value::String("seed_everything".to_string()),
            Value::Number(u64::from(seed.value).into()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_seed_is_kept() {
        let seed = resolve_seed(SeedSetting::Fixed(4444)).unwrap().unwrap();
        assert_eq!(seed.value, 4444);
        assert!(!seed.drawn);
    }

    #[test]
    fn test_random_seed_is_drawn() {
        let seed = resolve_seed(SeedSetting::Random).unwrap().unwrap();
        assert!(seed.drawn);
    }

    #[test]
    fn test_disabled_seed() {
        assert!(resolve_seed(SeedSetting::Disabled).unwrap().is_none());
    }

    #[test]
    fn test_out_of_range_seed() {
        assert!(resolve_seed(SeedSetting::Fixed(-1)).is_err());
        assert!(resolve_seed(SeedSetting::Fixed(i64::from(u32::MAX) + 1)).is_err());
    }

    #[test]
    fn test_pin_seed_overwrites_flag() {
        let mut doc: Value = serde_yaml::from_str("seed_everything: true\nmodel: {}\n").unwrap();
        pin_seed(
            &mut doc,
            &ResolvedSeed {
                value: 17,
                drawn: true,
            },
        );
        assert_eq!(doc.get("seed_everything").and_then(Value::as_u64), Some(17));
    }

    #[test]
    fn test_snapshot_hash_is_stable() {
        let a = EnvironmentSnapshot::capture();
        let b = EnvironmentSnapshot::capture();
        assert_eq!(a.env_vars_hash, b.env_vars_hash);
        assert_eq!(a.env_vars_hash.len(), 64);
    }
}
