//! Harness settings.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Settings are loaded from `~/.config/compxgan/config.toml` and/or `.compxgan/config.toml`
//! in the workspace directory. These settings describe how the external training framework is
//! invoked; the experiment itself lives in a separate YAML document (see [`crate::experiment`]).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level harness settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessSettings {
    /// Interpreter used to run the external framework.
    #[serde(default)]
    pub runtime: RuntimeSettings,
    /// Entry points and their flags.
    #[serde(default)]
    pub entrypoints: EntrypointSettings,
    /// Where run records are written.
    #[serde(default)]
    pub runs: RunSettings,
    /// Validation behaviour.
    #[serde(default)]
    pub validation: ValidationSettings,
}

/// Interpreter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Interpreter executable.
    #[serde(default = "default_python_path")]
    pub python_path: PathBuf,
    /// Virtual environment; when set, its interpreter takes precedence over `python_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venv_path: Option<PathBuf>,
    /// Wall-clock limit for a launched run in seconds. `0` disables the limit.
    #[serde(default)]
    pub timeout_secs: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            python_path: default_python_path(),
            venv_path: None,
            timeout_secs: 0,
        }
    }
}

impl RuntimeSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// The interpreter to spawn, accounting for a configured venv.
    pub fn interpreter(&self) -> PathBuf {
        match &self.venv_path {
            Some(venv) => {
                let bin_dir = if cfg!(windows) { "Scripts" } else { "bin" };
                venv.join(bin_dir).join("python")
            }
            None => self.python_path.clone(),
        }
    }
}

fn default_python_path() -> PathBuf {
    PathBuf::from("python3")
}

/// Training and inference entry points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrypointSettings {
    #[serde(default = "default_train_script")]
    pub train_script: PathBuf,
    #[serde(default = "default_infer_script")]
    pub infer_script: PathBuf,
    /// Flag that precedes the configuration path.
    #[serde(default = "default_config_flag")]
    pub config_flag: String,
    /// Flag that precedes the file-list path (inference only).
    #[serde(default = "default_filelist_flag")]
    pub filelist_flag: String,
    /// Appended verbatim after the harness-generated arguments.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for EntrypointSettings {
    fn default() -> Self {
        Self {
            train_script: default_train_script(),
            infer_script: default_infer_script(),
            config_flag: default_config_flag(),
            filelist_flag: default_filelist_flag(),
            extra_args: Vec::new(),
        }
    }
}

fn default_train_script() -> PathBuf {
    PathBuf::from("train.py")
}

fn default_infer_script() -> PathBuf {
    PathBuf::from("infer.py")
}

fn default_config_flag() -> String {
    "--config".to_string()
}

fn default_filelist_flag() -> String {
    "--filelist".to_string()
}

/// Run record storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Relative paths resolve against the workspace.
    #[serde(default = "default_runs_dir")]
    pub dir: PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            dir: default_runs_dir(),
        }
    }
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from(".compxgan/runs")
}

impl RunSettings {
    pub fn resolve(&self, workspace: &Path) -> PathBuf {
        if self.dir.is_absolute() {
            self.dir.clone()
        } else {
            workspace.join(&self.dir)
        }
    }
}

/// Validation behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Treat warnings as errors.
    #[serde(default)]
    pub strict: bool,
    /// Check that the train/val file lists named in the data module exist.
    #[serde(default = "default_true")]
    pub check_filelists: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            strict: false,
            check_filelists: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "compxgan", "compxgan")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Workspace-local settings file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".compxgan").join("config.toml")
}

/// Load settings from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `COMPXGAN_`)
/// 3. Workspace-local config (`.compxgan/config.toml`)
/// 4. User config (`~/.config/compxgan/config.toml`)
/// 5. Built-in defaults
pub fn load_settings(
    workspace: Option<&Path>,
    overrides: Option<&HarnessSettings>,
) -> Result<HarnessSettings, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(HarnessSettings::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // COMPXGAN_RUNTIME__PYTHON_PATH, COMPXGAN_VALIDATION__STRICT, etc.
    figment = figment.merge(Env::prefixed("COMPXGAN_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Whether any settings file exists (user-level or workspace-level).
pub fn settings_exist(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = HarnessSettings::default();
        assert_eq!(settings.runtime.python_path, PathBuf::from("python3"));
        assert_eq!(settings.entrypoints.train_script, PathBuf::from("train.py"));
        assert_eq!(settings.entrypoints.config_flag, "--config");
        assert_eq!(settings.entrypoints.filelist_flag, "--filelist");
        assert!(settings.validation.check_filelists);
        assert!(!settings.validation.strict);
        assert!(settings.runtime.timeout().is_none());
    }

    #[test]
    fn test_interpreter_prefers_venv() {
        let runtime = RuntimeSettings {
            venv_path: Some(PathBuf::from("/opt/venv")),
            ..Default::default()
        };
        let interp = runtime.interpreter();
        assert!(interp.starts_with("/opt/venv"));
        assert!(interp.ends_with("python"));
    }

    #[test]
    fn test_settings_toml_roundtrip() {
        let settings = HarnessSettings::default();
        let toml_str = toml::to_string(&settings).unwrap();
        let parsed: HarnessSettings = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.entrypoints.infer_script, settings.entrypoints.infer_script);
        assert_eq!(parsed.runs.dir, settings.runs.dir);
    }

    #[test]
    fn test_load_settings_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_dir = dir.path().join(".compxgan");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            r#"
[runtime]
python_path = "/usr/bin/python3.11"
timeout_secs = 60

[entrypoints]
config_flag = "-c"
extra_args = ["--trainer.fast_dev_run", "true"]
"#,
        )
        .unwrap();

        let settings = load_settings(Some(dir.path()), None).unwrap();
        assert_eq!(
            settings.runtime.python_path,
            PathBuf::from("/usr/bin/python3.11")
        );
        assert_eq!(settings.runtime.timeout(), Some(Duration::from_secs(60)));
        assert_eq!(settings.entrypoints.config_flag, "-c");
        assert_eq!(settings.entrypoints.extra_args.len(), 2);
        // Untouched sections keep their defaults.
        assert_eq!(settings.entrypoints.filelist_flag, "--filelist");
        assert!(settings_exist(Some(dir.path())));
    }

    #[test]
    fn test_load_settings_env_layer() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("COMPXGAN_VALIDATION__STRICT", "true");
            jail.set_env("COMPXGAN_RUNTIME__TIMEOUT_SECS", "5");
            let settings = load_settings(None, None).expect("settings");
            assert!(settings.validation.strict);
            assert_eq!(settings.runtime.timeout_secs, 5);
            Ok(())
        });
    }

    #[test]
    fn test_load_settings_with_overrides() {
        let mut overrides = HarnessSettings::default();
        overrides.entrypoints.train_script = PathBuf::from("scripts/fit.py");
        let settings = load_settings(None, Some(&overrides)).unwrap();
        assert_eq!(
            settings.entrypoints.train_script,
            PathBuf::from("scripts/fit.py")
        );
    }

    #[test]
    fn test_runs_dir_resolution() {
        let runs = RunSettings::default();
        let resolved = runs.resolve(Path::new("/work"));
        assert_eq!(resolved, PathBuf::from("/work/.compxgan/runs"));

        let absolute = RunSettings {
            dir: PathBuf::from("/var/runs"),
        };
        assert_eq!(absolute.resolve(Path::new("/work")), PathBuf::from("/var/runs"));
    }
}
