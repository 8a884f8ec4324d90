//! CLI subcommand handlers.
//!
//! Each handler returns the process exit code on success. Errors bubble up to `main`, which
//! prints them and exits with 1.

use crate::{Commands, RunArgs, RunsAction, SettingsAction};
use anyhow::Context;
use compxgan_core::config::{HarnessSettings, load_settings, workspace_config_path};
use compxgan_core::experiment::parser::{apply_override, parse_document, render_document};
use compxgan_core::experiment::validate::{ValidationOptions, validate_document};
use compxgan_core::filelist::read_filelist;
use compxgan_core::training::session::validation_options;
use compxgan_core::training::{
    Launcher, RunMode, RunRequest, RunStore, execute_run, prepare_run,
};
use compxgan_core::{ClassPathRegistry, load_experiment};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<u8> {
    match command {
        Commands::Train { run } => handle_run(RunMode::Train, run, None, workspace).await,
        Commands::Infer { run, filelist } => {
            handle_run(RunMode::Infer, run, Some(filelist), workspace).await
        }
        Commands::Validate {
            config,
            filelist,
            strict,
            json,
            overrides,
        } => handle_validate(&config, filelist.as_deref(), strict, json, &overrides, workspace),
        Commands::Show { config, overrides } => handle_show(&config, &overrides, workspace),
        Commands::Components => handle_components(),
        Commands::Runs { action } => handle_runs(action, workspace),
        Commands::Settings { action } => handle_settings(action, workspace),
    }
}

fn settings(workspace: &Path) -> anyhow::Result<HarnessSettings> {
    let settings = load_settings(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load settings: {}", e))?;
    debug!(
        workspace = %workspace.display(),
        python = %settings.runtime.interpreter().display(),
        "Loaded settings"
    );
    Ok(settings)
}

fn resolve(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

/// Clamp a child exit code into the range a process can return.
fn exit_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

async fn handle_run(
    mode: RunMode,
    args: RunArgs,
    filelist: Option<PathBuf>,
    workspace: &Path,
) -> anyhow::Result<u8> {
    let settings = settings(workspace)?;
    let registry = ClassPathRegistry::builtin();
    let launcher = Launcher::new(&settings, workspace);
    let store = RunStore::new(settings.runs.resolve(workspace));

    let request = RunRequest {
        mode,
        config: args.config,
        filelist,
        overrides: args.overrides,
        dry_run: args.dry_run,
    };
    let prepared = prepare_run(&request, &settings, &registry, &launcher, &store)?;

    if let Some(seed) = prepared.seed {
        let origin = if seed.drawn { "drawn" } else { "fixed" };
        println!("Seed: {} ({origin})", seed.value);
    }
    if let Some(report) = &prepared.filelist {
        println!("File list: {} of {} entries found", report.found(), report.total);
    }

    if request.dry_run {
        println!("Would run: {}", prepared.plan);
        println!("Resolved config ({}):", prepared.record.resolved_config_path.display());
        print!("{}", prepared.rendered);
        return Ok(0);
    }

    println!(
        "Run {} -> {}",
        prepared.record.id,
        store.run_dir(&prepared.record.id).display()
    );
    let (record, outcome) = execute_run(prepared, &launcher, &store).await?;
    println!(
        "Run {} {} after {:.1}s{}",
        record.id,
        record.status,
        outcome.duration.as_secs_f64(),
        outcome
            .exit_code
            .map(|c| format!(" (exit code {c})"))
            .unwrap_or_default()
    );
    Ok(exit_byte(outcome.process_exit_code()))
}

fn handle_validate(
    config: &Path,
    filelist: Option<&Path>,
    strict: bool,
    json: bool,
    overrides: &[String],
    workspace: &Path,
) -> anyhow::Result<u8> {
    let settings = settings(workspace)?;
    let registry = ClassPathRegistry::builtin();
    let options = ValidationOptions {
        strict: strict || settings.validation.strict,
        ..validation_options(&settings, workspace)
    };

    let config_path = resolve(workspace, config);
    let text = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    let mut document = parse_document(&text)?;
    for assignment in overrides {
        apply_override(&mut document, assignment)?;
    }
    let mut report = validate_document(&document, &registry, &options);

    let filelist_report = match filelist {
        Some(path) => {
            let list = read_filelist(&resolve(workspace, path))?;
            let checked = list.check(workspace);
            if list.is_empty() {
                report.error("filelist", format!("{} has no entries", path.display()));
            } else if !checked.is_complete() {
                report.warning(
                    "filelist",
                    format!(
                        "{} of {} entries do not exist",
                        checked.missing.len(),
                        checked.total
                    ),
                );
            }
            Some(checked)
        }
        None => None,
    };
    if options.strict {
        report.promote_warnings();
    }

    let valid = !report.has_errors();
    if json {
        let out = serde_json::json!({
            "config": config_path,
            "valid": valid,
            "strict": options.strict,
            "issues": report.issues,
            "filelist": filelist_report,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if report.is_clean() {
        println!("{}: ok", config_path.display());
    } else {
        println!(
            "{}: {} error(s), {} warning(s)",
            config_path.display(),
            report.errors().count(),
            report.warnings().count()
        );
        println!("{report}");
    }

    Ok(if valid { 0 } else { 1 })
}

fn handle_show(config: &Path, overrides: &[String], workspace: &Path) -> anyhow::Result<u8> {
    let settings = settings(workspace)?;
    let loaded = load_experiment(
        &resolve(workspace, config),
        overrides,
        &ClassPathRegistry::builtin(),
        &validation_options(&settings, workspace),
    )?;
    print!("{}", render_document(&loaded.document)?);
    Ok(0)
}

fn handle_components() -> anyhow::Result<u8> {
    let registry = ClassPathRegistry::builtin();
    println!("Registered components ({}):", registry.len());
    for entry in registry.entries() {
        println!(
            "  {:<50} {:<18} {}",
            entry.class_path,
            entry.kind.to_string(),
            entry.description
        );
    }
    Ok(0)
}

fn handle_runs(action: RunsAction, workspace: &Path) -> anyhow::Result<u8> {
    let settings = settings(workspace)?;
    let store = RunStore::new(settings.runs.resolve(workspace));

    match action {
        RunsAction::List { limit } => {
            let runs = store.list()?;
            if runs.is_empty() {
                println!("No runs recorded in {}", store.root().display());
                return Ok(0);
            }
            println!("Runs ({} of {}):", runs.len().min(limit), runs.len());
            for run in runs.iter().take(limit) {
                println!(
                    "  {}  {:<5}  {:<9}  {:>4}  {}",
                    run.id,
                    run.mode.to_string(),
                    run.status.to_string(),
                    run.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".into()),
                    run.config_path.display()
                );
            }
            Ok(0)
        }
        RunsAction::Show { id } => {
            let record = store.load(&id)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(0)
        }
    }
}

fn handle_settings(action: SettingsAction, workspace: &Path) -> anyhow::Result<u8> {
    match action {
        SettingsAction::Init => {
            let path = workspace_config_path(workspace);
            if path.exists() {
                println!("Settings file already exists at: {}", path.display());
                return Ok(0);
            }
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let toml_str = toml::to_string_pretty(&HarnessSettings::default())?;
            std::fs::write(&path, &toml_str)?;
            println!("Created default settings at: {}", path.display());
            Ok(0)
        }
        SettingsAction::Show => {
            let settings = settings(workspace)?;
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn reference_config() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/compxgan.yaml")
    }

    /// Run `f` with a scratch workspace and no user-level settings file in reach.
    fn in_jail(f: impl FnOnce(&Path)) {
        figment::Jail::expect_with(|jail| {
            let root = jail.directory().to_path_buf();
            jail.set_env("HOME", root.display());
            jail.set_env("XDG_CONFIG_HOME", root.join(".config").display());
            f(&root);
            Ok(())
        });
    }

    #[test]
    fn test_exit_byte() {
        assert_eq!(exit_byte(0), 0);
        assert_eq!(exit_byte(124), 124);
        assert_eq!(exit_byte(-9), 1);
        assert_eq!(exit_byte(300), 1);
    }

    #[test]
    fn test_validate_reference_config() {
        in_jail(|ws| {
            let code = handle_validate(&reference_config(), None, false, true, &[], ws).unwrap();
            assert_eq!(code, 0);
        });
    }

    #[test]
    fn test_validate_strict_fails_on_missing_filelists() {
        in_jail(|ws| {
            let code = handle_validate(&reference_config(), None, true, false, &[], ws).unwrap();
            assert_eq!(code, 1);
        });
    }

    #[test]
    fn test_validate_broken_override() {
        in_jail(|ws| {
            let code = handle_validate(
                &reference_config(),
                None,
                false,
                false,
                &["trainer.max_steps=lots".to_string()],
                ws,
            )
            .unwrap();
            assert_eq!(code, 1);
        });
    }

    #[test]
    fn test_settings_default_without_user_file() {
        in_jail(|ws| {
            let settings = settings(ws).unwrap();
            assert_eq!(settings.runtime.timeout_secs, 0);
            assert!(!compxgan_core::config::settings_exist(Some(ws)));
        });
    }

    #[test]
    fn test_settings_init_then_show() {
        in_jail(|ws| {
            assert_eq!(handle_settings(SettingsAction::Init, ws).unwrap(), 0);
            let written = std::fs::read_to_string(workspace_config_path(ws)).unwrap();
            let parsed: HarnessSettings = toml::from_str(&written).unwrap();
            assert_eq!(parsed.entrypoints.config_flag, "--config");
            assert_eq!(handle_settings(SettingsAction::Show, ws).unwrap(), 0);
        });
    }

    #[test]
    fn test_train_dry_run_records_nothing() {
        in_jail(|ws| {
            let args = RunArgs {
                config: reference_config(),
                overrides: vec!["trainer.max_steps=100".into()],
                dry_run: true,
            };
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let code = runtime
                .block_on(handle_run(RunMode::Train, args, None, ws))
                .unwrap();
            assert_eq!(code, 0);
            assert_eq!(handle_runs(RunsAction::List { limit: 10 }, ws).unwrap(), 0);
            assert!(!ws.join(".compxgan/runs").exists());
        });
    }

    #[test]
    fn test_unknown_run() {
        in_jail(|ws| {
            let action = RunsAction::Show {
                id: "missing".into(),
            };
            assert!(handle_runs(action, ws).is_err());
        });
    }
}
