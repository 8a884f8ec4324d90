//! CompxGAN CLI: validate vocoder experiments and launch the external framework.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// CompxGAN: configuration-driven training and inference for a complex-valued vocoder
#[derive(Parser, Debug)]
#[command(name = "compxgan", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (run records, settings, relative paths)
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by `train` and `infer`.
#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Experiment configuration (YAML)
    #[arg(short, long)]
    config: PathBuf,

    /// Override a configuration key, e.g. --set trainer.max_steps=1000
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Resolve and print the launch plan without writing or launching anything
    #[arg(long)]
    dry_run: bool,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Validate an experiment and launch the training entry point
    Train {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Validate an experiment and launch the inference entry point
    Infer {
        #[command(flatten)]
        run: RunArgs,

        /// Audio file list, one path per line
        #[arg(short, long)]
        filelist: PathBuf,
    },
    /// Check an experiment configuration and report every issue
    Validate {
        /// Experiment configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Also check an inference file list
        #[arg(long)]
        filelist: Option<PathBuf>,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Override a configuration key before validating
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },
    /// Print the experiment document after overrides
    Show {
        /// Experiment configuration (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Override a configuration key
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
    },
    /// List the known component class paths
    Components,
    /// Inspect recorded runs
    Runs {
        #[command(subcommand)]
        action: RunsAction,
    },
    /// Manage harness settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum RunsAction {
    /// List runs, newest first
    List {
        /// Maximum number of runs to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Show one run record
    Show {
        /// Run id
        id: String,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum SettingsAction {
    /// Print the effective settings
    Show,
    /// Write default settings to .compxgan/config.toml
    Init,
}

fn init_tracing(verbose: u8, quiet: bool) -> WorkerGuard {
    let filter = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "compxgan", "compxgan")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "compxgan.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.quiet);

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    match commands::handle_command(cli.command, &workspace).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_flags() {
        let cli = Cli::try_parse_from([
            "compxgan",
            "train",
            "-c",
            "configs/compxgan.yaml",
            "--set",
            "trainer.max_steps=10",
            "--set",
            "trainer.devices=[0,1]",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Train { run } => {
                assert_eq!(run.config, PathBuf::from("configs/compxgan.yaml"));
                assert_eq!(run.overrides.len(), 2);
                assert!(run.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_infer_requires_filelist() {
        assert!(Cli::try_parse_from(["compxgan", "infer", "-c", "a.yaml"]).is_err());
        let cli =
            Cli::try_parse_from(["compxgan", "infer", "-c", "a.yaml", "-f", "test.txt"]).unwrap();
        assert!(matches!(cli.command, Commands::Infer { .. }));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["compxgan", "components", "-w", "/tmp", "-vv"]).unwrap();
        assert_eq!(cli.workspace, PathBuf::from("/tmp"));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_runs_subcommands() {
        let cli = Cli::try_parse_from(["compxgan", "runs", "show", "20260101-000000-abcd1234"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Runs {
                action: RunsAction::Show { .. }
            }
        ));
        let cli = Cli::try_parse_from(["compxgan", "runs", "list", "-n", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Runs {
                action: RunsAction::List { limit: 5 }
            }
        ));
    }

    #[test]
    fn test_missing_config_is_usage_error() {
        let err = Cli::try_parse_from(["compxgan", "train"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
