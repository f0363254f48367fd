//! stacklint CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use stacklint::{analyze_dir, render_text, Config};

/// Debug log sink installed by `--debug`.
const DEBUG_LOG_PATH: &str = "stacklint.log";

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable `path:line:col: message` lines.
    #[default]
    Text,
    /// Machine-readable JSON with byte spans and fixes.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "stacklint",
    version,
    about = "Finds unnecessary error wrapping with stack traces in Go code"
)]
struct Cli {
    /// Package directory to analyze.
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Full config as YAML text; overrides every other config source.
    #[arg(long = "yaml-config", value_name = "YAML")]
    yaml_config: Option<String>,

    /// Path to a YAML config file. Defaults to `.stacklint.yaml` in the
    /// target directory when present.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write debug logs to ./stacklint.log.
    #[arg(long)]
    debug: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(found_issues) => {
            if found_issues {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            eprintln!("stacklint: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<bool> {
    if cli.debug {
        let log_file = std::fs::File::create(DEBUG_LOG_PATH)
            .with_context(|| format!("creating {DEBUG_LOG_PATH}"))?;
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("stacklint=trace")),
            )
            .with_writer(std::sync::Mutex::new(log_file))
            .with_ansi(false)
            .init();
    }

    let config = load_config(cli)?;
    let report = analyze_dir(&cli.path, config)
        .with_context(|| format!("analyzing {}", cli.path.display()))?;

    match cli.format {
        OutputFormat::Text => {
            print!("{}", render_text(&report.diagnostics));
            if let Some(error) = &report.error {
                eprintln!("stacklint: {error}");
            }
        }
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "diagnostics": report.diagnostics,
                "error": report.error,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }

    if let Some(error) = &report.error {
        anyhow::bail!("analysis failed: {error}");
    }
    Ok(!report.diagnostics.is_empty())
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    if let Some(yaml) = &cli.yaml_config {
        return Ok(Config::from_yaml(yaml)?);
    }
    if let Some(path) = &cli.config {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        return Ok(Config::from_yaml(&text)?);
    }
    let local = cli.path.join(".stacklint.yaml");
    if local.is_file() {
        let text = std::fs::read_to_string(&local)
            .with_context(|| format!("reading config {}", local.display()))?;
        return Ok(Config::from_yaml(&text)?);
    }
    Ok(Config::default())
}
