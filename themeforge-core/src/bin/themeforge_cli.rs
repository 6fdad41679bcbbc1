//! ThemeForge CLI - build and verify theme bundles
//!
//! Commands: build, check, list, inspect
//! Outputs JSON to stdout, diagnostics to stderr
//! Returns 1 on any error, 2 when `check` finds a stale artifact

use clap::{ArgAction, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use themeforge_core::{decode, sha256_hex, BuildConfig, BuildError, BuildPipeline};

#[derive(Parser)]
#[command(name = "themeforge-cli")]
#[command(about = "ThemeForge CLI - Deterministic Theme Bundle Compiler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON config file (CLI flags override its values)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Theme source directory
    #[arg(short, long, global = true)]
    source_dir: Option<PathBuf>,

    /// Bundle output path
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Manifest output path
    #[arg(short, long, global = true)]
    manifest: Option<PathBuf>,

    /// Parser threads
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile sources and write the bundle
    Build,

    /// Compile sources and compare against the existing bundle
    Check,

    /// List theme ids in a bundle
    List {
        /// Bundle file
        bundle: PathBuf,
    },

    /// Dump a bundle as JSON
    Inspect {
        /// Bundle file
        bundle: PathBuf,

        /// Only print this theme
        #[arg(short, long)]
        theme: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode, BuildError> {
    match &cli.command {
        Commands::Build => {
            let pipeline = BuildPipeline::new(resolve_config(cli)?);
            let report = pipeline.build()?;
            let output = serde_json::json!({
                "success": true,
                "output": report.output,
                "manifest": report.manifest,
                "themes": report.themes,
                "bytes": report.bytes,
                "sha256": report.sha256,
                "manifestSha256": report.manifest_sha256,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Check => {
            let pipeline = BuildPipeline::new(resolve_config(cli)?);
            let report = pipeline.check()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.up_to_date() {
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("error: {} is out of date", report.output.display());
                Ok(ExitCode::from(2))
            }
        }

        Commands::List { bundle } => {
            let bytes = read_bundle(bundle)?;
            let decoded = decode(&bytes)?;
            let ids: Vec<_> = decoded.ids().collect();
            println!("{}", serde_json::to_string_pretty(&ids)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Inspect { bundle, theme } => {
            let bytes = read_bundle(bundle)?;
            let decoded = decode(&bytes)?;
            let body = match theme {
                Some(id) => match decoded.get(id) {
                    Some(found) => serde_json::to_value(found)?,
                    None => {
                        eprintln!("error: no theme '{}' in {}", id, bundle.display());
                        return Ok(ExitCode::FAILURE);
                    }
                },
                None => serde_json::to_value(&decoded)?,
            };
            let output = serde_json::json!({
                "sha256": sha256_hex(&bytes),
                "bytes": bytes.len(),
                "bundle": body,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_config(cli: &Cli) -> Result<BuildConfig, BuildError> {
    let mut config = match &cli.config {
        Some(path) => BuildConfig::load(path)?,
        None => BuildConfig::default(),
    };

    if let Some(dir) = &cli.source_dir {
        config.source_dir = dir.clone();
    }
    if let Some(output) = &cli.output {
        config.output = output.clone();
    }
    if let Some(manifest) = &cli.manifest {
        config.manifest = Some(manifest.clone());
    }
    if let Some(jobs) = cli.jobs {
        config.jobs = jobs;
    }
    Ok(config)
}

fn read_bundle(path: &Path) -> Result<Vec<u8>, BuildError> {
    fs::read(path).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })
}
