//! # Stepwise Configuration Validator
//!
//! Command-line tool for validating step configuration across environments.
//! Loads the same layered sources a step run would and reports the effective
//! settings, so bad limits or classification tables fail here instead of at
//! the first chunk.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use stepwise_core::config::{ConfigManager, StepwiseConfig};
use stepwise_core::resilience::{Classifier, ErrorKind};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate stepwise configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment overlay to apply (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format (table, json)
    #[arg(long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate every configuration section
    All,

    /// Validate one section (step, fault_tolerance, repository, logging)
    Component { name: String },

    /// Show how the configured classifiers treat an error kind
    Classify { kind: String },

    /// List environment overlays in the configuration directory
    Environments,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all_config(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Classify { kind }) => classify_kind(&cli, kind),
        Some(Commands::Environments) => list_environments(&cli),
    };

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {:#}", e);
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<StepwiseConfig> {
    let manager =
        ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
            .with_context(|| format!("loading environment '{}'", cli.environment))?;

    for source in manager.sources() {
        println!("  merged {}", source.display());
    }
    Ok(manager.config().clone())
}

fn validate_all_config(cli: &Cli) -> anyhow::Result<()> {
    println!("🔧 Validating Stepwise Configuration");
    println!("Environment: {}", cli.environment);
    if let Some(config_dir) = &cli.config_dir {
        println!("Config Directory: {}", config_dir.display());
    }
    println!();

    let config = load(cli)?;
    println!("✅ Configuration loaded and validated");

    if cli.format == "json" {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    show_step_settings(&config);
    show_fault_tolerance(&config)?;
    println!("  repository.backend: {}", config.repository.backend);
    println!("  logging.format:     {}", config.logging.format);

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn validate_component(cli: &Cli, component_name: &str) -> anyhow::Result<()> {
    println!("🔧 Validating Component: {component_name}");
    let config = load(cli)?;

    match component_name.to_lowercase().replace('-', "_").as_str() {
        "step" => {
            config.step.validate()?;
            show_step_settings(&config);
        }
        "fault_tolerance" => {
            config.fault_tolerance.validate()?;
            show_fault_tolerance(&config)?;
        }
        "repository" => config.repository.validate()?,
        "logging" => config.logging.validate()?,
        _ => bail!("Unknown component: {component_name}"),
    }

    println!("✅ Component '{component_name}' validation passed!");
    Ok(())
}

fn classify_kind(cli: &Cli, kind: &str) -> anyhow::Result<()> {
    let config = load(cli)?;
    let hierarchy = config.fault_tolerance.hierarchy()?;
    let kind = ErrorKind::new(kind);
    let retry = config.fault_tolerance.retry_classifier()?;
    let skip = config.fault_tolerance.skip_classifier()?;

    let ancestry: Vec<String> = hierarchy
        .ancestry(&kind)
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("🔎 {kind}");
    println!("  ancestry: {}", ancestry.join(" -> "));
    println!("  retry:    {}", retry.classify_kind(&kind));
    println!("  skip:     {}", skip.classify_kind(&kind));
    Ok(())
}

fn list_environments(cli: &Cli) -> anyhow::Result<()> {
    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("config"))
        .join("environments");
    println!("📋 Available Environments:");

    if !config_dir.exists() {
        println!("  (no overlays in {})", config_dir.display());
        return Ok(());
    }

    let mut names: Vec<String> = std::fs::read_dir(&config_dir)
        .with_context(|| format!("reading {}", config_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .collect();
    names.sort();

    for name in names {
        println!("  • {name}");
    }
    Ok(())
}

fn show_step_settings(config: &StepwiseConfig) {
    let step = &config.step;
    println!("\n📦 Step settings");
    println!("  chunk_size:              {}", step.chunk_size);
    println!("  retry_limit:             {}", step.retry_limit);
    println!("  retry_backoff_ms:        {}", step.retry_backoff_ms);
    println!("  skip_limit:              {}", step.skip_limit);
    println!("  concurrency_limit:       {}", step.concurrency_limit);
    println!("  start_limit:             {}", step.start_limit);
    println!("  allow_start_if_complete: {}", step.allow_start_if_complete);
}

fn show_fault_tolerance(config: &StepwiseConfig) -> anyhow::Result<()> {
    let fault_tolerance = &config.fault_tolerance;
    // Building both classifiers proves every listed kind resolves
    fault_tolerance.retry_classifier()?;
    fault_tolerance.skip_classifier()?;

    println!("\n🛡️  Fault tolerance");
    println!("  retryable: {:?}", fault_tolerance.retryable);
    println!("  skippable: {:?}", fault_tolerance.skippable);
    println!("  fatal:     {:?}", fault_tolerance.fatal);
    println!("  default:   {}", fault_tolerance.default_classification);
    for declaration in &fault_tolerance.kinds {
        println!("  kind {} < {}", declaration.name, declaration.parent);
    }
    Ok(())
}
