//! Dockhand CLI entrypoint.
//!
//! This is the main entrypoint for the dockhand command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use dockhand::backend::{LocalBackend, ResourceBackend};
use dockhand::cli::{CacheCommands, Cli, Commands, OutputFormatter};
use dockhand::config::{ConfigParser, ConfigValidator, DockhandConfig, TypeRegistry, find_config_file};
use dockhand::error::{ConfigError, DockhandError, Result};
use dockhand::planner::RunMode;
use dockhand::reconciler::{ReconcileSummary, Reconciler};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Everything a command needs after loading the configuration.
struct Context {
    config: DockhandConfig,
    registry: TypeRegistry,
    backend: LocalBackend,
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current step");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::Types => cmd_types(cli.config.as_ref(), &formatter),
        Commands::Plan { detailed } => cmd_plan(cli.config.as_ref(), detailed, &formatter).await,
        Commands::Apply {
            check,
            yes,
            continue_on_error,
            kind,
        } => {
            let options = ApplyOptions {
                check,
                yes,
                continue_on_error,
                kind,
            };
            cmd_apply(cli.config.as_ref(), &options, &formatter, cancel).await
        }
        Commands::Diff => cmd_diff(cli.config.as_ref(), &formatter).await,
        Commands::Status { detailed } => cmd_status(cli.config.as_ref(), detailed, &formatter).await,
        Commands::Destroy {
            check,
            yes,
            continue_on_error,
        } => cmd_destroy(cli.config.as_ref(), check, yes, continue_on_error, &formatter, cancel).await,
        Commands::Cache { command } => cmd_cache(cli.config.as_ref(), command, &formatter).await,
    }
}

/// Initialize a new project.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing new Dockhand project in: {}", path.display());

    let config_path = path.join("dockhand.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/dockhand.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        if !existing.contains(".dockhand") {
            let mut file = std::fs::OpenOptions::new().append(true).open(&gitignore_path)?;
            writeln!(file, "\n# Dockhand")?;
            writeln!(file, ".dockhand/")?;
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, ".env\n.dockhand/\n")?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Edit dockhand.yaml with your resources");
    eprintln!("  2. Run 'dockhand validate' to check your configuration");
    eprintln!("  3. Run 'dockhand plan' to see what would change");
    eprintln!("  4. Run 'dockhand apply' to converge");

    Ok(())
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool, formatter: &OutputFormatter) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let config = load_config(&config_file)?;
    let registry = TypeRegistry::with_overrides(&config.types)?;
    let report = ConfigValidator::new().check(&config, &registry);

    println!(
        "{}",
        formatter.format_validation(&report, show_warnings, config.resources.len())
    );

    if report.is_valid() {
        Ok(())
    } else {
        Err(DockhandError::Config(ConfigError::invalid_general(format!(
            "{} error(s) found",
            report.errors.len()
        ))))
    }
}

/// List resource types. Works without a configuration file.
fn cmd_types(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let registry = match resolve_config_path(config_path) {
        Ok(config_file) => TypeRegistry::with_overrides(&load_config(&config_file)?.types)?,
        Err(e) => {
            debug!("No configuration, listing built-in types: {e}");
            TypeRegistry::builtin()?
        }
    };

    println!("{}", formatter.format_types(&registry));
    Ok(())
}

/// Show the action plan.
async fn cmd_plan(config_path: Option<&PathBuf>, detailed: bool, formatter: &OutputFormatter) -> Result<()> {
    let ctx = load_context(config_path)?;
    let reconciler = Reconciler::new(&ctx.backend, &ctx.registry).with_settings(ctx.config.settings.clone());

    let summary = reconciler.reconcile_all(&ctx.config, RunMode::Check, true).await;
    println!("{}", formatter.format_plan(&summary, detailed));
    ensure_success(&summary)
}

/// Options for `apply`.
struct ApplyOptions {
    check: bool,
    yes: bool,
    continue_on_error: bool,
    kind: Option<String>,
}

/// Converge resources.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    options: &ApplyOptions,
    formatter: &OutputFormatter,
    cancel: CancellationToken,
) -> Result<()> {
    let mut ctx = load_context(config_path)?;
    if let Some(kind) = &options.kind {
        ctx.config.resources.retain(|r| &r.kind == kind);
        info!("Restricting apply to {} resource(s) of kind {kind}", ctx.config.resources.len());
    }

    let reconciler = Reconciler::new(&ctx.backend, &ctx.registry)
        .with_settings(ctx.config.settings.clone())
        .with_cancellation(cancel);

    let preview = reconciler
        .reconcile_all(&ctx.config, RunMode::Check, options.continue_on_error)
        .await;

    if options.check {
        println!("{}", formatter.format_summary(&preview));
        return ensure_success(&preview);
    }

    if preview.changed_count() == 0 && preview.is_success() {
        println!("{}", formatter.success("No changes to apply."));
        return Ok(());
    }

    eprintln!("{}", formatter.format_plan(&preview, false));

    if !options.yes && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    let summary = reconciler
        .reconcile_all(&ctx.config, RunMode::Normal, options.continue_on_error)
        .await;
    println!("{}", formatter.format_summary(&summary));
    ensure_success(&summary)
}

/// Report drift.
async fn cmd_diff(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let ctx = load_context(config_path)?;
    let reconciler = Reconciler::new(&ctx.backend, &ctx.registry).with_settings(ctx.config.settings.clone());

    let report = reconciler.check_drift(&ctx.config).await?;
    println!("{}", formatter.format_drift(&report));
    Ok(())
}

/// Show observed state.
async fn cmd_status(config_path: Option<&PathBuf>, detailed: bool, formatter: &OutputFormatter) -> Result<()> {
    let ctx = load_context(config_path)?;
    let resources = ctx.backend.list().await?;
    println!("{}", formatter.format_status(&resources, detailed));
    Ok(())
}

/// Remove every configured resource.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    check: bool,
    auto_approve: bool,
    continue_on_error: bool,
    formatter: &OutputFormatter,
    cancel: CancellationToken,
) -> Result<()> {
    let ctx = load_context(config_path)?;
    let reconciler = Reconciler::new(&ctx.backend, &ctx.registry)
        .with_settings(ctx.config.settings.clone())
        .with_cancellation(cancel);

    let preview = reconciler
        .destroy_all(&ctx.config, RunMode::Check, continue_on_error)
        .await;

    if check || preview.changed_count() == 0 {
        println!("{}", formatter.format_summary(&preview));
        return ensure_success(&preview);
    }

    eprintln!("The following resources will be removed:");
    for result in preview.results.iter().filter(|r| r.changed) {
        eprintln!("  - {}", result.resource.key());
    }

    if !auto_approve && !confirm("\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ", "destroy")? {
        eprintln!("Destruction cancelled.");
        return Ok(());
    }

    let summary = reconciler
        .destroy_all(&ctx.config, RunMode::Normal, continue_on_error)
        .await;
    println!("{}", formatter.format_summary(&summary));
    ensure_success(&summary)
}

/// Cache management commands.
async fn cmd_cache(config_path: Option<&PathBuf>, command: CacheCommands, formatter: &OutputFormatter) -> Result<()> {
    let ctx = load_context(config_path)?;

    match command {
        CacheCommands::Reset { force } => match ctx.backend.reset(force).await? {
            Some(lock) => println!(
                "{}",
                formatter.success(&format!("Cache reset, cleared lock held by {}", lock.holder))
            ),
            None => println!("{}", formatter.success("Cache reset")),
        },
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Returns the directory holding the configuration file.
fn config_dir(config_file: &Path) -> &Path {
    config_file.parent().unwrap_or_else(|| Path::new("."))
}

/// Loads `.env` and the configuration with environment overrides.
fn load_config(config_file: &Path) -> Result<DockhandConfig> {
    let parser = ConfigParser::new().with_base_path(config_dir(config_file));
    parser.load_dotenv()?;
    parser.load_with_env(config_file)
}

/// Loads and validates the configuration and opens the local backend.
fn load_context(config_path: Option<&PathBuf>) -> Result<Context> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let config = load_config(&config_file)?;
    let registry = TypeRegistry::with_overrides(&config.types)?;
    let report = ConfigValidator::new().validate(&config, &registry)?;
    for warning in &report.warnings {
        warn!("{warning}");
    }

    let state_dir = if config.state.path.is_absolute() {
        config.state.path.clone()
    } else {
        config_dir(&config_file).join(&config.state.path)
    };

    Ok(Context {
        config,
        registry,
        backend: LocalBackend::new(state_dir),
    })
}

/// Turns a failed summary into an error exit.
fn ensure_success(summary: &ReconcileSummary) -> Result<()> {
    if summary.is_success() {
        Ok(())
    } else {
        Err(DockhandError::internal(format!(
            "{} resource(s) failed, {} skipped",
            summary.failed_count(),
            summary.skipped.len()
        )))
    }
}

/// Prompts on stderr and compares the answer.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}
