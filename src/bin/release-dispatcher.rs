//! Release Dispatcher CLI
//!
//! Sequential build-and-upload dispatcher for multi-package repositories

use anyhow::Result;
use clap::{Parser, Subcommand};
use release_dispatcher::{
    ConfigLoadOptions, ConfigLoader, DailySchedule, DispatchConfig, DispatchOptions,
    DispatchReport, HistoryOptions, IndexCredentials, LayoutValidator, PythonSteps,
    ReleaseDispatcher, RosterValidator, RunHistory, ScheduleRunner, SubProjectContext, Trigger,
    CONFIG_FILENAME, PASSWORD_VAR, USERNAME_VAR,
};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

/// Sequential build-and-upload dispatcher for multi-package repositories
#[derive(Parser)]
#[command(name = "release-dispatcher")]
#[command(version = "0.1.0")]
#[command(about = "Sequential build-and-upload dispatcher", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch every sub-project in the configured order
    Run {
        /// Project path (defaults to current directory)
        #[arg(value_name = "PROJECT_PATH")]
        project_path: Option<PathBuf>,

        /// Configuration file (replaces PROJECT_PATH/.dispatch-config.yaml)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Build distributions without uploading
        #[arg(long)]
        dry_run: bool,

        /// Stop at the first failing sub-project
        #[arg(long)]
        fail_fast: bool,

        /// Query the index after each upload
        #[arg(long)]
        verify: bool,
    },

    /// Run dispatches on the configured daily schedule
    Daemon {
        /// Project path (defaults to current directory)
        #[arg(value_name = "PROJECT_PATH")]
        project_path: Option<PathBuf>,

        /// Configuration file (replaces PROJECT_PATH/.dispatch-config.yaml)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Trigger time-of-day as "HH:MM" UTC (overrides configuration)
        #[arg(short, long)]
        time: Option<String>,
    },

    /// Check configuration, roster and sub-project layouts
    Check {
        /// Project path (defaults to current directory)
        #[arg(value_name = "PROJECT_PATH")]
        project_path: Option<PathBuf>,

        /// Configuration file (replaces PROJECT_PATH/.dispatch-config.yaml)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Display dispatch history
    History {
        /// Project path (defaults to current directory)
        #[arg(value_name = "PROJECT_PATH")]
        project_path: Option<PathBuf>,

        /// Show runs from the last N days
        #[arg(long, default_value = "30")]
        days: i64,

        /// Filter by sub-project name
        #[arg(short, long)]
        subproject: Option<String>,

        /// Show only successful runs
        #[arg(long)]
        success_only: bool,

        /// Show only failed runs
        #[arg(long)]
        failures_only: bool,

        /// Maximum number of runs listed
        #[arg(long, default_value = "10")]
        limit: usize,

        /// Delete all recorded history
        #[arg(long)]
        clear: bool,
    },

    /// Initialize release-dispatcher configuration
    Init {
        /// Project path (defaults to current directory)
        #[arg(value_name = "PROJECT_PATH")]
        project_path: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    // Custom exit override behavior
    let result = run().await;

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            project_path,
            config,
            dry_run,
            fail_fast,
            verify,
        } => {
            let path = project_path.unwrap_or_else(|| PathBuf::from("."));
            run_command(path, config, dry_run, fail_fast, verify).await
        }
        Commands::Daemon {
            project_path,
            config,
            time,
        } => {
            let path = project_path.unwrap_or_else(|| PathBuf::from("."));
            daemon_command(path, config, time).await
        }
        Commands::Check {
            project_path,
            config,
        } => {
            let path = project_path.unwrap_or_else(|| PathBuf::from("."));
            check_command(path, config).await
        }
        Commands::History {
            project_path,
            days,
            subproject,
            success_only,
            failures_only,
            limit,
            clear,
        } => {
            let path = project_path.unwrap_or_else(|| PathBuf::from("."));
            history_command(path, days, subproject, success_only, failures_only, limit, clear)
                .await
        }
        Commands::Init {
            project_path,
            force,
        } => {
            let path = project_path.unwrap_or_else(|| PathBuf::from("."));
            init_command(path, force).await
        }
    }
}

/// Load the layered configuration for a project directory
async fn load_config(
    project_path: &Path,
    config_file: Option<PathBuf>,
) -> Result<DispatchConfig> {
    let options = ConfigLoadOptions {
        project_path: project_path.to_path_buf(),
        config_file,
        cli_args: None,
        env: std::env::vars().collect(),
    };

    let config = ConfigLoader::load(options).await?;
    Ok(config)
}

/// Whether the daemon needs the credential pair in its environment
///
/// Dry runs never read the pair, so a dry-run daemon may start without it.
fn daemon_needs_credentials(config: &DispatchConfig) -> bool {
    !config.dry_run()
}

/// Resolve the directory sub-project paths are joined against
fn resolve_project_root(project_path: &Path, config: &DispatchConfig) -> PathBuf {
    let root = config.project_root();
    if root == "." {
        project_path.to_path_buf()
    } else {
        project_path.join(root)
    }
}

/// Run one full dispatch and record it in the run history
///
/// Credentials are read from the environment up front so a missing pair
/// fails the run before any sub-project is built. Dry runs never touch
/// the credential variables.
async fn execute_dispatch(
    project_path: &Path,
    config: &DispatchConfig,
    options: DispatchOptions,
    trigger: Trigger,
) -> Result<DispatchReport> {
    let credentials = if options.dry_run {
        None
    } else {
        Some(IndexCredentials::from_env()?)
    };

    let project_root = resolve_project_root(project_path, config);
    let steps = Arc::new(PythonSteps::new(config, credentials));
    let dispatcher = ReleaseDispatcher::new(steps, options);

    let report = dispatcher
        .dispatch(&config.subprojects, &project_root, trigger)
        .await?;

    let mut history = RunHistory::new(project_path);
    if let Err(e) = history.initialize().await {
        eprintln!("⚠️  Failed to initialize run history: {}", e);
    }
    if let Err(e) = history.record_run(&report).await {
        eprintln!("⚠️  Failed to record run history: {}", e);
    }

    Ok(report)
}

async fn run_command(
    project_path: PathBuf,
    config_file: Option<PathBuf>,
    dry_run: bool,
    fail_fast: bool,
    verify: bool,
) -> Result<i32> {
    println!("\n📦 release-dispatcher\n");

    let config = load_config(&project_path, config_file).await?;

    let validation = ConfigLoader::validate(&config);
    if !validation.valid {
        eprintln!("{}", ConfigLoader::format_validation_result(&validation));
        return Ok(1);
    }
    if !validation.warnings.is_empty() {
        println!("{}", ConfigLoader::format_validation_result(&validation));
    }

    let mut options = DispatchOptions::from_config(&config);
    if dry_run {
        options.dry_run = true;
    }
    if fail_fast {
        options.continue_on_error = false;
    }
    if verify {
        options.verify = true;
    }

    match execute_dispatch(&project_path, &config, options, Trigger::Manual).await {
        Ok(report) => Ok(report.exit_code),
        Err(e) => {
            eprintln!("\n❌ Dispatch failed: {}", e);
            Ok(1)
        }
    }
}

async fn daemon_command(
    project_path: PathBuf,
    config_file: Option<PathBuf>,
    time: Option<String>,
) -> Result<i32> {
    println!("\n⏰ release-dispatcher daemon\n");

    let config = load_config(&project_path, config_file).await?;

    let validation = ConfigLoader::validate(&config);
    if !validation.valid {
        eprintln!("{}", ConfigLoader::format_validation_result(&validation));
        return Ok(1);
    }

    let time_spec = time.unwrap_or_else(|| config.schedule_time().to_string());
    let schedule = DailySchedule::parse(&time_spec)?;

    // A daemon whose process environment lacks the credential pair can
    // never upload, so refuse to start instead of failing every firing.
    // A dry-run daemon never uploads and may start without the pair.
    if daemon_needs_credentials(&config) {
        if !IndexCredentials::available() {
            for variable in IndexCredentials::missing_variables() {
                eprintln!("❌ Missing credential variable: {}", variable);
            }
            return Ok(1);
        }
        println!("🔑 Index credentials present");
    } else {
        println!("🔍 Dry-run mode: uploads are skipped, credentials not required");
    }
    println!("📦 Roster: {}", config.subprojects.join(" -> "));
    println!("⏰ Daily trigger time: {} UTC", schedule);

    let runner = ScheduleRunner::new(schedule);
    runner
        .run(|fired_at| {
            let project_path = project_path.clone();
            let config = config.clone();
            async move {
                println!(
                    "\n🔔 Scheduled dispatch fired at {}",
                    fired_at.format("%Y-%m-%d %H:%M UTC")
                );
                let options = DispatchOptions::from_config(&config);
                if let Err(e) =
                    execute_dispatch(&project_path, &config, options, Trigger::Scheduled).await
                {
                    eprintln!("❌ Scheduled dispatch failed: {}", e);
                }
            }
        })
        .await;

    Ok(0)
}

async fn check_command(project_path: PathBuf, config_file: Option<PathBuf>) -> Result<i32> {
    println!("\n🔍 Dispatch Check\n");

    let config = load_config(&project_path, config_file).await?;

    let validation = ConfigLoader::validate(&config);
    println!("{}", ConfigLoader::format_validation_result(&validation));
    if !validation.valid {
        return Ok(1);
    }

    let mut exit_code = 0;

    let roster_result = RosterValidator::new().validate(&config.subprojects);
    if roster_result.valid {
        println!("✅ Roster: {} sub-projects in order", config.subprojects.len());
    } else {
        println!("❌ Roster validation failed");
        for error in &roster_result.errors {
            println!("  - [{}] {}", error.field, error.message);
        }
        exit_code = 1;
    }
    for warning in &roster_result.warnings {
        println!("  ⚠️  [{}] {}", warning.field, warning.message);
    }

    let project_root = resolve_project_root(&project_path, &config);
    let layout = LayoutValidator::new();

    for name in &config.subprojects {
        let ctx = SubProjectContext::new(name.clone(), project_root.join(name));
        let result = layout.validate(&ctx).await;

        println!("\n📦 {}:", name);
        if result.valid {
            println!("  ✅ Layout valid");
            if let Some(metadata) = &result.metadata {
                if let Some(manifest) = metadata.get("manifest").and_then(|v| v.as_str()) {
                    println!("  📄 Manifest: {}", manifest);
                }
            }
        } else {
            println!("  ❌ Layout invalid");
            for error in &result.errors {
                println!("    - [{}] {}", error.field, error.message);
            }
            exit_code = 1;
        }
        for warning in &result.warnings {
            println!("    ⚠️  [{}] {}", warning.field, warning.message);
        }
    }

    println!();
    if IndexCredentials::available() {
        println!("🔑 Index credentials present");
    } else {
        // Missing credentials are reported but do not fail the check;
        // they are often injected only in the publishing environment.
        println!(
            "⚠️  Missing credential variables: {}",
            IndexCredentials::missing_variables().join(", ")
        );
    }

    println!();
    Ok(exit_code)
}

async fn history_command(
    project_path: PathBuf,
    days: i64,
    subproject: Option<String>,
    success_only: bool,
    failures_only: bool,
    limit: usize,
    clear: bool,
) -> Result<i32> {
    println!("\n📊 Dispatch History\n");

    let mut history = RunHistory::new(&project_path);
    history.initialize().await?;

    if clear {
        history.clear_data().await?;
        println!("🗑️  Run history cleared");
        return Ok(0);
    }

    let options = HistoryOptions {
        trigger: None,
        subproject,
        days: Some(days),
        success_only,
        failures_only,
        limit: Some(limit),
    };

    println!("{}", history.generate_markdown(&options));

    Ok(0)
}

async fn init_command(project_path: PathBuf, force: bool) -> Result<i32> {
    println!("\n🎯 Initialize release-dispatcher\n");

    let config_path = project_path.join(CONFIG_FILENAME);
    if config_path.exists() && !force {
        eprintln!(
            "⚠️  {} already exists (use --force to overwrite)",
            config_path.display()
        );
        return Ok(1);
    }

    let starter = r#"# release-dispatcher configuration
version: "1.0"

# Ordered sub-project roster; order determines publish sequence
subprojects:
  - common
  - core
  - features
  - tabular
  - multimodal
  - timeseries
  - autogluon

project:
  root: "."

schedule:
  time: "07:59"

index:
  repositoryUrl: "https://upload.pypi.org/legacy/"
  verifyUrl: "https://pypi.org/pypi"

dispatch:
  continueOnError: true
  dryRun: false
  verify: false
"#;

    tokio::fs::write(&config_path, starter).await?;

    println!("✅ Wrote {}", config_path.display());
    println!("Edit the subprojects list to match your repository layout.");
    println!(
        "Credentials are read from {} / {} at dispatch time.",
        USERNAME_VAR, PASSWORD_VAR
    );

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use release_dispatcher::DispatchOptionsConfig;

    fn dry_run_config() -> DispatchConfig {
        let mut config = DispatchConfig::default();
        config.dispatch = Some(DispatchOptionsConfig {
            dry_run: Some(true),
            ..DispatchOptionsConfig::default()
        });
        config
    }

    #[test]
    fn test_daemon_needs_credentials_by_default() {
        assert!(daemon_needs_credentials(&DispatchConfig::default()));
    }

    #[test]
    fn test_dry_run_daemon_starts_without_credentials() {
        assert!(!daemon_needs_credentials(&dry_run_config()));
    }
}
