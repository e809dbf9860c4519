//! flac2mp3 - batch FLAC to MP3 conversion
//!
//! Entry point: parses arguments, sets up logging and dispatches to the
//! `convert`, `check` and `config` subcommands.

use anyhow::{bail, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use flac2mp3::cli::{Args, Commands, ConfigAction, ConvertArgs};
use flac2mp3::config::{Settings, ToolTimeouts, DEFAULT_SETTINGS_FILE};
use flac2mp3::media::{ProcessRunner, ToolRunner};
use flac2mp3::progress::{ActiveBar, ChannelReporter, ConsoleProgress};
use flac2mp3::transcode::ConversionOutcome;
use flac2mp3::workflow::{BatchSummary, BatchWorkflow};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Keep the guard alive so the file writer flushes on exit
    let active_bar = ActiveBar::default();
    let _guard = setup_logging(args.verbose, active_bar.clone())?;
    info!("Starting flac2mp3 {}", env!("CARGO_PKG_VERSION"));

    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let mut settings = Settings::load(&settings_path);

    match args.command {
        Commands::Convert(convert) => {
            run_convert(&convert, &mut settings, &settings_path, &active_bar).await?;
        }
        Commands::Check => {
            let tools = settings.toolchain()?;
            let checks = tools
                .self_test(&ProcessRunner::new(), ToolTimeouts::default().self_test)
                .await;

            println!("{:<10} {:<8} {}", "Tool", "Status", "Path");
            println!("{}", "-".repeat(50));
            for check in &checks {
                let status = if check.is_ok() { "OK" } else { "FAILED" };
                println!("{:<10} {:<8} {}", check.tool.name(), status, check.path);
            }

            let failed: Vec<_> = checks.iter().filter(|check| !check.is_ok()).collect();
            for check in &failed {
                println!("\n{}: {}", check.tool, check.problem.as_deref().unwrap_or_default());
            }
            if !failed.is_empty() {
                bail!("{} of {} tools are not usable", failed.len(), checks.len());
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            }
            ConfigAction::Path => {
                let status = if settings_path.exists() { "" } else { " (not created yet)" };
                println!("{}{}", settings_path.display(), status);
            }
            ConfigAction::Reset => {
                Settings::default().save_to_file(&settings_path)?;
                println!("Settings reset to defaults in {}", settings_path.display());
            }
        },
    }

    Ok(())
}

async fn run_convert(
    convert: &ConvertArgs,
    settings: &mut Settings,
    settings_path: &Path,
    active_bar: &ActiveBar,
) -> Result<()> {
    convert.apply(settings);
    let config = settings.resolve()?;

    if let Err(e) = settings.save_to_file(settings_path) {
        warn!("Could not save settings to {}: {}", settings_path.display(), e);
    }

    info!(
        "Converting {} -> {} at {}",
        config.source_dir.display(),
        config.destination_dir.display(),
        config.bitrate
    );

    let runner: Arc<dyn ToolRunner> = Arc::new(ProcessRunner::new());
    let workflow = Arc::new(BatchWorkflow::new(config, runner));
    workflow.preflight().await?;

    let (reporter, events) = ChannelReporter::channel();
    let batch = tokio::spawn({
        let workflow = Arc::clone(&workflow);
        async move { workflow.run(&reporter).await }
    });

    ConsoleProgress::new().attach(active_bar).drain(events).await;
    let summary = batch.await??;

    if convert.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, workflow.config().destination_dir.display());
    }

    Ok(())
}

fn print_summary(summary: &BatchSummary, destination: impl std::fmt::Display) {
    println!(
        "\nConversion complete: {} files converted, {} failed",
        summary.converted, summary.failed
    );
    if summary.converted > 0 {
        println!("Output folder: {}", destination);
    }

    for report in &summary.files {
        if let ConversionOutcome::Failed { stage, diagnostic } = &report.outcome {
            let first_line = diagnostic.lines().next().unwrap_or_default();
            println!("  ✗ {} ({}): {}", report.source.display(), stage, first_line);
        }
    }
}

fn setup_logging(verbose: bool, active_bar: ActiveBar) -> Result<WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(".flac2mp3").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation
    let file_appender = rolling::daily(&log_dir, "flac2mp3.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console stays quiet under the progress bar unless verbose, and clears the
    // bar before each line
    let console_filter = if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let console_layer = fmt::layer()
        .with_writer(active_bar)
        .with_target(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    Ok(guard)
}
