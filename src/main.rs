// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{info, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};

use yomiage::app_config::{Config, LogLevel};
use yomiage::logging::FacadeLog;
use yomiage::orchestrator::{format_duration, Orchestrator};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert every document of the input directory to audio (default command)
    Run,

    /// Merge staging directories left behind by an earlier run
    Merge,

    /// Check that the voice service answers
    Check,

    /// Generate shell completions for yomiage
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// yomiage - batch text-to-speech
///
/// Reads every text file of the input directory aloud through a voice
/// synthesis service and writes one audio file per document.
#[derive(Parser, Debug)]
#[command(name = "yomiage")]
#[command(version)]
#[command(about = "Batch text-to-speech through a voice synthesis service")]
#[command(long_about = "yomiage splits text documents into lines, has every line read by a voice \
synthesis service and merges the fragments into one audio file per document.

EXAMPLES:
    yomiage                                  # Convert txt/*.txt into download/*.wav
    yomiage --config narration.json run      # Use another configuration file
    yomiage merge                            # Retry merges of a previous run
    yomiage check                            # Probe the voice service
    yomiage completions bash > yomiage.bash  # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. If the file doesn't exist,
    a default one will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "conf.json")]
    config: PathBuf,

    /// Set logging level
    #[arg(short, long, global = true, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji and ANSI color for log level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("❌ ", "1;31"),
            Level::Warn => ("🚧 ", "1;33"),
            Level::Info => (" ", "1;32"),
            Level::Debug => ("🔍 ", "1;36"),
            Level::Trace => ("📋 ", "1;35"),
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let (emoji, color) = Self::style_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\x1B[{}m{} {} {}\x1B[0m",
                color, now, emoji, record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // The level is lowered or raised once the config is loaded
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    let command = match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "yomiage", &mut std::io::stdout());
            return Ok(());
        }
        Some(command) => command,
        None => Commands::Run,
    };

    let config = load_config(&cli.config, cli.log_level)?;
    log::set_max_level(config.log_level.to_level_filter());

    match command {
        Commands::Check => run_check(config).await,
        Commands::Merge => run_merge(config).await,
        _ => run_batch(config).await,
    }
}

/// Load the configuration file and apply command line overrides
fn load_config(path: &Path, log_level: Option<CliLogLevel>) -> Result<Config> {
    let mut config = Config::load_or_create(path)?;

    if let Some(log_level) = log_level {
        config.log_level = log_level.into();
    }

    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

fn progress_bar() -> ProgressBar {
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }

    let progress_bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
    let template_result = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({percent}%) {msg} {eta}")
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress_bar.set_style(template_result.progress_chars("█▓▒░"));
    progress_bar.set_message("Synthesizing");
    progress_bar
}

async fn run_batch(config: Config) -> Result<()> {
    let progress = progress_bar();
    let orchestrator = Orchestrator::from_config(config, FacadeLog::shared("yomiage"))?
        .with_progress(progress.clone());

    let summary = orchestrator.run().await?;
    progress.finish_and_clear();

    if !summary.is_success() {
        bail!(
            "{} of {} documents failed",
            summary.failed.len(),
            summary.documents_total()
        );
    }

    info!(
        "Success: {} documents in {}",
        summary.succeeded.len(),
        format_duration(summary.elapsed)
    );
    Ok(())
}

async fn run_merge(config: Config) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config, FacadeLog::shared("yomiage"))?;
    let summary = orchestrator.merge_staged().await?;

    if !summary.is_success() {
        bail!(
            "{} of {} staged documents failed to merge",
            summary.failed.len(),
            summary.documents_total()
        );
    }
    Ok(())
}

async fn run_check(config: Config) -> Result<()> {
    let endpoint = config.synthesis.endpoint_url()?;
    let orchestrator = Orchestrator::from_config(config, FacadeLog::shared("yomiage"))?;

    orchestrator
        .check_connection()
        .await
        .with_context(|| format!("Voice service at {} did not answer with audio", endpoint))?;

    info!("Voice service at {} is reachable", endpoint);
    Ok(())
}
