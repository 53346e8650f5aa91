// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use indicatif::{ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, info, warn};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use subflow::app_config::{self, Config, ProviderKind};
use subflow::app_controller::{AppController, Components};
use subflow::content::RequesterScope;
use subflow::database::models::{BatchProgress, JobRecord, JobStatus};
use subflow::sources::StaticSource;

/// CLI Wrapper for ProviderKind to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliProvider {
    #[value(name = "openai")]
    OpenAI,
    Gemini,
    #[value(name = "openrouter")]
    OpenRouter,
    Groq,
    #[value(name = "togetherai")]
    TogetherAI,
    Custom,
    #[value(name = "deepl")]
    DeepL,
}

impl From<CliProvider> for ProviderKind {
    fn from(cli_provider: CliProvider) -> Self {
        match cli_provider {
            CliProvider::OpenAI => ProviderKind::OpenAI,
            CliProvider::Gemini => ProviderKind::Gemini,
            CliProvider::OpenRouter => ProviderKind::OpenRouter,
            CliProvider::Groq => ProviderKind::Groq,
            CliProvider::TogetherAI => ProviderKind::TogetherAI,
            CliProvider::Custom => ProviderKind::Custom,
            CliProvider::DeepL => ProviderKind::DeepL,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// CLI Wrapper for JobStatus to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliJobStatus {
    Processing,
    Completed,
    Failed,
    ManualSearch,
}

impl From<CliJobStatus> for JobStatus {
    fn from(status: CliJobStatus) -> Self {
        match status {
            CliJobStatus::Processing => JobStatus::Processing,
            CliJobStatus::Completed => JobStatus::Completed,
            CliJobStatus::Failed => JobStatus::Failed,
            CliJobStatus::ManualSearch => JobStatus::ManualSearch,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Request a translated subtitle for a stream id
    Translate(TranslateArgs),

    /// Run a failed or manual-search job again
    Reprocess {
        /// Job to reprocess
        job_id: i64,

        /// Translation provider to use instead of the job's
        #[arg(short, long, value_enum)]
        provider: Option<CliProvider>,

        /// Wait for the job to finish
        #[arg(short, long)]
        wait: bool,
    },

    /// Finish jobs an earlier run left processing
    Resume,

    /// Show one job with its batch progress
    Status {
        job_id: i64,
    },

    /// List jobs, newest first
    Jobs {
        /// Only jobs with this status
        #[arg(short, long, value_enum)]
        status: Option<CliJobStatus>,

        /// Maximum number of jobs shown
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Delete a job and its batches
    Delete {
        job_id: i64,
    },

    /// Generate shell completions for subflow
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct TranslateArgs {
    /// Stream id: `tt1234567` for a movie, `tt1234567:S:E` for an episode
    #[arg(value_name = "STREAM_ID")]
    stream_id: String,

    /// Target language code (e.g., 'en', 'es', 'pt-br')
    #[arg(short = 't', long)]
    language: String,

    /// Translation provider to use
    #[arg(short, long, value_enum)]
    provider: Option<CliProvider>,

    /// Requester password; scopes the job and its artifact to this credential
    #[arg(long, env = "SUBFLOW_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Translate this SRT file instead of searching OpenSubtitles
    #[arg(long, value_name = "FILE")]
    source_file: Option<PathBuf>,

    /// Language of --source-file
    #[arg(long, default_value = "en", requires = "source_file")]
    source_language: String,

    /// Wait for the job to finish and print the result
    #[arg(short, long)]
    wait: bool,
}

/// subflow - asynchronous subtitle translation jobs
///
/// Finds a source subtitle, splits it into batches, translates the batches
/// in parallel through the configured provider and assembles the result.
#[derive(Parser, Debug)]
#[command(name = "subflow")]
#[command(version)]
#[command(about = "Asynchronous subtitle translation job runner")]
#[command(long_about = "subflow translates subtitles for streaming ids through AI and DeepL providers.

EXAMPLES:
    subflow translate tt0111161 -t es --wait            # Translate a movie and wait
    subflow translate tt0944947:1:2 -t fr -p deepl      # Translate an episode with DeepL
    subflow translate tt0111161 -t de --source-file a.srt
    subflow jobs --status failed                        # List failed jobs
    subflow reprocess 12 --wait                         # Retry job 12
    subflow resume                                      # Finish interrupted jobs
    subflow completions bash > subflow.bash             # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config. If the config file doesn't exist, a default one
    will be created automatically.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "conf.json")]
    config: PathBuf,

    /// Set logging level
    #[arg(short, long, global = true, value_enum)]
    log_level: Option<CliLogLevel>,

    /// Seconds to wait with --wait
    #[arg(long, global = true, default_value_t = 900)]
    timeout: u64,
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

    // @returns: ANSI color and tag for a level
    fn style_for_level(level: Level) -> (&'static str, &'static str) {
        match level {
            Level::Error => ("\x1B[1;31m", "ERROR"),
            Level::Warn => ("\x1B[1;33m", "WARN "),
            Level::Info => ("\x1B[1;32m", "INFO "),
            Level::Debug => ("\x1B[1;36m", "DEBUG"),
            Level::Trace => ("\x1B[1;35m", "TRACE"),
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
            let (color, tag) = Self::style_for_level(record.level());

            let mut stderr = std::io::stderr();
            let _ = writeln!(stderr, "{}{} {} {}\x1B[0m", color, now, tag, record.args());
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Trace lets set_max_level raise the level after the config is read
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(*shell, &mut cmd, "subflow", &mut std::io::stdout());
        return Ok(());
    }

    let mut config = Config::load_or_create(&cli.config)?;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone().into();
    }
    log::set_max_level(config.log_level.to_level_filter());

    config.validate().context("Configuration validation failed")?;

    let timeout = Duration::from_secs(cli.timeout);
    match cli.command {
        Commands::Translate(args) => run_translate(config, args, timeout).await,
        Commands::Reprocess {
            job_id,
            provider,
            wait,
        } => {
            let controller = AppController::new(config)?;
            controller.resume_interrupted().await?;
            let job = controller.reprocess(job_id, provider.map(Into::into)).await?;
            info!("Job {} is processing again (retry {})", job.id, job.retry_attempts);
            if wait {
                wait_and_report(&controller, job.id, timeout).await
            } else {
                controller.shutdown_idle().await;
                Ok(())
            }
        }
        Commands::Resume => {
            let controller = AppController::new(config)?;
            let resumed = controller.resume_interrupted().await?;
            println!("Resumed {} jobs", resumed);
            controller.shutdown_idle().await;
            Ok(())
        }
        Commands::Status { job_id } => {
            let controller = AppController::new(config)?;
            let (job, progress) = controller.job_status(job_id).await?;
            print_job(&job, Some(&progress));
            Ok(())
        }
        Commands::Jobs { status, limit } => {
            let controller = AppController::new(config)?;
            let jobs = controller.list_jobs(status.map(Into::into), limit).await?;
            if jobs.is_empty() {
                println!("No jobs found");
            }
            for job in &jobs {
                print_job(job, None);
            }
            println!("{}", controller.store_stats().await?);
            Ok(())
        }
        Commands::Delete { job_id } => {
            let controller = AppController::new(config)?;
            if controller.delete_job(job_id).await? {
                println!("Deleted job {}", job_id);
                Ok(())
            } else {
                Err(anyhow!("Job {} not found", job_id))
            }
        }
        Commands::Completions { .. } => Ok(()),
    }
}

async fn run_translate(config: Config, args: TranslateArgs, timeout: Duration) -> Result<()> {
    let mut components = Components::from_config(&config)?;
    if let Some(path) = &args.source_file {
        let source = StaticSource::from_file(path, args.source_language.clone())?;
        components = components.with_source(Arc::new(source));
    }
    let controller = AppController::with_components(config, components);
    if args.source_file.is_none() {
        controller.resume_interrupted().await?;
    }

    let scope = RequesterScope::from_password(args.password.as_deref());
    let outcome = controller
        .request_subtitle(
            &args.stream_id,
            &args.language,
            scope,
            args.provider.map(Into::into),
        )
        .await?;

    if outcome.created {
        info!("Created job {} ({})", outcome.job_id, outcome.status);
    } else {
        warn!("Job {} already exists ({})", outcome.job_id, outcome.status);
    }
    println!("Artifact: {}", outcome.artifact);

    if args.wait && outcome.status == JobStatus::Processing {
        wait_and_report(&controller, outcome.job_id, timeout).await?;
    } else {
        // The in-process queues stop with the process
        controller.shutdown_idle().await;
    }

    Ok(())
}

async fn wait_and_report(controller: &AppController, job_id: i64, timeout: Duration) -> Result<()> {
    let progress_bar = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches ({percent}%) {msg}")
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress_bar.set_style(style.progress_chars("█▓▒░"));

    let job = controller
        .wait_for_job(job_id, timeout, |job, progress| {
            progress_bar.set_length(u64::from(progress.total));
            progress_bar.set_position(u64::from(progress.completed));
            progress_bar.set_message(job.status.to_string());
            progress_bar.tick();
        })
        .await?;
    progress_bar.finish_and_clear();

    print_job(&job, None);
    match job.status {
        JobStatus::Completed => {
            println!("Usage: {}", job.usage_total);
            Ok(())
        }
        JobStatus::Processing => {
            warn!("Job {} is still processing; `subflow resume` picks it up", job_id);
            Err(anyhow!("Job {} did not finish within {:?}", job_id, timeout))
        }
        status => Err(anyhow!(
            "Job {} ended {}: {}",
            job_id,
            status,
            job.error_message.as_deref().unwrap_or("no reason recorded")
        )),
    }
}

fn print_job(job: &JobRecord, progress: Option<&BatchProgress>) {
    let episode = match (job.season, job.episode) {
        (Some(season), Some(episode)) => format!(" S{:02}E{:02}", season, episode),
        _ => String::new(),
    };
    println!(
        "#{} {}{} [{}] {} retries={} usage={} updated={}",
        job.id,
        job.media_id,
        episode,
        job.language,
        job.status,
        job.retry_attempts,
        job.usage_total,
        job.updated_at
    );
    if let Some(progress) = progress {
        println!("    {}", progress);
    }
    if let Some(error) = &job.error_message {
        println!("    error: {}", error);
    }
    println!("    artifact: {}", job.artifact_path);
}
