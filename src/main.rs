use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use community_post_archiver::api::{CookieJar, HttpTransport, InnertubeClient};
use community_post_archiver::config::{Config, ConfigError};
use community_post_archiver::media::ImageDownloader;
use community_post_archiver::output::OutputManager;
use community_post_archiver::resolver::ChannelResolver;
use community_post_archiver::scraper::CommunityScraper;
use community_post_archiver::target::{parse_target, Target};
use community_post_archiver::ArchiverError;

const EXIT_UNEXPECTED: u8 = 1;
const EXIT_VALIDATION: u8 = 2;
const EXIT_NETWORK: u8 = 3;
const EXIT_RATE_LIMITED: u8 = 4;
const EXIT_IO: u8 = 5;
const EXIT_APPLICATION: u8 = 6;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "post-archiver")]
#[command(version, about = "Archive a YouTube channel's community posts, comments and replies")]
struct Cli {
    /// Channel id, @handle, channel URL, post id or post URL
    target: String,

    /// Stop after this many posts (0 = all)
    #[arg(short = 'n', long)]
    max_posts: Option<usize>,

    /// Also archive comments and replies
    #[arg(short, long)]
    comments: bool,

    /// Maximum comments per post
    #[arg(long)]
    max_comments: Option<usize>,

    /// Maximum replies per comment
    #[arg(long)]
    max_replies: Option<usize>,

    /// Download post images next to the archive
    #[arg(long)]
    download_images: bool,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Exact archive file path (overrides the generated name)
    #[arg(long)]
    output_file: Option<PathBuf>,

    /// Write compact JSON
    #[arg(long)]
    compact: bool,

    /// Skip the summary report
    #[arg(long)]
    no_summary: bool,

    /// Netscape-format cookie file for signed-in requests
    #[arg(long)]
    cookies: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Retries per request
    #[arg(long)]
    max_retries: Option<u32>,

    /// Base retry delay in seconds
    #[arg(long)]
    retry_delay: Option<f64>,

    /// Posts whose comments are fetched concurrently
    #[arg(long)]
    concurrency: Option<usize>,

    /// Config file to load
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective configuration to this file
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// More output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Debug output for this crate
    #[arg(long)]
    debug: bool,

    /// Errors only
    #[arg(short, long, conflicts_with_all = ["verbose", "debug"])]
    quiet: bool,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// CLI flags win over the config file and environment.
    fn apply(&self, config: &mut Config) {
        let s = &mut config.scraping;
        if let Some(max) = self.max_posts {
            s.max_posts = (max > 0).then_some(max);
        }
        if self.comments {
            s.extract_comments = true;
        }
        if let Some(max) = self.max_comments {
            s.max_comments_per_post = max;
        }
        if let Some(max) = self.max_replies {
            s.max_replies_per_comment = max;
        }
        if self.download_images {
            s.download_images = true;
        }
        if let Some(path) = &self.cookies {
            s.cookies_file = Some(path.clone());
        }
        if let Some(secs) = self.timeout {
            s.request_timeout_secs = secs;
        }
        if let Some(retries) = self.max_retries {
            s.max_retries = retries;
        }
        if let Some(delay) = self.retry_delay {
            s.retry_delay_secs = delay;
        }
        if let Some(n) = self.concurrency {
            s.comment_concurrency = n;
        }

        if let Some(dir) = &self.output_dir {
            config.output.output_dir = Some(dir.clone());
        }
        if self.compact {
            config.output.pretty_print = false;
        }
        if self.no_summary {
            config.output.include_summary = false;
        }
        if let Some(path) = &self.log_file {
            config.log_file = Some(path.clone());
        }
    }

    fn default_filter(&self) -> &'static str {
        if self.quiet {
            "error"
        } else if self.debug || self.verbose >= 2 {
            "warn,community_post_archiver=debug,post_archiver=debug"
        } else if self.verbose == 1 {
            "info"
        } else {
            "warn"
        }
    }
}

enum Outcome {
    Completed,
    Interrupted,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(Outcome::Completed) => ExitCode::SUCCESS,
        Ok(Outcome::Interrupted) => ExitCode::from(EXIT_INTERRUPTED),
        Err(e) => {
            error!("Fatal error: {e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(error: &anyhow::Error) -> u8 {
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<ArchiverError>() {
            return match e {
                ArchiverError::Validation(_) | ArchiverError::Config(_) => EXIT_VALIDATION,
                ArchiverError::RateLimited { .. } => EXIT_RATE_LIMITED,
                ArchiverError::Network { .. } => EXIT_NETWORK,
                ArchiverError::Io(_) => EXIT_IO,
                ArchiverError::Parse(_) | ArchiverError::NotFound(_) => EXIT_APPLICATION,
            };
        }
        if cause.is::<ConfigError>() {
            return EXIT_VALIDATION;
        }
        if cause.is::<std::io::Error>() {
            return EXIT_IO;
        }
    }
    EXIT_UNEXPECTED
}

async fn run() -> Result<Outcome> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);

    init_tracing(cli.default_filter(), config.log_file.as_deref())?;
    config.validate().context("Invalid configuration")?;

    if let Some(path) = &cli.save_config {
        config
            .save(path)
            .with_context(|| format!("Failed to save configuration to {}", path.display()))?;
        info!(path = %path.display(), "Configuration saved");
    }

    let target = parse_target(&cli.target)?;
    info!(target = %target, "Starting post-archiver");

    let cookies = match &config.scraping.cookies_file {
        Some(path) => Some(
            CookieJar::from_netscape_file(path)
                .await
                .with_context(|| format!("Failed to read cookie file: {}", path.display()))?,
        ),
        None => None,
    };

    let throttle = Arc::new(config.host_throttle());
    let transport = HttpTransport::new(config.transport_settings(), cookies.clone(), throttle)?;
    let client = InnertubeClient::new(Arc::new(transport), &config.scraping.api_base_url);
    let resolver = ChannelResolver::new(
        &config.scraping.site_base_url,
        Duration::from_secs(config.scraping.request_timeout_secs),
        cookies.as_ref(),
    )?;

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Interrupted, finishing with the data gathered so far");
        signal_cancel.cancel();
    });

    let (channel_id, post_id) = match &target {
        Target::ChannelId(id) => (id.clone(), None),
        Target::Handle(handle) => (resolver.resolve_handle(handle).await?, None),
        Target::CustomName(name) => (resolver.resolve_custom_name(name).await?, None),
        Target::Post(id) => (resolver.resolve_post_channel(id).await?, Some(id.clone())),
    };

    let scraper = CommunityScraper::new(client, config.scrape_settings(), cancel.clone());
    let mut archive = match &post_id {
        Some(post_id) => {
            let post = scraper.scrape_post(&channel_id, post_id).await?;
            scraper.archive(&channel_id, vec![post])
        }
        None => scraper.scrape_channel(&channel_id).await?,
    };

    let output_dir = config.output_dir();
    if config.scraping.download_images && !cancel.is_cancelled() {
        let downloader = ImageDownloader::new(
            Duration::from_secs(config.scraping.request_timeout_secs),
            config.scraping.max_retries,
            config.retry_delay(),
        )?;
        downloader
            .download_post_images(&mut archive.posts, &output_dir)
            .await;
    }

    archive.metadata.config_used = config.to_metadata();
    let output = OutputManager::new(&output_dir, config.output.pretty_print);
    let archive_path = output
        .save_archive(&mut archive, cli.output_file.as_deref())
        .await?;
    println!("{}", archive_path.display());

    if config.output.include_summary {
        match output.save_summary(&archive).await {
            Ok(path) => info!(path = %path.display(), "Summary written"),
            Err(e) => warn!("Failed to write summary: {e:#}"),
        }
    }

    info!(
        posts = archive.metadata.posts_count,
        comments = archive.metadata.total_comments,
        images = archive.metadata.total_images,
        warnings = archive.metadata.warnings,
        "Archive complete"
    );

    if cancel.is_cancelled() {
        return Ok(Outcome::Interrupted);
    }
    Ok(Outcome::Completed)
}

fn init_tracing(default_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
