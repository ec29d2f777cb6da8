//! Sumi-Mirror main entry point
//!
//! This is the command-line interface for the Sumi-Mirror website mirror.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use sumi_mirror::config::{load_config, validate, Config};
use sumi_mirror::crawler::crawl;
use sumi_mirror::MirrorError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sumi-Mirror: an offline website mirror
///
/// Sumi-Mirror downloads a website starting from one URL, stores its pages
/// and assets in a local directory and rewrites links so the copy can be
/// browsed offline. Running it again only fetches what changed.
#[derive(Parser, Debug)]
#[command(name = "sumi-mirror")]
#[command(version)]
#[command(about = "An offline website mirror", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start URL, overriding the configuration
    #[arg(long)]
    url: Option<String>,

    /// Output directory, overriding the configuration
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Validate config and show what would be mirrored without fetching anything
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if let Some(url) = cli.url {
        config.url = url;
    }
    if let Some(output) = cli.output {
        config.output.directory = output.to_string_lossy().into_owned();
    }
    validate(&config).context("invalid configuration")?;

    if cli.dry_run {
        print_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_mirror=info,warn"),
            1 => EnvFilter::new("sumi_mirror=debug,info"),
            2 => EnvFilter::new("sumi_mirror=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective configuration
fn print_dry_run(config: &Config) {
    println!("=== Sumi-Mirror Dry Run ===\n");

    println!("Start URL: {}", config.url);
    println!("Output directory: {}", config.output.directory);

    println!("\nCrawler:");
    println!("  Concurrency: {}", config.crawler.concurrency);
    match config.crawler.max_depth {
        0 => println!("  Max depth: unlimited"),
        depth => println!("  Max depth: {}", depth),
    }
    println!("  Tries: {}", config.crawler.tries);
    println!("  Retry delay: {}ms", config.crawler.retry_delay_ms);
    println!("  Timeout: {}s", config.crawler.timeout_secs);
    match config.crawler.image_quality {
        0 => println!("  Image recoding: off"),
        quality => println!("  Image recoding: quality {}", quality),
    }
    for pattern in &config.crawler.includes {
        println!("  Include: {}", pattern);
    }
    for pattern in &config.crawler.excludes {
        println!("  Exclude: {}", pattern);
    }

    println!("\nThrottle:");
    println!(
        "  Delay: {}ms - {}ms (step {}ms)",
        config.throttle.min_delay_ms, config.throttle.max_delay_ms, config.throttle.step_ms
    );

    println!("\nHTTP:");
    println!("  User agent: {}", config.http.user_agent);
    if let Some(proxy) = &config.http.proxy {
        println!("  Proxy: {}", proxy);
    }
    if let Some(username) = &config.http.username {
        println!("  Basic auth user: {}", username);
    }
    println!("  Extra headers: {}", config.http.headers.len());
    println!("  Cookies: {}", config.http.cookies.len());

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping crawl");
            on_signal.cancel();
        }
    });

    match crawl(config, &cancel).await {
        Ok(stats) => {
            tracing::info!(
                "Crawl completed successfully: {} pages, {} assets",
                stats.pages_written,
                stats.assets_written
            );
            Ok(())
        }
        Err(MirrorError::Cancelled) => {
            tracing::warn!("Crawl cancelled");
            Err(MirrorError::Cancelled.into())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
