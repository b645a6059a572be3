//! Kumo-Loom main entry point
//!
//! This is the command-line interface for the Kumo-Loom scrape orchestrator.
//! It runs one job locally against the bundled HTTP fetch engine and prints
//! the job's progress stream, the same path a queue worker drives in a
//! deployment.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use kumo_loom::config::{load_config, Config};
use kumo_loom::fetch::HttpFetcher;
use kumo_loom::limiter::{Subject, Tier};
use kumo_loom::progress::Subscription;
use kumo_loom::service::ScrapeService;
use kumo_loom::JobId;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Kumo-Loom: a tiered scrape orchestrator
///
/// Submits one scraping job (single page, bulk batch, or site crawl),
/// executes it locally, and streams its progress events to the terminal.
#[derive(Parser, Debug)]
#[command(name = "kumo-loom")]
#[command(version)]
#[command(about = "A tiered scrape orchestrator", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Subject id the work is charged to
    #[arg(long, default_value = "cli-local")]
    subject: String,

    /// Subscription tier of the subject (free, starter, pro, enterprise)
    #[arg(long, default_value = "enterprise")]
    tier: String,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and show the effective settings
    Check,

    /// Scrape a single URL
    Scrape {
        /// The URL to scrape
        url: String,
    },

    /// Scrape a batch of URLs concurrently
    Bulk {
        /// The URLs to scrape (1 to 50)
        urls: Vec<String>,
    },

    /// Crawl a site breadth-first from a start URL
    Crawl {
        /// The start URL
        url: String,

        /// Override the page budget from the config
        #[arg(long)]
        budget: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => Config::default(),
    };

    let subject = Subject::new(cli.subject.clone(), parse_tier(&cli.tier)?);

    match cli.command {
        Command::Check => handle_check(&config),
        Command::Scrape { url } => handle_scrape(config, subject, url).await,
        Command::Bulk { urls } => handle_bulk(config, subject, urls).await,
        Command::Crawl { url, budget } => handle_crawl(config, subject, url, budget).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("kumo_loom=info,warn"),
            1 => EnvFilter::new("kumo_loom=debug,info"),
            2 => EnvFilter::new("kumo_loom=trace,debug"),
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

fn parse_tier(name: &str) -> anyhow::Result<Tier> {
    Tier::parse(name).ok_or_else(|| {
        anyhow::anyhow!(
            "unknown tier '{}', expected free|starter|pro|enterprise",
            name
        )
    })
}

fn build_service(config: &Config) -> anyhow::Result<ScrapeService> {
    let fetcher = HttpFetcher::new(&config.scraper.user_agent)
        .context("building the HTTP fetch engine")?;
    Ok(ScrapeService::new(config, Arc::new(fetcher)))
}

/// Handles the check mode: validates config and shows effective settings
fn handle_check(config: &Config) -> anyhow::Result<()> {
    println!("=== Kumo-Loom Configuration ===\n");

    println!("Service:");
    println!("  Max retries: {}", config.service.max_retries);
    println!("  Retry base delay: {}ms", config.service.retry_base_delay_ms);

    println!("\nScraper defaults:");
    println!("  JS rendering: {}", config.scraper.js_rendering);
    println!("  Page timeout: {}ms", config.scraper.page_timeout_ms);
    println!("  Max concurrent: {}", config.scraper.max_concurrent);
    println!("  Page budget: {}", config.scraper.page_budget);
    println!("  Request delay: {}ms", config.scraper.request_delay_ms);
    println!("  Follow links: {}", config.scraper.follow_links);
    println!("  User agent: {}", config.scraper.user_agent);

    if config.quotas.is_empty() {
        println!("\nQuotas: stock table");
    } else {
        println!("\nQuota overrides:");
        for (tier, ops) in &config.quotas {
            for (op, policy) in ops {
                println!(
                    "  {}/{}: {} per {}s",
                    tier, op, policy.max_requests, policy.window_seconds
                );
            }
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles a single-URL scrape
async fn handle_scrape(config: Config, subject: Subject, url: String) -> anyhow::Result<()> {
    let service = build_service(&config)?;

    let id = service
        .submit_single(&subject, &url, None, None)
        .await
        .context("submission rejected")?;

    run_and_stream(&service, &id).await
}

/// Handles a bulk scrape
async fn handle_bulk(config: Config, subject: Subject, urls: Vec<String>) -> anyhow::Result<()> {
    let service = build_service(&config)?;

    let id = service
        .submit_bulk(&subject, &urls, None, None)
        .await
        .context("submission rejected")?;

    run_and_stream(&service, &id).await
}

/// Handles a site crawl
async fn handle_crawl(
    config: Config,
    subject: Subject,
    url: String,
    budget: Option<u32>,
) -> anyhow::Result<()> {
    let service = build_service(&config)?;

    let mut settings = config.scraper.clone();
    if let Some(budget) = budget {
        settings.page_budget = budget;
    }

    let id = service
        .submit_crawl(&subject, &url, Some(settings), None)
        .await
        .context("submission rejected")?;

    run_and_stream(&service, &id).await
}

/// Runs the job while printing its progress stream, then a summary
async fn run_and_stream(service: &ScrapeService, id: &JobId) -> anyhow::Result<()> {
    println!("Job {} accepted", id);

    let sub = service.subscribe(id);
    let printer = tokio::spawn(print_events(sub));

    let outcome = service.run(id).await;

    // Drain whatever the printer has left, then report.
    let _ = printer.await;

    match outcome {
        Ok(report) => {
            println!(
                "\nDone: {}/{} pages, {} failed",
                report.pages_done,
                report.pages_total,
                report.errors.len()
            );
            for error in &report.errors {
                println!("  ✗ {} — {}", error.url, error.message);
            }
            Ok(())
        }
        Err(e) => {
            bail!("job failed: {}", e);
        }
    }
}

async fn print_events(mut sub: Subscription) {
    while let Some(event) = sub.events.recv().await {
        match event.current_url.as_deref() {
            Some(url) => println!("[{:>3}%] {} ({})", event.percent, event.message, url),
            None => println!("[{:>3}%] {}", event.percent, event.message),
        }
        if event.is_terminal() {
            break;
        }
    }
}
