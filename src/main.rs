//! Trawler main entry point
//!
//! This is the command-line interface for the Trawler crawler engine.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use trawler::config::load_options_with_hash;
use trawler::crawler::DEFAULT_USER_AGENT;
use trawler::output::{print_history, print_snapshot};
use trawler::state::{Direction, SortKey};
use trawler::{CrawlEvent, CrawlOptions, Crawler, HttpTransport, StopReason};
use tracing_subscriber::EnvFilter;

/// Trawler: a scoped, rate-limited web crawler
///
/// Trawler starts from a seed URL, follows links within the configured scope,
/// and reports per-second metrics plus a history of every page it fetched.
#[derive(Parser, Debug)]
#[command(name = "trawler")]
#[command(version)]
#[command(about = "A scoped, rate-limited web crawler", long_about = None)]
struct Cli {
    /// Seed URL (overrides `base-url` from the config file)
    #[arg(value_name = "URL")]
    url: Option<String>,

    /// Path to TOML options file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum distinct URLs to discover (0 = unlimited)
    #[arg(long)]
    limit: Option<usize>,

    /// Requests started per second
    #[arg(long)]
    rate: Option<u32>,

    /// Maximum requests in flight
    #[arg(long)]
    concurrent: Option<usize>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    wait: Option<u64>,

    /// Running-time budget in milliseconds (0 = unlimited)
    #[arg(long)]
    duration: Option<u64>,

    /// Number of parse worker threads (0 = parse in-process)
    #[arg(long)]
    threads: Option<usize>,

    /// Link extraction strategy (regex, html)
    #[arg(long)]
    parser: Option<String>,

    /// Follow links to hosts outside the seed's domain
    #[arg(long)]
    follow_external: bool,

    /// Follow links to subdomains of the seed host
    #[arg(long)]
    follow_subdomain: bool,

    /// Treat URLs differing only in query string as distinct pages
    #[arg(long)]
    query_strings: bool,

    /// Treat URL paths as case-sensitive
    #[arg(long)]
    case_sensitive: bool,

    /// Print metrics and lifecycle events as JSON lines
    #[arg(long)]
    json: bool,

    /// Print up to N history entries after the crawl
    #[arg(long, value_name = "N")]
    report: Option<usize>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    /// Options given on the command line; these win over the config file
    fn options(&self) -> CrawlOptions {
        let flag = |set: bool| set.then_some(true);

        CrawlOptions {
            base_url: self.url.clone(),
            url_limit: self.limit,
            request_maxpersecond: self.rate,
            request_concurrent: self.concurrent,
            request_wait: self.wait,
            duration: self.duration,
            parser_threads: self.threads,
            parser_method: self.parser.clone(),
            follow_external: flag(self.follow_external),
            follow_subdomain: flag(self.follow_subdomain),
            query_strings: flag(self.query_strings),
            case_sensitive: flag(self.case_sensitive),
            ..CrawlOptions::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let file_options = match &cli.config {
        Some(path) => {
            tracing::info!("Loading options from: {}", path.display());
            let (options, hash) = load_options_with_hash(path)
                .with_context(|| format!("Failed to load options from {}", path.display()))?;
            tracing::info!("Options loaded successfully (hash: {})", hash);
            options
        }
        None => CrawlOptions::default(),
    };
    let options = file_options.overlay(cli.options());

    if options.base_url.is_none() {
        anyhow::bail!("No seed URL: pass one on the command line or set base-url in the config");
    }

    let transport = Arc::new(HttpTransport::new(DEFAULT_USER_AGENT)?);
    let mut crawler = Crawler::with_options(transport, options)?;

    let printer = tokio::spawn(print_events(crawler.subscribe(), cli.json, cli.quiet));

    let handle = crawler.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight requests");
            handle.stop(StopReason::Interrupted);
        }
    });

    let reason = crawler.run().await;
    tracing::info!(
        "Crawl finished ({}): {} pages fetched, {} URLs discovered",
        reason,
        crawler.completed_requests(),
        crawler.history().total()
    );

    // The printer exits once it sees the completion event
    if let Err(e) = printer.await {
        tracing::error!("Event printer failed: {}", e);
    }

    if let Some(limit) = cli.report {
        let entries = crawler
            .history()
            .view(Some(limit), SortKey::default(), Direction::default());
        print_history(&entries);
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trawler=info,warn"),
            1 => EnvFilter::new("trawler=debug,info"),
            2 => EnvFilter::new("trawler=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Prints crawl notifications until the crawl completes
async fn print_events(
    mut events: tokio::sync::broadcast::Receiver<CrawlEvent>,
    json: bool,
    quiet: bool,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Dropped {} crawl events", skipped);
                continue;
            }
            Err(RecvError::Closed) => return,
        };

        let done = matches!(event, CrawlEvent::Complete { .. });

        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::error!("Failed to serialize event: {}", e),
            }
        } else if !quiet {
            match &event {
                CrawlEvent::Metrics(snapshot) => print_snapshot(snapshot),
                CrawlEvent::Started => println!("started"),
                CrawlEvent::Paused => println!("paused"),
                CrawlEvent::Complete { reason } => println!("complete: {}", reason),
            }
        }

        if done {
            return;
        }
    }
}
