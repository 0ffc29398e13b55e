//! Trawler: a scoped, rate-limited web crawler engine
//!
//! This crate discovers and fetches linked pages from a seed URL, extracts outbound
//! links, and keeps a per-URL history of request outcomes while enforcing rate,
//! concurrency, and domain-scope limits. Link extraction can run in-process or
//! fanned out across a pool of worker threads.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod url;

use std::time::Duration;
use thiserror::Error;

/// Main error type for Trawler operations
#[derive(Debug, Error)]
pub enum TrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration-specific errors
///
/// These are the only errors a caller sees synchronously; everything that goes
/// wrong during a crawl is contained per request.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unknown parser method: {0}")]
    UnknownParser(String),

    #[error("Configuration can only change while stopped (currently {0})")]
    NotStopped(state::CrawlStatus),

    #[error("Failed to spawn parse worker: {0}")]
    Worker(#[source] std::io::Error),
}

/// Errors raised by a transport while executing a single request
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Transport error for {url}: {message}")]
    Other { url: String, message: String },
}

/// Result type alias for Trawler operations
pub type Result<T> = std::result::Result<T, TrawlError>;

// Re-export commonly used types
pub use config::{CrawlConfig, CrawlOptions, SeedCookie};
pub use crawler::{
    crawl, CrawlHandle, Crawler, FetchRequest, HttpTransport, LinkExtractor, Transport,
    TransportResponse,
};
pub use output::{CrawlEvent, MetricsSnapshot, StopReason};
pub use state::{CookieJar, CrawlStatus, History};
pub use url::{CanonicalUrl, Scope, UrlOptions};
