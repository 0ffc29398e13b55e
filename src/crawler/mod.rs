//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching behind a pluggable transport
//! - Link extraction strategies and the parse worker pool
//! - Admission scheduling and rate limiting
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod parser;
mod pool;
mod scheduler;

pub use coordinator::{BeforeRequest, CrawlHandle, Crawler};
pub use fetcher::{BodyStream, FetchRequest, HttpTransport, Transport, TransportResponse};
pub use parser::{extractor_by_name, HtmlExtractor, LinkExtractor, RegexExtractor, DEFAULT_PARSER};
pub use pool::{ParseJob, ParseResult, ParserPool};
pub use scheduler::{Scheduler, Tick};

use crate::config::CrawlOptions;
use std::sync::Arc;

/// User agent sent by [`crawl`] and the command line tool
pub const DEFAULT_USER_AGENT: &str = concat!("Trawler/", env!("CARGO_PKG_VERSION"));

/// Runs a complete crawl operation
///
/// This is the main entry point for a one-shot crawl. It will:
/// 1. Build an HTTP transport
/// 2. Configure a crawler from `options`
/// 3. Fetch pages and follow links until a stop condition is met
pub async fn crawl(options: CrawlOptions) -> crate::Result<Crawler> {
    let transport = Arc::new(HttpTransport::new(DEFAULT_USER_AGENT)?);
    let mut crawler = Crawler::with_options(transport, options)?;
    crawler.run().await;
    Ok(crawler)
}
