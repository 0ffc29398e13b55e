//! Configuration module for Trawler
//!
//! This module handles crawl options: the partial, TOML-loadable [`CrawlOptions`]
//! overlay, the resolved [`CrawlConfig`] with its defaults, and validation.
//!
//! # Example
//!
//! ```no_run
//! use trawler::config::load_options;
//! use std::path::Path;
//!
//! let options = load_options(Path::new("trawler.toml")).unwrap();
//! println!("Crawl will start at: {:?}", options.base_url);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CrawlConfig, CrawlOptions, SeedCookie, DEFAULT_CONCURRENT, DEFAULT_MAX_PER_SECOND,
    DEFAULT_REQUEST_WAIT_MS, DEFAULT_URL_LIMIT,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_options, load_options_with_hash};
pub use validation::validate;
