//! State module for tracking crawl progress
//!
//! This module holds everything the controller mutates while a session runs.
//!
//! # Components
//!
//! - `CrawlStatus`: The controller's lifecycle state (stopped, paused, running)
//! - `History`: The deduplicating frontier plus the permanent log of fetched URLs
//! - `CookieJar`: Domain-bucketed cookies carried between requests

mod cookies;
mod crawl_state;
mod history;

// Re-export main types
pub use cookies::{Cookie, CookieJar};
pub use crawl_state::CrawlStatus;
pub use history::{Direction, FrontierEntry, History, RequestRecord, SortKey};
