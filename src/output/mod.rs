//! Output module for crawl notifications and reports
//!
//! This module handles:
//! - The metrics window and its periodic snapshots
//! - Lifecycle notifications and stop reasons
//! - Console rendering of metrics and history for the CLI

mod events;
mod report;
pub mod stats;

pub use events::{CrawlEvent, StopReason};
pub use report::print_history;
pub use stats::{print_snapshot, MetricsSnapshot, MetricsWindow, Totals};
