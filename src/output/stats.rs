//! Periodic crawl metrics
//!
//! This module provides the rolling one-second metrics window the controller
//! feeds while requests open and close, and the [`MetricsSnapshot`] it emits.

use crate::url::CanonicalUrl;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Request counters for one window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestCounters {
    /// Requests completed since the crawl started
    pub total: usize,

    /// Requests opened during this window
    pub opened: usize,

    /// Requests closed during this window
    pub closed: usize,

    /// Requests in flight when the window closed
    pub active: usize,

    /// URLs waiting in the frontier when the window closed
    pub queued: usize,

    /// URLs opened during this window
    pub urls: Vec<String>,
}

/// Response counters for one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseCounters {
    /// Status code histogram (0 = no response)
    pub codes: BTreeMap<u16, usize>,

    /// Time-to-first-byte samples in milliseconds
    pub ttfb: Vec<u64>,
}

impl Default for ResponseCounters {
    fn default() -> Self {
        Self {
            codes: BTreeMap::from([(0, 0), (200, 0)]),
            ttfb: Vec::new(),
        }
    }
}

/// One metrics window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// When the window opened
    pub timestamp: DateTime<Utc>,
    pub requests: RequestCounters,
    pub responses: ResponseCounters,

    /// Body bytes received during this window
    pub bandwidth: u64,
}

impl MetricsSnapshot {
    fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            requests: RequestCounters::default(),
            responses: ResponseCounters::default(),
            bandwidth: 0,
        }
    }

    /// Number of responses recorded with the given status code
    pub fn code_count(&self, status: u16) -> usize {
        self.responses.codes.get(&status).copied().unwrap_or(0)
    }
}

/// Controller-wide counters copied into a snapshot when it is emitted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub completed: usize,
    pub active: usize,
    pub queued: usize,
}

/// Accumulates counters and emits at most one snapshot per [`MetricsWindow::PERIOD`]
#[derive(Debug)]
pub struct MetricsWindow {
    current: MetricsSnapshot,
    opened_at: Instant,
}

impl Default for MetricsWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsWindow {
    /// Minimum time between two unforced snapshots
    pub const PERIOD: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self {
            current: MetricsSnapshot::new(),
            opened_at: Instant::now(),
        }
    }

    /// Records a request being issued
    pub fn record_open(&mut self, url: &CanonicalUrl) {
        self.current.requests.opened += 1;
        self.current.requests.urls.push(url.fullpath.clone());
    }

    /// Records received body bytes
    pub fn record_bytes(&mut self, len: usize) {
        self.current.bandwidth += len as u64;
    }

    /// Records a request finishing, successfully or not
    pub fn record_close(&mut self, status: u16, ttfb: Duration) {
        self.current.requests.closed += 1;
        *self.current.responses.codes.entry(status).or_insert(0) += 1;
        self.current.responses.ttfb.push(ttfb.as_millis() as u64);
    }

    /// Closes the window if it is due (or `force` is set)
    ///
    /// # Returns
    ///
    /// * `Some(MetricsSnapshot)` - The closed window; a fresh one starts now
    /// * `None` - Less than a period has passed since the window opened
    pub fn poll(&mut self, force: bool, totals: Totals) -> Option<MetricsSnapshot> {
        if !force && self.opened_at.elapsed() < Self::PERIOD {
            return None;
        }

        let mut snapshot = std::mem::replace(&mut self.current, MetricsSnapshot::new());
        self.opened_at = Instant::now();

        snapshot.requests.total = totals.completed;
        snapshot.requests.active = totals.active;
        snapshot.requests.queued = totals.queued;
        Some(snapshot)
    }
}

/// Prints one snapshot to stdout as a single line
pub fn print_snapshot(snapshot: &MetricsSnapshot) {
    let codes: Vec<String> = snapshot
        .responses
        .codes
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(code, count)| format!("{}:{}", code, count))
        .collect();

    let ttfb = if snapshot.responses.ttfb.is_empty() {
        0
    } else {
        snapshot.responses.ttfb.iter().sum::<u64>() / snapshot.responses.ttfb.len() as u64
    };

    println!(
        "[{}] total {} | open {} close {} | active {} queued {} | codes [{}] | ttfb {}ms | {} bytes",
        snapshot.timestamp.format("%H:%M:%S"),
        snapshot.requests.total,
        snapshot.requests.opened,
        snapshot.requests.closed,
        snapshot.requests.active,
        snapshot.requests.queued,
        codes.join(" "),
        ttfb,
        snapshot.bandwidth
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::UrlOptions;

    fn url(raw: &str) -> CanonicalUrl {
        CanonicalUrl::parse(raw, None, UrlOptions::default()).unwrap()
    }

    #[test]
    fn test_codes_seeded() {
        let snapshot = MetricsSnapshot::new();
        assert_eq!(snapshot.code_count(0), 0);
        assert_eq!(snapshot.code_count(200), 0);
        assert_eq!(snapshot.responses.codes.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_waits_for_period() {
        let mut window = MetricsWindow::new();
        window.record_open(&url("http://example.com/"));

        assert!(window.poll(false, Totals::default()).is_none());

        tokio::time::advance(Duration::from_millis(1000)).await;
        let snapshot = window.poll(false, Totals::default()).unwrap();
        assert_eq!(snapshot.requests.opened, 1);
        assert_eq!(snapshot.requests.urls, vec!["http://example.com/".to_string()]);

        // The next window just opened
        assert!(window.poll(false, Totals::default()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_poll_emits_immediately() {
        let mut window = MetricsWindow::new();
        window.record_close(404, Duration::from_millis(12));
        window.record_bytes(100);
        window.record_bytes(28);

        let totals = Totals {
            completed: 7,
            active: 2,
            queued: 3,
        };
        let snapshot = window.poll(true, totals).unwrap();

        assert_eq!(snapshot.requests.closed, 1);
        assert_eq!(snapshot.requests.total, 7);
        assert_eq!(snapshot.requests.active, 2);
        assert_eq!(snapshot.requests.queued, 3);
        assert_eq!(snapshot.code_count(404), 1);
        assert_eq!(snapshot.responses.ttfb, vec![12]);
        assert_eq!(snapshot.bandwidth, 128);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_counters() {
        let mut window = MetricsWindow::new();
        window.record_close(200, Duration::ZERO);
        window.poll(true, Totals::default());

        let snapshot = window.poll(true, Totals::default()).unwrap();
        assert_eq!(snapshot.requests.closed, 0);
        assert_eq!(snapshot.code_count(200), 0);
        assert_eq!(snapshot.bandwidth, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = MetricsSnapshot::new();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["requests"]["opened"], 0);
        assert_eq!(json["responses"]["codes"]["200"], 0);
    }
}
