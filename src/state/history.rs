use crate::url::CanonicalUrl;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// One completed fetch attempt for a URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestRecord {
    /// HTTP status code, 0 when no response arrived
    pub status: u16,

    /// Body size in bytes
    pub size: usize,

    /// Wall-clock time the request was issued
    pub start_time: DateTime<Utc>,

    /// Time to first byte in milliseconds
    pub ttfb_ms: u64,

    /// Total request time in milliseconds
    pub time_ms: u64,

    /// Link extraction time in milliseconds
    pub parse_time_ms: u64,
}

/// One discovered URL, pending or already fetched
#[derive(Debug, Clone, Serialize)]
pub struct FrontierEntry {
    /// The canonical URL
    pub url: CanonicalUrl,

    /// Fullpaths of every page that linked here ("" for direct seeds)
    pub referrers: BTreeSet<String>,

    /// Completed request attempts, oldest first
    pub requests: Vec<RequestRecord>,
}

impl FrontierEntry {
    fn last_request(&self) -> Option<&RequestRecord> {
        self.requests.last()
    }
}

/// Sort keys accepted by [`History::view`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    FullPath,
    Requests,
    Referrers,
    Status,
    ResponseTime,
}

/// Sort direction for [`History::view`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// Deduplicating frontier plus the permanent log of every discovered URL
///
/// A URL enters the log at most once, keyed by its `fullpath`. Re-discovery
/// only records another referrer; it never queues the URL again.
#[derive(Debug, Default)]
pub struct History {
    /// URLs waiting to be fetched, oldest first
    queue: VecDeque<CanonicalUrl>,

    /// Every URL ever pushed this session, by fullpath
    logs: HashMap<String, FrontierEntry>,

    /// Number of distinct URLs discovered this session
    total: usize,
}

impl History {
    /// Creates an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a discovered URL
    ///
    /// Unseen URLs are logged and appended to the pending queue. The referrer is
    /// recorded either way.
    ///
    /// # Returns
    ///
    /// * `true` - The URL was new and has been queued
    /// * `false` - The URL was already known
    pub fn push(&mut self, url: CanonicalUrl, referrer: Option<&str>) -> bool {
        let referrer = referrer.unwrap_or_default().to_string();

        if let Some(entry) = self.logs.get_mut(&url.fullpath) {
            entry.referrers.insert(referrer);
            return false;
        }

        tracing::trace!("Discovered {}", url);
        self.queue.push_back(url.clone());
        self.total += 1;
        self.logs.insert(
            url.fullpath.clone(),
            FrontierEntry {
                url,
                referrers: BTreeSet::from([referrer]),
                requests: Vec::new(),
            },
        );
        true
    }

    /// Pops the oldest pending URL
    pub fn next(&mut self) -> Option<CanonicalUrl> {
        self.queue.pop_front()
    }

    /// Appends a request record to an already discovered URL; `false` if the
    /// URL was never pushed
    pub fn log(&mut self, url: &CanonicalUrl, record: RequestRecord) -> bool {
        match self.logs.get_mut(&url.fullpath) {
            Some(entry) => {
                entry.requests.push(record);
                true
            }
            None => {
                tracing::warn!("Dropping request record for unknown URL {}", url);
                false
            }
        }
    }

    /// Clears pending URLs while keeping the log
    pub fn empty_queue(&mut self) {
        self.queue.clear();
    }

    /// Clears both the pending queue and the log
    pub fn reset(&mut self) {
        self.queue.clear();
        self.logs.clear();
        self.total = 0;
    }

    /// Number of URLs waiting to be fetched
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no URLs are waiting to be fetched
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of distinct URLs discovered this session
    pub fn total(&self) -> usize {
        self.total
    }

    /// Looks up a logged entry by fullpath
    pub fn get(&self, fullpath: &str) -> Option<&FrontierEntry> {
        self.logs.get(fullpath)
    }

    /// Returns up to `limit` logged entries in the requested order
    ///
    /// This is a read-only reporting query. A `limit` of `None` returns every entry.
    pub fn view(
        &self,
        limit: Option<usize>,
        sort: SortKey,
        direction: Direction,
    ) -> Vec<&FrontierEntry> {
        let mut entries: Vec<&FrontierEntry> = self.logs.values().collect();

        entries.sort_by(|a, b| {
            let ordering = match sort {
                SortKey::FullPath => a.url.fullpath.cmp(&b.url.fullpath),
                SortKey::Requests => a.requests.len().cmp(&b.requests.len()),
                SortKey::Referrers => a.referrers.len().cmp(&b.referrers.len()),
                SortKey::Status => a
                    .last_request()
                    .map(|r| r.status)
                    .cmp(&b.last_request().map(|r| r.status)),
                SortKey::ResponseTime => a
                    .last_request()
                    .map(|r| r.time_ms)
                    .cmp(&b.last_request().map(|r| r.time_ms)),
            }
            .then_with(|| a.url.fullpath.cmp(&b.url.fullpath));

            match direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            }
        });

        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        entries
    }
}
