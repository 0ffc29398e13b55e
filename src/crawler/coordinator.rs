//! Crawl controller - main crawl orchestration logic
//!
//! This module contains the controller that owns one crawl session and drives it:
//! - Configuration and the Stopped/Paused/Running lifecycle
//! - The admission loop that starts requests under rate, concurrency, URL-limit
//!   and duration constraints
//! - Per-request execution: headers, cookies, timeout, response bookkeeping
//! - Feeding page bodies to the parse pool and queueing the links it returns
//! - Metrics windows and lifecycle notifications
//!
//! All session state is mutated from one place, the [`Crawler::run`] loop, so
//! none of it needs locking. Fetches run as spawned tasks that report back over
//! a channel; parse workers reply over another.

use crate::config::{validate, CrawlConfig, CrawlOptions};
use crate::crawler::fetcher::{self, FetchEvent, FetchRequest, Transport};
use crate::crawler::parser::{extractor_by_name, LinkExtractor, RegexExtractor};
use crate::crawler::pool::{ParseJob, ParseResult, ParserPool};
use crate::crawler::scheduler::{Scheduler, Tick};
use crate::output::{CrawlEvent, MetricsWindow, StopReason, Totals};
use crate::state::{CookieJar, CrawlStatus, History, RequestRecord};
use crate::url::{CanonicalUrl, Scope};
use crate::ConfigError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

/// Capacity of the notification channel
const EVENT_CAPACITY: usize = 1024;

/// Hook applied to every outgoing request after headers are merged
pub type BeforeRequest = Arc<dyn Fn(&mut FetchRequest) + Send + Sync>;

/// Commands accepted through a [`CrawlHandle`]
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Start,
    Pause,
    Stop(StopReason),
    Queue(String),
}

/// Cloneable remote control for a crawler driven by [`Crawler::run`]
///
/// Commands are applied by the run loop in the order they were sent. Every
/// method returns `false` once the crawler has been dropped.
#[derive(Debug, Clone)]
pub struct CrawlHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl CrawlHandle {
    /// Starts, or resumes after a pause
    pub fn start(&self) -> bool {
        self.commands.send(Command::Start).is_ok()
    }

    pub fn pause(&self) -> bool {
        self.commands.send(Command::Pause).is_ok()
    }

    pub fn stop(&self, reason: StopReason) -> bool {
        self.commands.send(Command::Stop(reason)).is_ok()
    }

    /// Queues a URL as if passed to [`Crawler::queue`] with no referrer
    pub fn queue(&self, url: impl Into<String>) -> bool {
        self.commands.send(Command::Queue(url.into())).is_ok()
    }
}

/// Book-keeping for one request between issue and parse hand-off
#[derive(Debug)]
struct InFlight {
    url: CanonicalUrl,
    started: Instant,
    start_time: DateTime<Utc>,
    status: u16,
    ttfb: Duration,
}

/// One crawl session
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use trawler::{CrawlOptions, Crawler, HttpTransport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = Arc::new(HttpTransport::new("Trawler/0.1")?);
/// let mut crawler = Crawler::with_options(
///     transport,
///     CrawlOptions {
///         base_url: Some("https://example.com/".to_string()),
///         url_limit: Some(100),
///         ..CrawlOptions::default()
///     },
/// )?;
///
/// let reason = crawler.run().await;
/// println!("Stopped: {} after {} pages", reason, crawler.completed_requests());
/// # Ok(())
/// # }
/// ```
pub struct Crawler {
    config: CrawlConfig,
    scope: Scope,
    status: CrawlStatus,
    last_stop: Option<StopReason>,

    history: History,
    cookies: CookieJar,
    parser: ParserPool,
    scheduler: Scheduler,
    transport: Arc<dyn Transport>,
    before_request: Option<BeforeRequest>,

    window: MetricsWindow,
    events: broadcast::Sender<CrawlEvent>,

    fetch_tx: mpsc::UnboundedSender<FetchEvent>,
    fetch_rx: mpsc::UnboundedReceiver<FetchEvent>,
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: mpsc::UnboundedReceiver<Command>,

    in_flight: HashMap<u64, InFlight>,
    next_request: u64,

    /// Requests issued and not yet through parsing
    request_open: usize,

    /// Requests fully handled this session
    request_completed: usize,
}

impl Crawler {
    /// Creates a stopped crawler with the default configuration
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let config = CrawlConfig::default();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Self {
            scope: config.scope(),
            status: CrawlStatus::Stopped,
            last_stop: None,
            history: History::new(),
            cookies: CookieJar::new(),
            parser: ParserPool::new(Arc::new(RegexExtractor), config.url_options()),
            scheduler: Scheduler::new(config.request_maxpersecond, config.duration),
            transport,
            before_request: None,
            window: MetricsWindow::new(),
            events,
            fetch_tx,
            fetch_rx,
            command_tx,
            command_rx,
            in_flight: HashMap::new(),
            next_request: 0,
            request_open: 0,
            request_completed: 0,
            config,
        }
    }

    /// Creates a stopped crawler and applies `options`
    pub fn with_options(
        transport: Arc<dyn Transport>,
        options: CrawlOptions,
    ) -> Result<Self, ConfigError> {
        let mut crawler = Self::new(transport);
        crawler.configure(options)?;
        Ok(crawler)
    }

    /// Applies a set of options
    ///
    /// Only allowed while stopped. Options are validated as a whole before any
    /// of them takes effect.
    ///
    /// # Side Effects
    ///
    /// - `parser-method` swaps the extraction strategy in every worker
    /// - `parser-threads` resizes the worker pool immediately
    /// - `cookies` replaces the cookie store with the given seeds
    /// - `base-url` sets the scope host and queues the URL
    ///
    /// # Errors
    ///
    /// * `ConfigError::NotStopped` - The crawl is running or paused
    /// * `ConfigError::UnknownParser` - `parser-method` names no registered strategy
    /// * `ConfigError::Worker` - A parse worker thread could not be spawned; no
    ///   option is applied and parsing stays in-process
    /// * Any validation error
    pub fn configure(&mut self, options: CrawlOptions) -> Result<(), ConfigError> {
        if !self.status.is_stopped() {
            return Err(ConfigError::NotStopped(self.status));
        }

        validate(&options)?;

        let extractor = match &options.parser_method {
            Some(name) => Some(
                extractor_by_name(name).ok_or_else(|| ConfigError::UnknownParser(name.clone()))?,
            ),
            None => None,
        };

        let mut config = self.config.clone();
        config.apply(&options);

        let base = match &options.base_url {
            Some(raw) => Some(
                CanonicalUrl::parse(raw, None, config.url_options())
                    .ok_or_else(|| ConfigError::InvalidUrl(raw.clone()))?,
            ),
            None => None,
        };
        if let Some(base) = &base {
            config.host = base.host.clone();
        }

        if let Some(threads) = options.parser_threads {
            self.parser.fork(threads).map_err(ConfigError::Worker)?;
        }

        self.config = config;
        self.scope = self.config.scope();
        self.scheduler
            .configure(self.config.request_maxpersecond, self.config.duration);

        if let Some(extractor) = extractor {
            self.parser.set_extractor(extractor);
        }
        self.parser.set_url_options(self.config.url_options());

        if options.cookies.is_some() {
            self.cookies = CookieJar::with_seeds(&self.config.cookies);
        }

        if let Some(base) = base {
            tracing::info!("Crawl scope host: {}", self.config.host);
            self.history.push(base, None);
        }

        Ok(())
    }

    /// Installs a custom extraction strategy; only allowed while stopped
    pub fn set_extractor(&mut self, extractor: Arc<dyn LinkExtractor>) -> Result<(), ConfigError> {
        if !self.status.is_stopped() {
            return Err(ConfigError::NotStopped(self.status));
        }
        self.parser.set_extractor(extractor);
        Ok(())
    }

    /// Installs a hook that may rewrite every outgoing request
    pub fn on_before_request<F>(&mut self, hook: F)
    where
        F: Fn(&mut FetchRequest) + Send + Sync + 'static,
    {
        self.before_request = Some(Arc::new(hook));
    }

    /// Subscribes to lifecycle and metrics notifications
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.events.subscribe()
    }

    /// Returns a handle that can steer this crawler while `run` is driving it
    pub fn handle(&self) -> CrawlHandle {
        CrawlHandle {
            commands: self.command_tx.clone(),
        }
    }

    /// Canonicalizes `url` and adds it to the frontier, in any state
    ///
    /// Relative URLs are resolved against `referrer`. Returns `true` when the URL
    /// was new.
    pub fn queue(&mut self, url: &str, referrer: Option<&str>) -> bool {
        let options = self.config.url_options();
        let base = referrer.and_then(|r| CanonicalUrl::parse(r, None, options));

        match CanonicalUrl::parse(url, base.as_ref(), options) {
            Some(url) => {
                let referrer = base.as_ref().map(|b| b.fullpath.as_str());
                self.history.push(url, referrer)
            }
            None => {
                tracing::debug!("Ignoring unqueueable URL {}", url);
                false
            }
        }
    }

    /// Starts a stopped crawl, or resumes a paused one
    ///
    /// Must be called from within a Tokio runtime, as requests are spawned as
    /// tasks. Does nothing while already running.
    pub fn start(&mut self) {
        if self.status.is_running() {
            return;
        }

        let fresh = self.status.is_stopped();
        if let Err(e) = self.parser.start() {
            tracing::error!("Failed to spawn parse workers, parsing in-process: {}", e);
        }
        self.scheduler.start(fresh);
        self.status = CrawlStatus::Running;

        if fresh {
            self.last_stop = None;
            tracing::info!(
                "Crawl started: {} queued, {} req/s, {} concurrent",
                self.history.len(),
                self.config.request_maxpersecond,
                self.config.request_concurrent
            );
        } else {
            tracing::info!("Crawl resumed");
        }
        self.emit(CrawlEvent::Started);

        // A quick resume waits for the first tick instead
        if self.scheduler.can_admit() {
            self.continue_crawl();
        }
    }

    /// Suspends admissions; in-flight requests still complete
    pub fn pause(&mut self) -> bool {
        if !self.status.can_pause() {
            return false;
        }

        self.scheduler.pause();
        self.status = CrawlStatus::Paused;
        tracing::info!("Crawl paused");
        self.emit(CrawlEvent::Paused);
        true
    }

    /// Stops the crawl
    ///
    /// Pending URLs are dropped from the frontier (the history log is kept), the
    /// parse pool starts draining, and a final metrics snapshot is forced out.
    /// Requests already in flight are still handled by `run`.
    pub fn stop(&mut self, reason: StopReason) {
        if self.status.is_stopped() {
            return;
        }

        self.scheduler.stop();
        self.status = CrawlStatus::Stopped;
        self.last_stop = Some(reason);
        self.history.empty_queue();
        self.parser.stop();
        self.poll_metrics(true);

        tracing::info!(
            "Crawl stopped ({}): {} completed, {} still open",
            reason,
            self.request_completed,
            self.request_open
        );
        self.emit(CrawlEvent::Complete { reason });
    }

    /// Stops the crawl and clears history and cookies for a new session
    ///
    /// Cookies go back to the configured seeds.
    pub fn reset(&mut self) {
        self.stop(StopReason::Reset);
        self.history.reset();
        self.cookies = CookieJar::with_seeds(&self.config.cookies);
        self.request_completed = 0;
    }

    /// Drives the crawl until it stops and every in-flight request is handled
    ///
    /// Starts the crawl first if it is stopped. While paused the loop keeps
    /// waiting for commands from a [`CrawlHandle`].
    pub async fn run(&mut self) -> StopReason {
        if self.status.is_stopped() {
            self.start();
        }

        while !self.is_drained() {
            tokio::select! {
                tick = self.scheduler.next_tick() => match tick {
                    Tick::Admission => self.continue_crawl(),
                    Tick::Metrics => self.poll_metrics(false),
                },
                Some(event) = self.fetch_rx.recv() => self.handle_fetch(event),
                results = self.parser.next_batch() => self.handle_parsed(results),
                Some(command) = self.command_rx.recv() => self.handle_command(command),
            }
        }

        self.last_stop.unwrap_or(StopReason::Requested)
    }

    pub fn status(&self) -> CrawlStatus {
        self.status
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Requests issued and not yet through parsing
    pub fn active_requests(&self) -> usize {
        self.request_open
    }

    /// Requests fully handled this session
    pub fn completed_requests(&self) -> usize {
        self.request_completed
    }

    pub fn parser_workers(&self) -> usize {
        self.parser.worker_count()
    }

    /// Why the last stop happened, if the crawl has stopped since it last started
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.last_stop
    }

    fn is_drained(&self) -> bool {
        self.status.is_stopped() && self.request_open == 0 && self.parser.is_idle()
    }

    fn emit(&self, event: CrawlEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn poll_metrics(&mut self, force: bool) {
        let totals = Totals {
            completed: self.request_completed,
            active: self.request_open,
            queued: self.history.len(),
        };
        if let Some(snapshot) = self.window.poll(force, totals) {
            self.emit(CrawlEvent::Metrics(snapshot));
        }
    }

    /// One admission decision
    ///
    /// # Order
    ///
    /// 1. Poll the metrics window
    /// 2. Stop if the duration budget is spent
    /// 3. Wait if the concurrency cap is reached
    /// 4. Stop if the URL limit of completed requests is reached
    /// 5. Request the next frontier URL, or stop when the frontier is dry and
    ///    nothing is in flight
    fn continue_crawl(&mut self) {
        self.poll_metrics(false);

        if !self.status.is_running() {
            return;
        }

        if self.scheduler.budget_elapsed() {
            self.stop(StopReason::DurationElapsed);
            return;
        }

        if self.config.request_concurrent > 0 && self.request_open >= self.config.request_concurrent
        {
            return;
        }

        if self.config.has_url_limit() && self.request_completed >= self.config.url_limit {
            self.stop(StopReason::UrlLimitReached);
            return;
        }

        match self.history.next() {
            Some(url) => self.request(url),
            None => {
                if self.request_open == 0 {
                    self.stop(StopReason::Exhausted);
                }
            }
        }
    }

    fn request(&mut self, url: CanonicalUrl) {
        let mut headers = self.config.headers.clone();
        let cookie = self.cookies.get(&url);
        if !cookie.is_empty() {
            headers.insert("Cookie".to_string(), cookie);
        }

        let mut request = FetchRequest {
            url: url.target(),
            headers,
        };
        if let Some(hook) = &self.before_request {
            hook(&mut request);
        }

        let id = self.next_request;
        self.next_request += 1;

        tracing::debug!("Requesting {}", url);
        self.window.record_open(&url);
        self.in_flight.insert(
            id,
            InFlight {
                url,
                started: Instant::now(),
                start_time: Utc::now(),
                status: 0,
                ttfb: Duration::ZERO,
            },
        );
        self.request_open += 1;
        self.scheduler.record_admission();

        tokio::spawn(fetcher::fetch(
            Arc::clone(&self.transport),
            request,
            self.config.request_wait,
            id,
            self.fetch_tx.clone(),
        ));
    }

    fn handle_fetch(&mut self, event: FetchEvent) {
        if !self.in_flight.contains_key(&event.id()) {
            tracing::trace!("Fetch event for unknown request {}", event.id());
            return;
        }

        match event {
            FetchEvent::Response {
                id,
                status,
                set_cookies,
                ttfb,
            } => {
                self.poll_metrics(false);
                if let Some(flight) = self.in_flight.get_mut(&id) {
                    flight.status = status;
                    flight.ttfb = ttfb;
                    if !set_cookies.is_empty() {
                        self.cookies.set(&flight.url, &set_cookies);
                    }
                }
            }
            FetchEvent::Chunk { len, .. } => self.window.record_bytes(len),
            FetchEvent::Finished { id, result } => {
                self.poll_metrics(false);
                let Some(flight) = self.in_flight.remove(&id) else {
                    return;
                };
                self.window.record_close(flight.status, flight.ttfb);

                let content = match result {
                    Ok(body) => String::from_utf8_lossy(&body).into_owned(),
                    Err(e) => {
                        tracing::warn!("Request to {} failed: {}", flight.url, e);
                        String::new()
                    }
                };

                self.parser.parse(ParseJob {
                    response_time: flight.started.elapsed(),
                    url: flight.url,
                    status: flight.status,
                    start_time: flight.start_time,
                    ttfb: flight.ttfb,
                    content,
                });
            }
        }
    }

    fn handle_parsed(&mut self, results: Vec<ParseResult>) {
        self.poll_metrics(false);

        for result in results {
            if self.config.auto_queue && !self.status.is_stopped() {
                for link in &result.links {
                    self.auto_queue(link, &result.url.fullpath);
                }
            }

            if self.config.log_stats {
                self.history.log(
                    &result.url,
                    RequestRecord {
                        status: result.status,
                        size: result.size,
                        start_time: result.start_time,
                        ttfb_ms: result.ttfb.as_millis() as u64,
                        time_ms: result.response_time.as_millis() as u64,
                        parse_time_ms: result.parse_time.as_millis() as u64,
                    },
                );
            }

            tracing::debug!(
                "Completed {} ({}) with {} links",
                result.url,
                result.status,
                result.links.len()
            );
            self.request_completed += 1;
            self.request_open = self.request_open.saturating_sub(1);
        }
    }

    /// Queues a discovered link if the URL limit and scope allow it
    fn auto_queue(&mut self, link: &CanonicalUrl, referrer: &str) {
        if self.config.has_url_limit() && self.history.total() >= self.config.url_limit {
            tracing::trace!("URL limit reached, not queueing {}", link);
            return;
        }

        if !self.scope.admits(link) {
            tracing::trace!("Out of scope: {}", link);
            return;
        }

        self.history.push(link.clone(), Some(referrer));
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start => self.start(),
            Command::Pause => {
                self.pause();
            }
            Command::Stop(reason) => self.stop(reason),
            Command::Queue(url) => {
                self.queue(&url, None);
            }
        }
    }
}
