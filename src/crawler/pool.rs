//! Parse worker pool
//!
//! This module runs link extraction either in-process or across a fixed pool of
//! worker threads:
//! - Jobs are assigned round-robin to per-worker queues
//! - Queues are flushed as one batch per worker on every dispatch tick
//! - Replies carry whole batches and are matched by an outstanding-batch count
//! - Stopping flushes what is queued and retires the workers once every batch
//!   sent to them has come back
//!
//! Each worker processes the jobs of a batch one after another.

use crate::crawler::parser::LinkExtractor;
use crate::url::{CanonicalUrl, UrlOptions};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Time between two batch dispatches
pub const DISPATCH_PERIOD: Duration = Duration::from_secs(1);

/// One fetched page waiting for link extraction
#[derive(Debug, Clone)]
pub struct ParseJob {
    pub url: CanonicalUrl,
    pub status: u16,
    pub start_time: DateTime<Utc>,
    pub ttfb: Duration,
    pub response_time: Duration,
    pub content: String,
}

/// Links extracted from one page, plus the request facts carried along
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub url: CanonicalUrl,
    pub status: u16,
    pub start_time: DateTime<Utc>,
    pub ttfb: Duration,
    pub response_time: Duration,

    /// Body size in bytes
    pub size: usize,

    /// Canonicalized outbound links, in page order
    pub links: Vec<CanonicalUrl>,

    pub parse_time: Duration,
}

impl ParseJob {
    /// Extracts and canonicalizes the links of this page
    ///
    /// Links that do not canonicalize are dropped. A panicking extractor yields
    /// a result with no links.
    pub fn run(self, extractor: &dyn LinkExtractor, options: UrlOptions) -> ParseResult {
        let started = std::time::Instant::now();

        let raw = panic::catch_unwind(AssertUnwindSafe(|| {
            extractor.extract(&self.url, &self.content)
        }))
        .unwrap_or_else(|_| {
            tracing::warn!("Link extractor panicked on {}", self.url);
            Vec::new()
        });

        let links = raw
            .iter()
            .filter_map(|href| CanonicalUrl::parse(href, Some(&self.url), options))
            .collect();

        ParseResult {
            size: self.content.len(),
            url: self.url,
            status: self.status,
            start_time: self.start_time,
            ttfb: self.ttfb,
            response_time: self.response_time,
            links,
            parse_time: started.elapsed(),
        }
    }
}

/// Messages a worker accepts
enum WorkerCommand {
    Setup {
        extractor: Arc<dyn LinkExtractor>,
        options: UrlOptions,
    },
    Parse(Vec<ParseJob>),
}

/// A completed batch
struct BatchReply {
    worker: usize,
    results: Vec<ParseResult>,
}

/// Handle to one worker thread
///
/// Dropping the handle terminates the worker once it has drained the batches
/// already sent to it.
struct Worker {
    id: usize,
    commands: UnboundedSender<WorkerCommand>,
}

impl Worker {
    fn spawn(
        id: usize,
        extractor: Arc<dyn LinkExtractor>,
        options: UrlOptions,
        replies: UnboundedSender<BatchReply>,
    ) -> std::io::Result<Self> {
        let (commands, mut inbox) = mpsc::unbounded_channel::<WorkerCommand>();

        thread::Builder::new()
            .name(format!("parse-worker-{}", id))
            .spawn(move || {
                let mut extractor = extractor;
                let mut options = options;

                while let Some(command) = inbox.blocking_recv() {
                    match command {
                        WorkerCommand::Setup {
                            extractor: new_extractor,
                            options: new_options,
                        } => {
                            extractor = new_extractor;
                            options = new_options;
                        }
                        WorkerCommand::Parse(jobs) => {
                            let results = jobs
                                .into_iter()
                                .map(|job| job.run(extractor.as_ref(), options))
                                .collect();
                            if replies.send(BatchReply { worker: id, results }).is_err() {
                                break;
                            }
                        }
                    }
                }

                tracing::debug!("Parse worker {} exiting", id);
            })?;

        Ok(Self { id, commands })
    }

    fn send(&self, command: WorkerCommand) -> Result<(), WorkerCommand> {
        self.commands.send(command).map_err(|e| e.0)
    }
}

/// Runs link extraction locally or across worker threads
pub struct ParserPool {
    extractor: Arc<dyn LinkExtractor>,
    options: UrlOptions,

    workers: Vec<Worker>,

    /// Jobs waiting for the next dispatch, one queue per worker
    queues: Vec<Vec<ParseJob>>,

    /// Index of the queue the next job goes to
    cursor: usize,

    /// Configured pool size
    threads: usize,

    dispatch: Option<Interval>,

    /// Batches sent to workers and not yet answered
    outstanding: usize,

    /// Set by `stop`; workers retire once `outstanding` reaches zero
    draining: bool,

    /// Results produced in-process, waiting to be handed out
    ready: VecDeque<ParseResult>,

    replies_tx: UnboundedSender<BatchReply>,
    replies_rx: UnboundedReceiver<BatchReply>,
}

impl ParserPool {
    /// Creates an in-process pool
    pub fn new(extractor: Arc<dyn LinkExtractor>, options: UrlOptions) -> Self {
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        Self {
            extractor,
            options,
            workers: Vec::new(),
            queues: Vec::new(),
            cursor: 0,
            threads: 0,
            dispatch: None,
            outstanding: 0,
            draining: false,
            ready: VecDeque::new(),
            replies_tx,
            replies_rx,
        }
    }

    /// Submits a page for link extraction
    ///
    /// With live workers the job waits in a worker queue for the next dispatch;
    /// otherwise it is parsed immediately on the calling thread.
    pub fn parse(&mut self, job: ParseJob) {
        if self.is_pooled() {
            self.queues[self.cursor].push(job);
            self.cursor = (self.cursor + 1) % self.queues.len();
        } else {
            let result = job.run(self.extractor.as_ref(), self.options);
            self.ready.push_back(result);
        }
    }

    /// Replaces the extraction strategy, here and in every worker
    pub fn set_extractor(&mut self, extractor: Arc<dyn LinkExtractor>) {
        self.extractor = extractor;
        self.broadcast_setup();
    }

    /// Replaces the canonicalization settings, here and in every worker
    pub fn set_url_options(&mut self, options: UrlOptions) {
        self.options = options;
        self.broadcast_setup();
    }

    /// Resizes the pool to `threads` workers
    ///
    /// New workers start with the current strategy. Jobs queued for removed
    /// workers move to the remaining ones. `fork(0)` stops the pool, after which
    /// parsing happens in-process.
    ///
    /// If a worker cannot be spawned the pool falls back to in-process parsing
    /// with no workers, and the spawn error is returned.
    pub fn fork(&mut self, threads: usize) -> std::io::Result<()> {
        self.threads = threads;

        for id in self.workers.len()..threads {
            let spawned = Worker::spawn(
                id,
                Arc::clone(&self.extractor),
                self.options,
                self.replies_tx.clone(),
            );
            let worker = match spawned {
                Ok(worker) => worker,
                Err(e) => {
                    self.fall_back_local();
                    return Err(e);
                }
            };
            self.workers.push(worker);
            self.queues.push(Vec::new());
            tracing::debug!("Spawned parse worker {}", id);
        }

        while self.workers.len() > threads {
            let index = self.workers.len() - 1;
            let jobs = self.queues.pop().unwrap_or_default();

            if threads > 0 {
                self.workers.pop();
                for job in jobs {
                    self.queues[self.cursor % threads].push(job);
                    self.cursor = (self.cursor + 1) % threads;
                }
            } else {
                self.send_batch(index, jobs);
                self.workers.pop();
            }
            tracing::debug!("Retired parse worker {}", index);
        }

        if threads > 0 {
            self.cursor %= threads;
        } else {
            self.stop();
        }

        Ok(())
    }

    /// Starts periodic dispatch when a pool size is configured
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.threads == 0 || self.dispatch.is_some() {
            return Ok(());
        }

        self.draining = false;
        self.fork(self.threads)?;

        let mut interval = interval_at(Instant::now() + DISPATCH_PERIOD, DISPATCH_PERIOD);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.dispatch = Some(interval);
        Ok(())
    }

    /// Stops dispatching and begins draining
    ///
    /// Queued jobs go out immediately as final batches. Workers are retired as
    /// soon as no batch is outstanding.
    pub fn stop(&mut self) {
        self.dispatch = None;
        self.draining = true;
        self.dispatch_pending();

        if self.outstanding == 0 {
            self.kill();
        }
    }

    /// Waits for the next results
    ///
    /// Drives the dispatch tick while waiting. Never completes while the pool
    /// has nothing in flight, so it is meant to sit in a `select!` loop.
    pub async fn next_batch(&mut self) -> Vec<ParseResult> {
        loop {
            if !self.ready.is_empty() {
                return self.ready.drain(..).collect();
            }

            tokio::select! {
                Some(reply) = self.replies_rx.recv() => {
                    self.outstanding = self.outstanding.saturating_sub(1);
                    tracing::trace!(
                        "Parse worker {} returned {} results",
                        reply.worker,
                        reply.results.len()
                    );
                    if self.draining && self.outstanding == 0 {
                        self.kill();
                    }
                    return reply.results;
                }
                _ = tick(&mut self.dispatch) => self.dispatch_pending(),
            }
        }
    }

    /// Whether no job is queued, outstanding, or waiting to be handed out
    pub fn is_idle(&self) -> bool {
        self.outstanding == 0 && self.ready.is_empty() && self.queues.iter().all(Vec::is_empty)
    }

    /// Whether new jobs go to workers
    pub fn is_pooled(&self) -> bool {
        !self.workers.is_empty() && !self.draining
    }

    /// Number of live workers
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Number of queued jobs per worker
    pub fn queue_lengths(&self) -> Vec<usize> {
        self.queues.iter().map(Vec::len).collect()
    }

    fn broadcast_setup(&self) {
        for worker in &self.workers {
            let command = WorkerCommand::Setup {
                extractor: Arc::clone(&self.extractor),
                options: self.options,
            };
            if worker.send(command).is_err() {
                tracing::warn!("Parse worker {} is gone; setup not delivered", worker.id);
            }
        }
    }

    fn dispatch_pending(&mut self) {
        for index in 0..self.workers.len() {
            let jobs = std::mem::take(&mut self.queues[index]);
            self.send_batch(index, jobs);
        }
    }

    /// Sends one non-empty batch, parsing it locally if the worker is gone
    fn send_batch(&mut self, index: usize, jobs: Vec<ParseJob>) {
        if jobs.is_empty() {
            return;
        }

        match self.workers[index].send(WorkerCommand::Parse(jobs)) {
            Ok(()) => self.outstanding += 1,
            Err(WorkerCommand::Parse(jobs)) => {
                tracing::warn!(
                    "Parse worker {} is gone; parsing {} jobs in-process",
                    index,
                    jobs.len()
                );
                for job in jobs {
                    let result = job.run(self.extractor.as_ref(), self.options);
                    self.ready.push_back(result);
                }
            }
            Err(WorkerCommand::Setup { .. }) => {}
        }
    }

    /// Parses every queued job in-process and drops all workers
    ///
    /// Batches already sent still come back through `next_batch`.
    fn fall_back_local(&mut self) {
        for jobs in std::mem::take(&mut self.queues) {
            for job in jobs {
                let result = job.run(self.extractor.as_ref(), self.options);
                self.ready.push_back(result);
            }
        }
        self.threads = 0;
        self.dispatch = None;
        self.kill();
    }

    /// Terminates every worker and forgets their queues
    fn kill(&mut self) {
        if !self.workers.is_empty() {
            tracing::debug!("Stopping {} parse workers", self.workers.len());
        }
        self.workers.clear();
        self.queues.clear();
        self.cursor = 0;
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
