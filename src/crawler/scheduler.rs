//! Admission scheduling for the crawl loop
//!
//! This module handles:
//! - The admission tick that paces request starts to the configured rate
//! - The metrics tick that closes metrics windows while nothing else happens
//! - The running-time budget, which only counts time spent running

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// What the scheduler woke up for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Time to consider starting another request
    Admission,

    /// Time to poll the metrics window
    Metrics,
}

/// Paces admissions and tracks the duration budget
#[derive(Debug)]
pub struct Scheduler {
    /// Time between admission ticks
    period: Duration,

    /// Total running-time budget, zero for unlimited
    duration: Duration,

    admission: Option<Interval>,
    metrics: Option<Interval>,

    /// When the current running stretch began
    resumed_at: Instant,

    /// Budget left at `resumed_at`
    remaining: Duration,

    /// When the last request was admitted
    last_admission: Option<Instant>,
}

impl Scheduler {
    /// Creates a scheduler for `rate` admissions per second
    pub fn new(rate: u32, duration: Duration) -> Self {
        Self {
            period: admission_period(rate),
            duration,
            admission: None,
            metrics: None,
            resumed_at: Instant::now(),
            remaining: duration,
            last_admission: None,
        }
    }

    /// Changes the rate and budget; takes effect on the next `start`
    pub fn configure(&mut self, rate: u32, duration: Duration) {
        self.period = admission_period(rate);
        self.duration = duration;
        self.remaining = duration;
    }

    /// Begins ticking
    ///
    /// A `fresh` start restores the full budget; resuming from a pause keeps
    /// whatever was left. The first admission tick never lands less than one
    /// period after the last admission.
    pub fn start(&mut self, fresh: bool) {
        let now = Instant::now();
        if fresh {
            self.remaining = self.duration;
        }
        self.resumed_at = now;

        let first = match self.last_admission {
            Some(last) if last + self.period > now => last + self.period,
            _ => now + self.period,
        };
        let mut admission = interval_at(first, self.period);
        admission.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.admission = Some(admission);

        let mut metrics = interval_at(now + Duration::from_secs(1), Duration::from_secs(1));
        metrics.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.metrics = Some(metrics);
    }

    /// Stops admissions and banks the running time spent so far
    ///
    /// Metrics keep ticking while paused.
    pub fn pause(&mut self) {
        self.admission = None;
        self.remaining = self.remaining.saturating_sub(self.resumed_at.elapsed());
    }

    /// Stops ticking
    pub fn stop(&mut self) {
        self.admission = None;
        self.metrics = None;
    }

    /// Whether a request may be admitted right now without exceeding the rate
    pub fn can_admit(&self) -> bool {
        self.last_admission
            .map_or(true, |last| last.elapsed() >= self.period)
    }

    /// Notes that a request was just admitted
    pub fn record_admission(&mut self) {
        self.last_admission = Some(Instant::now());
    }

    /// Whether a budget is set and the running time has used it up
    pub fn budget_elapsed(&self) -> bool {
        !self.duration.is_zero() && self.resumed_at.elapsed() >= self.remaining
    }

    /// Waits for the next tick; pending forever while stopped
    pub async fn next_tick(&mut self) -> Tick {
        tokio::select! {
            _ = tick(&mut self.admission) => Tick::Admission,
            _ = tick(&mut self.metrics) => Tick::Metrics,
        }
    }
}

fn admission_period(rate: u32) -> Duration {
    Duration::from_secs(1) / rate.max(1)
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_period() {
        assert_eq!(admission_period(50), Duration::from_millis(20));
        assert_eq!(admission_period(1), Duration::from_secs(1));
        assert_eq!(admission_period(0), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_rate() {
        let mut scheduler = Scheduler::new(4, Duration::ZERO);
        let start = Instant::now();
        scheduler.start(true);

        let mut admissions = 0;
        while admissions < 4 {
            if scheduler.next_tick().await == Tick::Admission {
                admissions += 1;
            }
        }

        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_while_stopped() {
        let mut scheduler = Scheduler::new(10, Duration::ZERO);
        let result =
            tokio::time::timeout(Duration::from_secs(5), scheduler.next_tick()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_elapses() {
        let mut scheduler = Scheduler::new(10, Duration::from_secs(2));
        scheduler.start(true);
        assert!(!scheduler.budget_elapsed());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(scheduler.budget_elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_budget_never_elapses() {
        let mut scheduler = Scheduler::new(10, Duration::ZERO);
        scheduler.start(true);
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(!scheduler.budget_elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_time_does_not_count() {
        let mut scheduler = Scheduler::new(10, Duration::from_secs(10));
        scheduler.start(true);

        tokio::time::advance(Duration::from_secs(3)).await;
        scheduler.pause();

        tokio::time::advance(Duration::from_secs(20)).await;
        scheduler.start(false);
        assert!(!scheduler.budget_elapsed());

        tokio::time::advance(Duration::from_millis(6900)).await;
        assert!(!scheduler.budget_elapsed());

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(scheduler.budget_elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_start_restores_budget() {
        let mut scheduler = Scheduler::new(10, Duration::from_secs(5));
        scheduler.start(true);
        tokio::time::advance(Duration::from_secs(4)).await;
        scheduler.stop();

        scheduler.start(true);
        tokio::time::advance(Duration::from_millis(4900)).await;
        assert!(!scheduler.budget_elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_waits_out_last_admission() {
        let mut scheduler = Scheduler::new(5, Duration::ZERO);
        scheduler.start(true);
        assert!(scheduler.can_admit());
        scheduler.record_admission();
        let admitted = Instant::now();

        tokio::time::advance(Duration::from_millis(50)).await;
        scheduler.pause();
        tokio::time::advance(Duration::from_millis(50)).await;
        scheduler.start(false);
        assert!(!scheduler.can_admit());

        assert_eq!(scheduler.next_tick().await, Tick::Admission);
        assert_eq!(admitted.elapsed(), Duration::from_millis(200));
        assert!(scheduler.can_admit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_after_long_pause_admits_at_once() {
        let mut scheduler = Scheduler::new(5, Duration::ZERO);
        scheduler.start(true);
        scheduler.record_admission();
        scheduler.pause();

        tokio::time::advance(Duration::from_secs(2)).await;
        scheduler.start(false);
        assert!(scheduler.can_admit());
    }
}
