//! Periodic cycle scheduling
//!
//! Runs a cycle immediately on start and then once per interval. A tick that
//! fires while the previous cycle is still running is skipped, never queued.
//! Stopping waits for the in-flight cycle up to a grace period and cancels it
//! after that.

use crate::config::{DEFAULT_STOP_GRACE_MS, MAX_INTERVAL_MS};
use crate::error::SchedulerError;
use crate::observability::{MonitorMetrics, StructuredLogger};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// One unit of periodic work
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// What happened to a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed,
    /// The cycle returned an error or panicked
    Failed,
    /// A previous cycle was still in flight
    Skipped,
    /// The cycle was aborted by `stop`
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles_run: u64,
    pub cycles_failed: u64,
    pub ticks_skipped: u64,
}

struct Inner {
    runner: Arc<dyn CycleRunner>,
    in_flight: AtomicBool,
    cycles_run: AtomicU64,
    cycles_failed: AtomicU64,
    ticks_skipped: AtomicU64,
    current: std::sync::Mutex<Option<AbortHandle>>,
    metrics: MonitorMetrics,
}

/// Clears the in-flight flag when the cycle task ends, including on abort or panic
struct InFlightGuard(Arc<Inner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

impl Inner {
    fn record_skipped(&self, count: u64) {
        self.ticks_skipped.fetch_add(count, Ordering::SeqCst);
        self.metrics.inc_cycles_skipped(count);
    }

    async fn tick(self: &Arc<Self>) -> TickOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Previous cycle still running, skipping tick");
            self.record_skipped(1);
            return TickOutcome::Skipped;
        }

        let guard = InFlightGuard(self.clone());
        let runner = self.runner.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            runner.run().await
        });
        if let Ok(mut current) = self.current.lock() {
            *current = Some(handle.abort_handle());
        }

        match handle.await {
            Ok(Ok(())) => {
                self.cycles_run.fetch_add(1, Ordering::SeqCst);
                TickOutcome::Completed
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Cycle failed");
                self.cycles_run.fetch_add(1, Ordering::SeqCst);
                self.cycles_failed.fetch_add(1, Ordering::SeqCst);
                self.metrics.inc_cycles_failed();
                TickOutcome::Failed
            }
            Err(e) if e.is_cancelled() => {
                warn!("Cycle cancelled");
                TickOutcome::Cancelled
            }
            Err(e) => {
                error!(error = %e, "Cycle panicked");
                self.cycles_run.fetch_add(1, Ordering::SeqCst);
                self.cycles_failed.fetch_add(1, Ordering::SeqCst);
                self.metrics.inc_cycles_failed();
                TickOutcome::Failed
            }
        }
    }

    fn abort_current(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(handle) = current.take() {
                handle.abort();
            }
        }
    }
}

struct Running {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Drives a [`CycleRunner`] at a fixed interval
pub struct Scheduler {
    inner: Arc<Inner>,
    running: Mutex<Option<Running>>,
    stop_grace: Duration,
    logger: StructuredLogger,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn CycleRunner>) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner,
                in_flight: AtomicBool::new(false),
                cycles_run: AtomicU64::new(0),
                cycles_failed: AtomicU64::new(0),
                ticks_skipped: AtomicU64::new(0),
                current: std::sync::Mutex::new(None),
                metrics: MonitorMetrics::new(),
            }),
            running: Mutex::new(None),
            stop_grace: Duration::from_millis(DEFAULT_STOP_GRACE_MS),
            logger: StructuredLogger::new("local"),
        }
    }

    /// How long `stop` waits for an in-flight cycle before aborting it
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Run one cycle now, unless one is already in flight
    pub async fn tick(&self) -> TickOutcome {
        self.inner.tick().await
    }

    /// Start ticking; the first cycle runs immediately
    pub async fn start(&self, interval: Duration) -> Result<(), SchedulerError> {
        if interval.is_zero() || interval > Duration::from_millis(MAX_INTERVAL_MS) {
            return Err(SchedulerError::InvalidInterval);
        }

        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_loop(
            self.inner.clone(),
            interval,
            shutdown_rx,
            self.logger.clone(),
        ));

        info!(interval_ms = interval.as_millis() as u64, "Scheduler started");
        *running = Some(Running {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Stop ticking; no-op when already stopped
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(Running {
            shutdown_tx,
            mut handle,
        }) = running.take()
        else {
            return;
        };

        let _ = shutdown_tx.send(());
        if tokio::time::timeout(self.stop_grace, &mut handle)
            .await
            .is_err()
        {
            warn!(
                grace_ms = self.stop_grace.as_millis() as u64,
                "Cycle did not finish within grace period, aborting"
            );
            self.inner.abort_current();
            handle.abort();
            let _ = handle.await;
        }

        info!("Scheduler stopped");
    }

    pub async fn state(&self) -> SchedulerState {
        if self.running.lock().await.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    /// Whether a cycle is currently in flight
    pub fn is_busy(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            cycles_run: self.inner.cycles_run.load(Ordering::SeqCst),
            cycles_failed: self.inner.cycles_failed.load(Ordering::SeqCst),
            ticks_skipped: self.inner.ticks_skipped.load(Ordering::SeqCst),
        }
    }
}

async fn run_loop(
    inner: Arc<Inner>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
    logger: StructuredLogger,
) {
    let mut next_tick = Instant::now();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                debug!("Scheduler loop received shutdown");
                break;
            }
            _ = sleep_until(next_tick) => {}
        }

        inner.tick().await;

        // Ticks that elapsed during a long cycle are dropped
        next_tick += interval;
        let now = Instant::now();
        let mut missed = 0;
        while next_tick <= now {
            next_tick += interval;
            missed += 1;
        }
        if missed > 0 {
            debug!(missed, "Cycle overran its interval, skipping ticks");
            inner.record_skipped(missed);
        }

        logger.log_next_check((next_tick - now).as_millis());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct CountingRunner {
        runs: AtomicU64,
        delays: std::sync::Mutex<VecDeque<Duration>>,
        fail: bool,
        panic: bool,
    }

    impl CountingRunner {
        fn with_delays(delays: impl IntoIterator<Item = Duration>) -> Self {
            Self {
                delays: std::sync::Mutex::new(delays.into_iter().collect()),
                ..Default::default()
            }
        }

        fn runs(&self) -> u64 {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CycleRunner for CountingRunner {
        async fn run(&self) -> Result<()> {
            let delay = self.delays.lock().unwrap().pop_front();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("cycle exploded");
            }
            if self.fail {
                anyhow::bail!("cycle failed");
            }
            Ok(())
        }
    }

    struct BlockingRunner {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl CycleRunner for BlockingRunner {
        async fn run(&self) -> Result<()> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_runs_immediately() {
        let runner = Arc::new(CountingRunner::default());
        let scheduler = Scheduler::new(runner.clone());

        scheduler.start(Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(runner.runs(), 1);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_skips_ticks() {
        let interval = Duration::from_millis(100);
        let runner = Arc::new(CountingRunner::with_delays([Duration::from_millis(150)]));
        let scheduler = Scheduler::new(runner.clone());

        scheduler.start(interval).await.unwrap();
        // Cycles start at 0 and 200; the tick at 100 was dropped
        tokio::time::sleep(Duration::from_millis(290)).await;

        assert_eq!(runner.runs(), 2);
        assert_eq!(scheduler.stats().ticks_skipped, 1);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_manual_tick_while_busy_is_skipped() {
        let runner = Arc::new(BlockingRunner {
            started: Notify::new(),
            release: Notify::new(),
        });
        let scheduler = Arc::new(Scheduler::new(runner.clone()));

        let background = scheduler.clone();
        let first = tokio::spawn(async move { background.tick().await });
        runner.started.notified().await;

        assert!(scheduler.is_busy());
        assert_eq!(scheduler.tick().await, TickOutcome::Skipped);

        runner.release.notify_one();
        assert_eq!(first.await.unwrap(), TickOutcome::Completed);
        assert!(!scheduler.is_busy());
        assert_eq!(scheduler.stats().ticks_skipped, 1);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let scheduler = Scheduler::new(Arc::new(CountingRunner::default()));

        scheduler.start(Duration::from_secs(60)).await.unwrap();
        assert_eq!(
            scheduler.start(Duration::from_secs(60)).await,
            Err(SchedulerError::AlreadyRunning)
        );
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_out_of_range_interval_rejected() {
        let scheduler = Scheduler::new(Arc::new(CountingRunner::default()));
        assert_eq!(
            scheduler.start(Duration::ZERO).await,
            Err(SchedulerError::InvalidInterval)
        );
        assert_eq!(
            scheduler.start(Duration::from_secs(u64::MAX)).await,
            Err(SchedulerError::InvalidInterval)
        );
        assert_eq!(scheduler.state().await, SchedulerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_reentrant_and_restartable() {
        let runner = Arc::new(CountingRunner::default());
        let scheduler = Scheduler::new(runner.clone());

        scheduler.stop().await;
        scheduler.start(Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        scheduler.stop().await;
        scheduler.stop().await;
        assert_eq!(scheduler.state().await, SchedulerState::Stopped);

        scheduler.start(Duration::from_secs(60)).await.unwrap();
        assert_eq!(scheduler.state().await, SchedulerState::Running);
        tokio::time::sleep(Duration::from_millis(10)).await;
        scheduler.stop().await;

        assert_eq!(runner.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_cycles_keep_ticking() {
        let runner = Arc::new(CountingRunner {
            fail: true,
            ..Default::default()
        });
        let scheduler = Scheduler::new(runner.clone());

        scheduler.start(Duration::from_millis(100)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        scheduler.stop().await;

        assert_eq!(runner.runs(), 3);
        assert_eq!(scheduler.stats().cycles_failed, 3);
    }

    #[tokio::test]
    async fn test_panicking_cycle_is_contained() {
        let runner = Arc::new(CountingRunner {
            panic: true,
            ..Default::default()
        });
        let scheduler = Scheduler::new(runner.clone());

        assert_eq!(scheduler.tick().await, TickOutcome::Failed);
        assert!(!scheduler.is_busy());
        assert_eq!(scheduler.tick().await, TickOutcome::Failed);
        assert_eq!(runner.runs(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts_after_grace() {
        let runner = Arc::new(CountingRunner::with_delays([Duration::from_secs(30)]));
        let scheduler =
            Scheduler::new(runner.clone()).with_stop_grace(Duration::from_millis(50));

        scheduler.start(Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(scheduler.is_busy());

        scheduler.stop().await;
        assert_eq!(scheduler.state().await, SchedulerState::Stopped);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(runner.runs(), 0);
        assert!(!scheduler.is_busy());
    }
}
