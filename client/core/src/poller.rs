//! Background Polling
//!
//! Periodic refresh of backend status, memory usage and the chat list.
//! A poller never interleaves with a foreground send: when the guard reports
//! a chat send in flight, the tick is skipped, not queued. Refresh errors are
//! logged and counted; the loop keeps going until its shutdown token fires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::guard::ConcurrencyGuard;

/// One periodic refresh
#[async_trait]
pub trait PollTask: Send + Sync {
    /// Refresh once
    async fn refresh(&self) -> anyhow::Result<()>;
}

/// What a single tick did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Refresh ran and succeeded
    Ran,
    /// Foreground operation in progress, refresh skipped
    Skipped,
    /// Refresh ran and failed
    Failed(String),
}

/// Tick counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Successful refreshes
    pub ran: u64,
    /// Ticks skipped while the foreground was busy
    pub skipped: u64,
    /// Failed refreshes
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    ran: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// A named periodic refresh; clones share counters
#[derive(Clone)]
pub struct Poller {
    name: String,
    every: Duration,
    guard: ConcurrencyGuard,
    task: Arc<dyn PollTask>,
    counters: Arc<Counters>,
}

impl Poller {
    /// Create a poller running `task` every `every`
    pub fn new(
        name: impl Into<String>,
        every: Duration,
        guard: ConcurrencyGuard,
        task: Arc<dyn PollTask>,
    ) -> Self {
        Self {
            name: name.into(),
            every,
            guard,
            task,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Poller name, used in logs
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Counters so far
    #[must_use]
    pub fn stats(&self) -> PollerStats {
        PollerStats {
            ran: self.counters.ran.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Run one tick now
    pub async fn tick(&self) -> TickOutcome {
        if self.guard.foreground_busy() {
            tracing::trace!(poller = %self.name, "Foreground busy, skipping tick");
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            return TickOutcome::Skipped;
        }

        match self.task.refresh().await {
            Ok(()) => {
                self.counters.ran.fetch_add(1, Ordering::Relaxed);
                TickOutcome::Ran
            }
            Err(e) => {
                tracing::warn!(poller = %self.name, error = %e, "Background refresh failed");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                TickOutcome::Failed(e.to_string())
            }
        }
    }

    /// Tick until `shutdown` fires
    ///
    /// The first tick runs immediately.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::debug!(
            poller = %self.name,
            interval_secs = self.every.as_secs(),
            "Starting poller"
        );

        let mut interval = tokio::time::interval(self.every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = self.tick() => {}
            }
        }

        tracing::debug!(poller = %self.name, stats = ?self.stats(), "Poller stopped");
    }

    /// Spawn [`Poller::run`] on the current runtime
    pub fn spawn(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.clone().run(shutdown))
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("name", &self.name)
            .field("every", &self.every)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::OperationKey;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct CountingTask {
        calls: AtomicU64,
        fail: AtomicBool,
    }

    #[async_trait]
    impl PollTask for CountingTask {
        async fn refresh(&self) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail.load(Ordering::Relaxed) {
                anyhow::bail!("backend unreachable");
            }
            Ok(())
        }
    }

    fn poller(task: Arc<CountingTask>) -> (Poller, ConcurrencyGuard) {
        let guard = ConcurrencyGuard::new(Duration::from_secs(2));
        let poller = Poller::new("status", Duration::from_secs(30), guard.clone(), task);
        (poller, guard)
    }

    #[tokio::test]
    async fn test_tick_skips_while_foreground_busy() {
        let task = Arc::new(CountingTask::default());
        let (poller, guard) = poller(task.clone());

        let send = guard.acquire(OperationKey::Chat("c1".into())).unwrap();
        assert_eq!(poller.tick().await, TickOutcome::Skipped);
        assert_eq!(task.calls.load(Ordering::Relaxed), 0);

        drop(send);
        assert_eq!(poller.tick().await, TickOutcome::Ran);
        assert_eq!(
            poller.stats(),
            PollerStats {
                ran: 1,
                skipped: 1,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_download_does_not_block_polling() {
        let task = Arc::new(CountingTask::default());
        let (poller, guard) = poller(task);

        let _download = guard.acquire(OperationKey::Download).unwrap();
        assert_eq!(poller.tick().await, TickOutcome::Ran);
    }

    #[tokio::test]
    async fn test_failures_are_counted() {
        let task = Arc::new(CountingTask::default());
        task.fail.store(true, Ordering::Relaxed);
        let (poller, _guard) = poller(task);

        assert_eq!(
            poller.tick().await,
            TickOutcome::Failed("backend unreachable".into())
        );
        assert_eq!(poller.stats().failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_on_interval_until_shutdown() {
        let task = Arc::new(CountingTask::default());
        task.fail.store(true, Ordering::Relaxed);
        let (poller, _guard) = poller(task.clone());
        let shutdown = CancellationToken::new();

        let handle = poller.spawn(shutdown.clone());

        // Immediate first tick, then one per 30s; failures keep the loop alive
        tokio::time::sleep(Duration::from_secs(61)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(task.calls.load(Ordering::Relaxed), 3);
        assert_eq!(poller.stats().failed, 3);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(task.calls.load(Ordering::Relaxed), 3);
    }
}
