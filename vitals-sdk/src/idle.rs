//! Idle scheduling opportunities.
//!
//! Non-urgent work (preloading medium and low priority bundles) runs only
//! when the host reports spare time. Hosts with a native idle callback
//! feed it through [`HostIdleScheduler`]; everything else falls back to a
//! fixed-delay timer.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::trace;

/// Tuning for idle scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Delay before each opportunity when the host has no idle primitive.
    pub fallback_delay_ms: u64,
    /// Time budget granted to each opportunity.
    pub budget_ms: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            fallback_delay_ms: 1000,
            budget_ms: 50,
        }
    }
}

impl IdleConfig {
    pub fn fallback_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_delay_ms)
    }

    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }
}

/// The time budget of one idle opportunity.
#[derive(Debug, Clone, Copy)]
pub struct IdleDeadline {
    started: Instant,
    budget: Duration,
}

impl IdleDeadline {
    /// Start a deadline now.
    pub fn new(budget: Duration) -> Self {
        Self::starting_at(Instant::now(), budget)
    }

    /// A deadline whose budget started running at `started`.
    pub fn starting_at(started: Instant, budget: Duration) -> Self {
        Self { started, budget }
    }

    pub fn time_remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started.elapsed())
    }

    pub fn has_time_remaining(&self) -> bool {
        !self.time_remaining().is_zero()
    }
}

/// Source of idle scheduling opportunities.
#[async_trait]
pub trait IdleScheduler: Send + Sync + Debug {
    /// Wait for the next opportunity.
    async fn next_idle(&self) -> IdleDeadline;
}

/// Fallback scheduler: every opportunity arrives after a fixed delay.
#[derive(Debug, Clone)]
pub struct TimerIdleScheduler {
    delay: Duration,
    budget: Duration,
}

impl TimerIdleScheduler {
    pub fn new(delay: Duration, budget: Duration) -> Self {
        Self { delay, budget }
    }

    pub fn from_config(config: &IdleConfig) -> Self {
        Self::new(config.fallback_delay(), config.budget())
    }
}

impl Default for TimerIdleScheduler {
    fn default() -> Self {
        Self::from_config(&IdleConfig::default())
    }
}

#[async_trait]
impl IdleScheduler for TimerIdleScheduler {
    async fn next_idle(&self) -> IdleDeadline {
        tokio::time::sleep(self.delay).await;
        IdleDeadline::new(self.budget)
    }
}

#[derive(Debug, Clone, Copy)]
struct IdleReport {
    at: Instant,
    budget: Duration,
}

/// Host side of a [`HostIdleScheduler`]: report spare time as it happens.
///
/// Only the latest report is kept. Its budget runs from the moment it was
/// reported, so a report nobody picked up in time is discarded.
#[derive(Debug, Clone)]
pub struct IdleNotifier {
    tx: Arc<watch::Sender<Option<IdleReport>>>,
}

impl IdleNotifier {
    /// Report an idle period with the given budget.
    ///
    /// Returns `false` if the scheduler has been dropped.
    pub fn idle(&self, budget: Duration) -> bool {
        let report = IdleReport {
            at: Instant::now(),
            budget,
        };
        self.tx.send(Some(report)).is_ok()
    }
}

/// Scheduler driven by the host's own idle callback.
///
/// Once every [`IdleNotifier`] is dropped the scheduler degrades to the
/// fixed-delay fallback.
#[derive(Debug)]
pub struct HostIdleScheduler {
    rx: Mutex<watch::Receiver<Option<IdleReport>>>,
    fallback: TimerIdleScheduler,
}

impl HostIdleScheduler {
    /// Create a scheduler and the notifier the host calls into.
    pub fn channel(config: &IdleConfig) -> (IdleNotifier, Self) {
        let (tx, rx) = watch::channel(None);
        let scheduler = Self {
            rx: Mutex::new(rx),
            fallback: TimerIdleScheduler::from_config(config),
        };
        (IdleNotifier { tx: Arc::new(tx) }, scheduler)
    }
}

#[async_trait]
impl IdleScheduler for HostIdleScheduler {
    async fn next_idle(&self) -> IdleDeadline {
        let mut rx = self.rx.lock().await;
        loop {
            if rx.changed().await.is_err() {
                return self.fallback.next_idle().await;
            }
            let report = *rx.borrow_and_update();
            let Some(report) = report else {
                continue;
            };
            let deadline = IdleDeadline::starting_at(report.at, report.budget);
            if deadline.has_time_remaining() {
                return deadline;
            }
            trace!("idle report expired before use");
        }
    }
}
