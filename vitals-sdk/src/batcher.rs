//! Batching of enhanced metrics with timed and teardown flushes.
//!
//! Metrics accumulate in a batch owned by the batcher. A batch is flushed
//! when it reaches the size threshold, when the flush timer fires, when the
//! host asks, or once at teardown. Flushing swaps in an empty batch under
//! the lock, so metrics added during a flush land in the next batch.
//!
//! Size, interval and manual flushes join a bounded backlog drained by a
//! single dispatcher task, which sends batches in the order they were
//! formed. The teardown flush drains whatever is still in the backlog and
//! sends it, oldest first, through each output's beacon ahead of the final
//! batch.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use vitals_types::{now_ms, BatchPayload, EnhancedMetric, FlushReason};

use crate::output::{Output, Transport};

/// Tuning for the metrics batcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// Flush as soon as this many metrics are pending.
    pub batch_size: usize,
    /// Flush this long after the first metric of a batch arrives.
    pub flush_interval_ms: u64,
    /// Formed batches waiting for the transport before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            flush_interval_ms: 10_000,
            queue_capacity: 16,
        }
    }
}

impl BatcherConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// What the teardown flush did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownFlush {
    /// Teardown already ran once; nothing was sent.
    AlreadyFlushed,
    /// No metrics were pending or queued.
    Empty,
    /// At least one output accepted the beacon.
    Sent { metrics: usize },
    /// No output accepted the beacon; the metrics are lost.
    Dropped { metrics: usize },
}

#[derive(Default)]
struct BatchState {
    batch: Vec<EnhancedMetric>,
    timer: Option<(u64, JoinHandle<()>)>,
    next_timer_id: u64,
}

impl BatchState {
    fn cancel_timer(&mut self) {
        if let Some((_, timer)) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Rejected {
    Full,
    Closed,
}

/// Formed batches waiting for the dispatcher, oldest first.
struct Backlog {
    queue: Mutex<VecDeque<BatchPayload>>,
    capacity: usize,
    ready: Notify,
    closed: AtomicBool,
}

impl Backlog {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            ready: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, payload: BatchPayload) -> Result<(), Rejected> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Rejected::Closed);
        }
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                return Err(Rejected::Full);
            }
            queue.push_back(payload);
        }
        self.ready.notify_one();
        Ok(())
    }

    /// Wait for the oldest batch. `None` once closed and empty.
    async fn next(&self) -> Option<BatchPayload> {
        loop {
            let next = self.queue.lock().pop_front();
            if next.is_some() {
                return next;
            }
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.ready.notified().await;
        }
    }

    fn drain(&self) -> Vec<BatchPayload> {
        self.queue.lock().drain(..).collect()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.ready.notify_one();
    }
}

struct Inner {
    config: BatcherConfig,
    session_id: String,
    outputs: Arc<Vec<Output>>,
    /// Runtime for the dispatcher and flush timers, captured at construction
    /// so `add` works from threads outside the runtime.
    runtime: Option<Handle>,
    state: Mutex<BatchState>,
    backlog: Arc<Backlog>,
    torn_down: AtomicBool,
}

impl Inner {
    /// Queue a formed batch. Called with the state lock held so the backlog
    /// order matches formation order.
    fn enqueue(&self, metrics: Vec<EnhancedMetric>, reason: FlushReason) {
        if metrics.is_empty() {
            return;
        }
        let count = metrics.len();
        let payload = BatchPayload::new(self.session_id.clone(), now_ms(), reason, metrics);
        match self.backlog.push(payload) {
            Ok(()) => trace!(metrics = count, %reason, "batch queued for transport"),
            Err(Rejected::Full) => {
                warn!(metrics = count, %reason, "transport backlog full, dropping batch")
            }
            Err(Rejected::Closed) => {
                warn!(metrics = count, %reason, "transport dispatcher stopped, dropping batch")
            }
        }
    }

    fn flush_timed(&self, timer_id: u64) {
        let mut state = self.state.lock();
        if !matches!(state.timer, Some((id, _)) if id == timer_id) {
            // Superseded by a size or manual flush.
            return;
        }
        state.timer = None;
        let batch = std::mem::take(&mut state.batch);
        self.enqueue(batch, FlushReason::Interval);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.backlog.close();
    }
}

/// Buffers enhanced metrics and hands them to the configured outputs.
///
/// Cloning is cheap; clones share the same batch. Create it inside a tokio
/// runtime: the dispatcher and flush timers run there, and the handle may
/// then be used from any thread. Without a runtime nothing is sent until
/// [`flush_on_teardown`](MetricsBatcher::flush_on_teardown).
///
/// # Example
///
/// ```rust
/// use vitals_sdk::{enhance, BatcherConfig, EnvironmentContext, MetricsBatcher, Observation, Output};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (output, mut rx) = Output::channel(8);
/// let batcher = MetricsBatcher::new(BatcherConfig::default(), "session-1", vec![output]);
///
/// let metric = enhance(Observation::new("FCP", 900.0, "a", 0), &EnvironmentContext::default());
/// batcher.add(metric);
/// batcher.flush();
///
/// let batch = rx.recv().await.unwrap();
/// assert_eq!(batch.len(), 1);
/// # }
/// ```
#[derive(Clone)]
pub struct MetricsBatcher {
    inner: Arc<Inner>,
}

impl MetricsBatcher {
    pub fn new(config: BatcherConfig, session_id: impl Into<String>, outputs: Vec<Output>) -> Self {
        let outputs = Arc::new(outputs);
        let backlog = Arc::new(Backlog::new(config.queue_capacity.max(1)));

        let runtime = Handle::try_current().ok();
        match &runtime {
            Some(handle) => {
                handle.spawn(dispatch_loop(backlog.clone(), outputs.clone()));
            }
            None => warn!("no tokio runtime, batches will only be sent at teardown"),
        }

        Self {
            inner: Arc::new(Inner {
                config: BatcherConfig {
                    batch_size: config.batch_size.max(1),
                    ..config
                },
                session_id: session_id.into(),
                outputs,
                runtime,
                state: Mutex::new(BatchState::default()),
                backlog,
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    /// Append a metric to the current batch.
    ///
    /// Flushes immediately at the size threshold, otherwise makes sure a
    /// flush timer is pending.
    pub fn add(&self, metric: EnhancedMetric) {
        let mut state = self.inner.state.lock();
        state.batch.push(metric);
        if state.batch.len() >= self.inner.config.batch_size {
            state.cancel_timer();
            let batch = std::mem::take(&mut state.batch);
            self.inner.enqueue(batch, FlushReason::Size);
        } else if state.timer.is_none() {
            let id = state.next_timer_id;
            state.next_timer_id += 1;
            state.timer = self.spawn_timer(id).map(|timer| (id, timer));
        }
    }

    /// Flush the current batch now.
    ///
    /// Returns the number of metrics handed to the dispatcher.
    pub fn flush(&self) -> usize {
        let mut state = self.inner.state.lock();
        state.cancel_timer();
        let batch = std::mem::take(&mut state.batch);
        let count = batch.len();
        self.inner.enqueue(batch, FlushReason::Manual);
        count
    }

    /// Last-chance flush before the host goes away.
    ///
    /// Runs at most once per batcher. Batches still waiting for the
    /// dispatcher go first, then the pending batch, each through every
    /// output's beacon. Nothing is awaited or retried. A batch the
    /// dispatcher is already sending is left to finish on its own.
    pub fn flush_on_teardown(&self) -> TeardownFlush {
        if self.inner.torn_down.swap(true, Ordering::SeqCst) {
            return TeardownFlush::AlreadyFlushed;
        }

        let payloads = {
            let mut state = self.inner.state.lock();
            state.cancel_timer();
            let batch = std::mem::take(&mut state.batch);
            let mut payloads = self.inner.backlog.drain();
            if !batch.is_empty() {
                payloads.push(BatchPayload::new(
                    self.inner.session_id.clone(),
                    now_ms(),
                    FlushReason::Teardown,
                    batch,
                ));
            }
            payloads
        };
        if payloads.is_empty() {
            return TeardownFlush::Empty;
        }

        let metrics = payloads.iter().map(BatchPayload::len).sum();
        let mut accepted = false;
        for payload in &payloads {
            for output in self.inner.outputs.iter() {
                accepted |= output.beacon(payload);
            }
        }

        if accepted {
            debug!(metrics, "teardown batches handed off");
            TeardownFlush::Sent { metrics }
        } else {
            debug!(metrics, "teardown batches not accepted by any output");
            TeardownFlush::Dropped { metrics }
        }
    }

    /// Metrics waiting in the current batch.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().batch.len()
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.inner.config
    }

    fn spawn_timer(&self, id: u64) -> Option<JoinHandle<()>> {
        let runtime = self.inner.runtime.as_ref()?;
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let interval = self.inner.config.flush_interval();
        Some(runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            if let Some(inner) = inner.upgrade() {
                inner.flush_timed(id);
            }
        }))
    }
}

impl std::fmt::Debug for MetricsBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsBatcher")
            .field("session_id", &self.inner.session_id)
            .field("config", &self.inner.config)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Sends formed batches one at a time, in order. Failures are logged and
/// the batch is discarded.
async fn dispatch_loop(backlog: Arc<Backlog>, outputs: Arc<Vec<Output>>) {
    while let Some(payload) = backlog.next().await {
        for output in outputs.iter() {
            if let Err(err) = output.send(&payload).await {
                warn!(
                    metrics = payload.len(),
                    reason = %payload.reason,
                    error = %err,
                    "failed to send batch"
                );
            }
        }
    }
    trace!("batch dispatcher stopped");
}
