//! Single-flight loading of optional feature bundles.
//!
//! A bundle is requested by name. The first request for a name spawns its
//! loader; every request that arrives while that load is in flight waits on
//! the same result. A loaded bundle is cached for the life of the loader,
//! a failed one may be requested again.
//!
//! # Example
//!
//! ```rust
//! use vitals_sdk::{BundleDescriptor, BundleLoader, Priority};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let loader = BundleLoader::new([BundleDescriptor::new(
//!     "charts",
//!     Priority::Medium,
//!     || async { Ok::<_, std::io::Error>("chart module") },
//! )]);
//!
//! let module = loader.request_load("charts").await.unwrap();
//! assert_eq!(module.downcast_ref::<&str>(), Some(&"chart module"));
//! assert!(loader.is_loaded("charts"));
//! # }
//! ```

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::LoadError;
use crate::idle::{IdleDeadline, IdleScheduler};
use crate::signal::InteractionSignal;

/// A loaded bundle. Downcast to the concrete module type.
pub type BundleModule = Arc<dyn Any + Send + Sync>;

/// Outcome of a bundle request.
pub type LoadResult = Result<BundleModule, LoadError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type LoaderFn = Arc<dyn Fn() -> BoxFuture<'static, Result<BundleModule, BoxError>> + Send + Sync>;

/// When a bundle is loaded relative to startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Requested immediately at initialization.
    Critical,
    /// Preloaded at the first idle opportunity.
    Medium,
    /// Preloaded only after the first user interaction.
    Low,
}

impl Priority {
    fn tier(self) -> usize {
        self as usize
    }
}

/// A named bundle and how to load it.
#[derive(Clone)]
pub struct BundleDescriptor {
    name: String,
    priority: Priority,
    loader: LoaderFn,
}

impl BundleDescriptor {
    /// Describe a bundle.
    ///
    /// `loader` is invoked once per load attempt.
    pub fn new<F, Fut, M, E>(name: impl Into<String>, priority: Priority, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<M, E>> + Send + 'static,
        M: Any + Send + Sync,
        E: Into<BoxError> + Send + 'static,
    {
        let loader: LoaderFn = Arc::new(move || {
            let load = loader();
            async move {
                load.await
                    .map(|module| Arc::new(module) as BundleModule)
                    .map_err(Into::into)
            }
            .boxed()
        });
        Self {
            name: name.into(),
            priority,
            loader,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }
}

impl std::fmt::Debug for BundleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Load state of one bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    NotRequested,
    Loading,
    Loaded,
    Failed,
}

/// Read-only snapshot of the loader, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoaderStatus {
    pub loaded: Vec<String>,
    pub loading: Vec<String>,
    pub failed: Vec<String>,
    /// Queued names in the order they will be processed.
    pub queued: Vec<String>,
}

enum Slot {
    Loading(watch::Receiver<Option<LoadResult>>),
    Loaded(BundleModule),
    Failed(LoadError),
}

/// Names awaiting an idle opportunity, FIFO within each priority tier.
#[derive(Debug, Default)]
struct PreloadQueue {
    tiers: [VecDeque<String>; 3],
}

impl PreloadQueue {
    fn contains(&self, name: &str) -> bool {
        self.tiers.iter().any(|tier| tier.iter().any(|n| n == name))
    }

    fn push(&mut self, name: &str, priority: Priority) -> bool {
        if self.contains(name) {
            return false;
        }
        self.tiers[priority.tier()].push_back(name.to_string());
        true
    }

    fn pop(&mut self) -> Option<String> {
        self.tiers.iter_mut().find_map(VecDeque::pop_front)
    }

    fn remove(&mut self, name: &str) {
        for tier in &mut self.tiers {
            tier.retain(|n| n != name);
        }
    }

    fn is_empty(&self) -> bool {
        self.tiers.iter().all(VecDeque::is_empty)
    }

    fn names(&self) -> Vec<String> {
        self.tiers.iter().flatten().cloned().collect()
    }
}

#[derive(Default)]
struct LoaderState {
    slots: HashMap<String, Slot>,
    queue: PreloadQueue,
}

struct Inner {
    descriptors: HashMap<String, BundleDescriptor>,
    /// Registration order, used when applying the startup policy.
    order: Vec<String>,
    state: Mutex<LoaderState>,
    queued: Notify,
}

enum Pending {
    Ready(LoadResult),
    Waiting(String, watch::Receiver<Option<LoadResult>>),
}

/// Deduplicating, priority-aware bundle loader.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct BundleLoader {
    inner: Arc<Inner>,
}

impl BundleLoader {
    /// Create a loader for a fixed set of bundles.
    ///
    /// A later descriptor with the same name replaces an earlier one.
    pub fn new(descriptors: impl IntoIterator<Item = BundleDescriptor>) -> Self {
        let mut order = Vec::new();
        let mut map = HashMap::new();
        for descriptor in descriptors {
            if !map.contains_key(&descriptor.name) {
                order.push(descriptor.name.clone());
            }
            map.insert(descriptor.name.clone(), descriptor);
        }
        Self {
            inner: Arc::new(Inner {
                descriptors: map,
                order,
                state: Mutex::new(LoaderState::default()),
                queued: Notify::new(),
            }),
        }
    }

    /// Request a bundle.
    ///
    /// The request takes effect when this is called, not when the returned
    /// future is first polled. Loads run on the tokio runtime and finish
    /// even if every caller drops its future.
    pub fn request_load(&self, name: &str) -> impl Future<Output = LoadResult> + Send + 'static {
        let pending = self.begin(name);
        async move {
            match pending {
                Pending::Ready(result) => result,
                Pending::Waiting(name, rx) => wait_for_result(name, rx).await,
            }
        }
    }

    /// Queue a bundle for the next idle opportunity.
    ///
    /// Returns `false` if the bundle is unknown, already loaded, loading or
    /// queued.
    pub fn schedule_preload(&self, name: &str) -> bool {
        let Some(descriptor) = self.inner.descriptors.get(name) else {
            warn!(bundle = name, "cannot preload unknown bundle");
            return false;
        };

        {
            let mut state = self.inner.state.lock();
            if matches!(
                state.slots.get(name),
                Some(Slot::Loaded(_) | Slot::Loading(_))
            ) {
                return false;
            }
            if !state.queue.push(name, descriptor.priority) {
                return false;
            }
        }

        trace!(bundle = name, "queued for preload");
        self.inner.queued.notify_one();
        true
    }

    /// Start queued loads while the deadline has time remaining.
    ///
    /// Returns the number of loads started. Whatever is left stays queued
    /// for the next opportunity.
    pub fn process_queue_once(&self, deadline: &IdleDeadline) -> usize {
        let mut started = 0;
        while deadline.has_time_remaining() {
            let Some(name) = self.inner.state.lock().queue.pop() else {
                break;
            };
            // The load is spawned; there is nothing to wait for here.
            drop(self.begin(&name));
            started += 1;
        }
        started
    }

    /// Drain the preload queue at each idle opportunity, forever.
    ///
    /// Run this as a background task.
    pub async fn process_queue(&self, idle: &dyn IdleScheduler) {
        loop {
            while !self.has_queued() {
                self.inner.queued.notified().await;
            }
            let deadline = idle.next_idle().await;
            let started = self.process_queue_once(&deadline);
            if started > 0 {
                debug!(started, "preloaded bundles during idle time");
            }
            tokio::task::yield_now().await;
        }
    }

    /// Apply the startup policy to every registered bundle.
    ///
    /// Critical bundles are requested immediately and medium bundles are
    /// queued for idle time. Low bundles are queued by the returned task
    /// once `interaction` fires.
    pub fn initialize(&self, interaction: InteractionSignal) -> JoinHandle<()> {
        for name in self.names_in(Priority::Critical) {
            drop(self.begin(&name));
        }
        for name in self.names_in(Priority::Medium) {
            self.schedule_preload(&name);
        }

        let loader = self.clone();
        tokio::spawn(async move {
            let kind = interaction.first().await;
            debug!(?kind, "first interaction, queueing low priority bundles");
            for name in loader.names_in(Priority::Low) {
                loader.schedule_preload(&name);
            }
        })
    }

    /// Current state of one bundle.
    pub fn state(&self, name: &str) -> LoadState {
        match self.inner.state.lock().slots.get(name) {
            None => LoadState::NotRequested,
            Some(Slot::Loading(_)) => LoadState::Loading,
            Some(Slot::Loaded(_)) => LoadState::Loaded,
            Some(Slot::Failed(_)) => LoadState::Failed,
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.state(name) == LoadState::Loaded
    }

    /// The loaded module, without requesting it.
    pub fn get(&self, name: &str) -> Option<BundleModule> {
        match self.inner.state.lock().slots.get(name) {
            Some(Slot::Loaded(module)) => Some(module.clone()),
            _ => None,
        }
    }

    /// The last error for a failed bundle.
    pub fn last_error(&self, name: &str) -> Option<LoadError> {
        match self.inner.state.lock().slots.get(name) {
            Some(Slot::Failed(err)) => Some(err.clone()),
            _ => None,
        }
    }

    /// Snapshot of loaded, loading, failed and queued bundles.
    pub fn status(&self) -> LoaderStatus {
        let state = self.inner.state.lock();
        let mut status = LoaderStatus {
            queued: state.queue.names(),
            ..Default::default()
        };
        for (name, slot) in &state.slots {
            let bucket = match slot {
                Slot::Loading(_) => &mut status.loading,
                Slot::Loaded(_) => &mut status.loaded,
                Slot::Failed(_) => &mut status.failed,
            };
            bucket.push(name.clone());
        }
        status.loaded.sort();
        status.loading.sort();
        status.failed.sort();
        status
    }

    /// Registered bundle names with the given priority, in registration order.
    pub fn names_in(&self, priority: Priority) -> Vec<String> {
        self.inner
            .order
            .iter()
            .filter(|name| {
                self.inner
                    .descriptors
                    .get(name.as_str())
                    .is_some_and(|d| d.priority == priority)
            })
            .cloned()
            .collect()
    }

    fn has_queued(&self) -> bool {
        !self.inner.state.lock().queue.is_empty()
    }

    fn begin(&self, name: &str) -> Pending {
        let Some(descriptor) = self.inner.descriptors.get(name) else {
            return Pending::Ready(Err(LoadError::UnknownBundle(name.to_string())));
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(bundle = name, "no runtime available to load bundle");
            return Pending::Ready(Err(LoadError::Aborted(name.to_string())));
        };

        let (guard, rx) = {
            let mut state = self.inner.state.lock();
            match state.slots.get(name) {
                Some(Slot::Loaded(module)) => return Pending::Ready(Ok(module.clone())),
                Some(Slot::Loading(rx)) => return Pending::Waiting(name.to_string(), rx.clone()),
                Some(Slot::Failed(_)) | None => {}
            }
            state.queue.remove(name);
            let (tx, rx) = watch::channel(None);
            state.slots.insert(name.to_string(), Slot::Loading(rx.clone()));
            let guard = LoadGuard {
                inner: self.inner.clone(),
                name: name.to_string(),
                tx: Some(tx),
            };
            (guard, rx)
        };

        runtime.spawn(run_load(descriptor.clone(), guard));
        Pending::Waiting(name.to_string(), rx)
    }
}

impl std::fmt::Debug for BundleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleLoader")
            .field("bundles", &self.inner.order)
            .finish()
    }
}

/// Publishes the outcome of one load attempt.
///
/// Dropped without publishing (the task was aborted or its runtime shut
/// down), it marks the bundle failed so a later request starts over.
struct LoadGuard {
    inner: Arc<Inner>,
    name: String,
    tx: Option<watch::Sender<Option<LoadResult>>>,
}

impl LoadGuard {
    fn publish(&mut self, result: LoadResult) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let slot = match &result {
            Ok(module) => Slot::Loaded(module.clone()),
            Err(err) => Slot::Failed(err.clone()),
        };
        self.inner.state.lock().slots.insert(self.name.clone(), slot);

        // No receivers just means nobody is waiting.
        let _ = tx.send(Some(result));
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        if self.tx.is_some() {
            debug!(bundle = %self.name, "load abandoned before completing");
            self.publish(Err(LoadError::Aborted(self.name.clone())));
        }
    }
}

async fn run_load(descriptor: BundleDescriptor, mut guard: LoadGuard) {
    let name = descriptor.name.clone();
    debug!(bundle = %name, priority = ?descriptor.priority, "loading bundle");

    let loader = descriptor.loader.clone();
    let outcome = AssertUnwindSafe(async move { loader().await })
        .catch_unwind()
        .await;

    let result = match outcome {
        Ok(Ok(module)) => Ok(module),
        Ok(Err(err)) => Err(LoadError::Failed {
            bundle: name.clone(),
            message: err.to_string(),
        }),
        Err(_) => Err(LoadError::Panicked(name.clone())),
    };

    match &result {
        Ok(_) => info!(bundle = %name, "bundle loaded"),
        Err(err) => warn!(bundle = %name, error = %err, "bundle load failed"),
    }
    guard.publish(result);
}

async fn wait_for_result(name: String, mut rx: watch::Receiver<Option<LoadResult>>) -> LoadResult {
    match rx.wait_for(Option::is_some).await {
        Ok(result) => (*result)
            .clone()
            .unwrap_or_else(|| Err(LoadError::Aborted(name))),
        Err(_) => Err(LoadError::Aborted(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idle::{HostIdleScheduler, IdleConfig};
    use crate::signal::InteractionKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting(name: &str, priority: Priority, calls: Arc<AtomicUsize>) -> BundleDescriptor {
        let module = format!("{name}-module");
        BundleDescriptor::new(name, priority, move || {
            let calls = calls.clone();
            let module = module.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, std::io::Error>(module)
            }
        })
    }

    /// Fails on the first attempt, succeeds afterwards.
    fn flaky(name: &str, calls: Arc<AtomicUsize>) -> BundleDescriptor {
        BundleDescriptor::new(name, Priority::Medium, move || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if attempt == 0 {
                    Err(std::io::Error::new(std::io::ErrorKind::Other, "network down"))
                } else {
                    Ok(attempt)
                }
            }
        })
    }

    fn noop(name: &str, priority: Priority) -> BundleDescriptor {
        counting(name, priority, Arc::new(AtomicUsize::new(0)))
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_share_one_load() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = BundleLoader::new([counting("charts", Priority::Medium, calls.clone())]);

        let requests: Vec<_> = (0..10).map(|_| loader.request_load("charts")).collect();
        assert_eq!(loader.state("charts"), LoadState::Loading);

        let results = futures_util::future::join_all(requests).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let first = results[0].as_ref().unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
        }
        assert_eq!(first.downcast_ref::<String>().unwrap(), "charts-module");
    }

    #[tokio::test(start_paused = true)]
    async fn loaded_bundle_resolves_without_reloading() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = BundleLoader::new([counting("charts", Priority::Medium, calls.clone())]);

        loader.request_load("charts").await.unwrap();
        assert_eq!(loader.state("charts"), LoadState::Loaded);

        let again = loader.request_load("charts");
        assert_eq!(loader.state("charts"), LoadState::Loaded);
        again.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(loader.get("charts").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_load_can_be_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = BundleLoader::new([flaky("editor", calls.clone())]);

        let err = loader.request_load("editor").await.unwrap_err();
        assert!(matches!(err, LoadError::Failed { ref message, .. } if message == "network down"));
        assert_eq!(loader.state("editor"), LoadState::Failed);
        assert_eq!(loader.last_error("editor"), Some(err));

        let module = loader.request_load("editor").await.unwrap();
        assert_eq!(module.downcast_ref::<usize>(), Some(&1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(loader.state("editor"), LoadState::Loaded);
        assert_eq!(loader.last_error("editor"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_delivered_to_every_waiter() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = BundleLoader::new([flaky("editor", calls.clone())]);

        let a = loader.request_load("editor");
        let b = loader.request_load("editor");
        let (a, b) = tokio::join!(a, b);

        assert_eq!(a.unwrap_err(), b.unwrap_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_bundle_is_an_error_value() {
        let loader = BundleLoader::new([]);
        let err = loader.request_load("nope").await.unwrap_err();
        assert_eq!(err, LoadError::UnknownBundle("nope".into()));
        assert_eq!(loader.state("nope"), LoadState::NotRequested);
        assert!(!loader.schedule_preload("nope"));
    }

    #[tokio::test]
    async fn panicking_loader_fails_instead_of_crashing() {
        let loader = BundleLoader::new([BundleDescriptor::new(
            "broken",
            Priority::Critical,
            || async {
                if true {
                    panic!("bad bundle");
                }
                Ok::<_, std::io::Error>(())
            },
        )]);

        let err = loader.request_load("broken").await.unwrap_err();
        assert_eq!(err, LoadError::Panicked("broken".into()));
        assert_eq!(loader.state("broken"), LoadState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_request_still_completes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = BundleLoader::new([counting("maps", Priority::Low, calls.clone())]);

        drop(loader.request_load("maps"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(loader.is_loaded("maps"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn request_without_runtime_fails_gracefully() {
        let loader = BundleLoader::new([noop("charts", Priority::Medium)]);
        let result = futures_util::FutureExt::now_or_never(loader.request_load("charts"));
        assert_eq!(result.unwrap().unwrap_err(), LoadError::Aborted("charts".into()));
        assert_eq!(loader.state("charts"), LoadState::NotRequested);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_preload_skips_loaded_loading_and_queued() {
        let loader = BundleLoader::new([
            noop("a", Priority::Medium),
            noop("b", Priority::Medium),
            noop("c", Priority::Medium),
        ]);

        loader.request_load("a").await.unwrap();
        let _pending = loader.request_load("b");

        assert!(!loader.schedule_preload("a"));
        assert!(!loader.schedule_preload("b"));
        assert!(loader.schedule_preload("c"));
        assert!(!loader.schedule_preload("c"));
        assert_eq!(loader.status().queued, ["c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_is_fifo_within_tier_and_ordered_by_priority() {
        let loader = BundleLoader::new([
            noop("low-1", Priority::Low),
            noop("med-1", Priority::Medium),
            noop("low-2", Priority::Low),
            noop("med-2", Priority::Medium),
        ]);
        for name in ["low-1", "med-1", "low-2", "med-2"] {
            assert!(loader.schedule_preload(name));
        }
        assert_eq!(loader.status().queued, ["med-1", "med-2", "low-1", "low-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_deadline_leaves_work_queued() {
        let loader = BundleLoader::new([noop("a", Priority::Medium), noop("b", Priority::Medium)]);
        loader.schedule_preload("a");
        loader.schedule_preload("b");

        let spent = IdleDeadline::new(Duration::ZERO);
        assert_eq!(loader.process_queue_once(&spent), 0);
        assert_eq!(loader.status().queued, ["a", "b"]);

        let deadline = IdleDeadline::new(Duration::from_millis(50));
        assert_eq!(loader.process_queue_once(&deadline), 2);

        let status = loader.status();
        assert!(status.queued.is_empty());
        assert_eq!(status.loading, ["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn request_removes_name_from_queue() {
        let loader = BundleLoader::new([noop("a", Priority::Medium)]);
        loader.schedule_preload("a");
        let _pending = loader.request_load("a");
        assert!(loader.status().queued.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn status_does_not_mutate() {
        let loader = BundleLoader::new([noop("a", Priority::Medium), noop("b", Priority::Low)]);
        loader.schedule_preload("a");
        let before = loader.status();
        let after = loader.status();
        assert_eq!(before, after);
        assert_eq!(loader.state("b"), LoadState::NotRequested);
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_applies_priority_tiers() {
        let loader = BundleLoader::new([
            noop("analytics", Priority::Low),
            noop("hero", Priority::Critical),
            noop("pricing", Priority::Medium),
            noop("chat", Priority::Low),
        ]);
        let interaction = InteractionSignal::new();

        let gate = loader.initialize(interaction.clone());

        let status = loader.status();
        assert_eq!(status.loading, ["hero"]);
        assert_eq!(status.queued, ["pricing"]);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!gate.is_finished());
        assert_eq!(loader.state("analytics"), LoadState::NotRequested);
        assert!(!loader.status().queued.contains(&"chat".to_string()));

        interaction.notify(InteractionKind::Click);
        gate.await.unwrap();
        assert_eq!(loader.status().queued, ["pricing", "analytics", "chat"]);
        assert!(loader.is_loaded("hero"));
    }

    #[tokio::test(start_paused = true)]
    async fn background_processor_runs_on_idle() {
        let loader = BundleLoader::new([noop("pricing", Priority::Medium)]);
        let (notifier, idle) = HostIdleScheduler::channel(&IdleConfig::default());

        let processor = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.process_queue(&idle).await })
        };

        loader.schedule_preload("pricing");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(loader.status().queued, ["pricing"]);

        notifier.idle(Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(loader.is_loaded("pricing"));

        processor.abort();
    }

    #[test]
    fn names_in_preserves_registration_order() {
        let loader = BundleLoader::new([
            noop("b", Priority::Low),
            noop("a", Priority::Low),
            noop("c", Priority::Critical),
        ]);
        assert_eq!(loader.names_in(Priority::Low), ["b", "a"]);
        assert_eq!(loader.names_in(Priority::Critical), ["c"]);
        assert!(loader.names_in(Priority::Medium).is_empty());
    }

    #[test]
    fn load_dropped_with_its_runtime_can_be_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let loader = BundleLoader::new([BundleDescriptor::new("charts", Priority::Medium, move || {
            let first = counter.fetch_add(1, Ordering::SeqCst) == 0;
            async move {
                if first {
                    std::future::pending::<()>().await;
                }
                Ok::<_, std::io::Error>("charts")
            }
        })]);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            drop(loader.request_load("charts"));
            tokio::task::yield_now().await;
        });
        assert_eq!(loader.state("charts"), LoadState::Loading);

        drop(runtime);
        assert_eq!(loader.state("charts"), LoadState::Failed);
        assert!(matches!(loader.last_error("charts"), Some(LoadError::Aborted(_))));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let module = runtime
            .block_on(async { loader.request_load("charts").await })
            .unwrap();
        assert_eq!(module.downcast_ref::<&str>(), Some(&"charts"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
