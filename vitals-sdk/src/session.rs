//! The process-wide context tying loader, batcher and signals together.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::batcher::{BatcherConfig, MetricsBatcher, TeardownFlush};
use crate::enhance::EnvironmentContext;
use crate::idle::{IdleConfig, IdleScheduler, TimerIdleScheduler};
use crate::loader::{BundleDescriptor, BundleLoader};
use crate::monitor::PerformanceMonitor;
use crate::output::Output;
use crate::signal::{InteractionSignal, TeardownReason, TeardownSignal};

/// Serializable session settings, suitable for embedding in a host config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub batcher: BatcherConfig,
    pub idle: IdleConfig,
    pub environment: EnvironmentContext,
}

/// One loader, one batcher and their host signals.
///
/// Construct once at startup with [`Session::builder`], call
/// [`start`](Session::start), hand clones of the loader and monitor to the
/// rest of the application, and call [`SessionHandle::shutdown`] on exit.
///
/// # Example
///
/// ```rust,no_run
/// use vitals_sdk::{BundleDescriptor, Output, Priority, Session, TeardownReason};
///
/// #[tokio::main]
/// async fn main() {
///     let session = Session::builder()
///         .bundle(BundleDescriptor::new("hero", Priority::Critical, || async {
///             Ok::<_, std::io::Error>("hero")
///         }))
///         .output(Output::file("vitals.ndjson"))
///         .build();
///
///     let handle = session.start();
///
///     // ... the host reports entries and interactions ...
///     session.monitor().record("FCP", 850.0);
///
///     // Host is going away
///     session.teardown_signal().fire(TeardownReason::Hidden);
///     handle.shutdown();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    session_id: String,
    loader: BundleLoader,
    monitor: PerformanceMonitor,
    idle: Arc<dyn IdleScheduler>,
    interaction: InteractionSignal,
    teardown: TeardownSignal,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn loader(&self) -> &BundleLoader {
        &self.loader
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn batcher(&self) -> &MetricsBatcher {
        self.monitor.batcher()
    }

    /// Host side of the first-interaction signal.
    pub fn interaction_signal(&self) -> InteractionSignal {
        self.interaction.clone()
    }

    /// Host side of the teardown signal.
    pub fn teardown_signal(&self) -> TeardownSignal {
        self.teardown.clone()
    }

    /// Apply the bundle startup policy and spawn the background tasks.
    ///
    /// Background tasks: the idle-time preload processor, the low-priority
    /// interaction gate, LCP finalization on first interaction, and the
    /// teardown watcher.
    pub fn start(&self) -> SessionHandle {
        info!(session = %self.session_id, "starting vitals session");

        let gate = self.loader.initialize(self.interaction.clone());

        let processor = {
            let loader = self.loader.clone();
            let idle = self.idle.clone();
            tokio::spawn(async move { loader.process_queue(idle.as_ref()).await })
        };

        let lcp = {
            let interaction = self.interaction.clone();
            let monitor = self.monitor.clone();
            tokio::spawn(async move {
                interaction.first().await;
                monitor.finalize_lcp();
            })
        };

        let watcher = {
            let teardown = self.teardown.clone();
            let monitor = self.monitor.clone();
            tokio::spawn(async move {
                let reason = teardown.wait().await;
                debug!(?reason, "teardown signalled");
                flush_for_teardown(&monitor);
            })
        };

        SessionHandle {
            session: self.clone(),
            tasks: vec![gate, processor, lcp, watcher],
        }
    }
}

fn flush_for_teardown(monitor: &PerformanceMonitor) -> TeardownFlush {
    monitor.finalize();
    let outcome = monitor.batcher().flush_on_teardown();
    debug!(?outcome, "teardown flush");
    outcome
}

/// Handle for a started session.
///
/// Dropping the handle leaves background tasks running; call
/// [`shutdown`](SessionHandle::shutdown) to stop them.
#[derive(Debug)]
pub struct SessionHandle {
    session: Session,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionHandle {
    /// Stop background tasks and run the teardown flush if it has not run yet.
    pub fn shutdown(self) -> TeardownFlush {
        for task in &self.tasks {
            task.abort();
        }
        self.session.teardown.fire(TeardownReason::Shutdown);
        let outcome = flush_for_teardown(&self.session.monitor);
        info!(session = %self.session.session_id, ?outcome, "vitals session stopped");
        outcome
    }
}

/// Builder for configuring a [`Session`].
#[derive(Debug, Default)]
pub struct SessionBuilder {
    bundles: Vec<BundleDescriptor>,
    outputs: Vec<Output>,
    config: SessionConfig,
    idle_scheduler: Option<Arc<dyn IdleScheduler>>,
    session_id: Option<String>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bundle.
    pub fn bundle(mut self, descriptor: BundleDescriptor) -> Self {
        self.bundles.push(descriptor);
        self
    }

    /// Register several bundles.
    pub fn bundles(mut self, descriptors: impl IntoIterator<Item = BundleDescriptor>) -> Self {
        self.bundles.extend(descriptors);
        self
    }

    /// Add an output destination.
    ///
    /// Multiple outputs can be added; batches are sent to all of them.
    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    /// Replace all settings at once.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn batcher_config(mut self, config: BatcherConfig) -> Self {
        self.config.batcher = config;
        self
    }

    pub fn idle_config(mut self, config: IdleConfig) -> Self {
        self.config.idle = config;
        self
    }

    pub fn environment(mut self, env: EnvironmentContext) -> Self {
        self.config.environment = env;
        self
    }

    /// Use the host's idle primitive instead of the fixed-delay fallback.
    pub fn idle_scheduler(mut self, scheduler: impl IdleScheduler + 'static) -> Self {
        self.idle_scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Set the session id. Defaults to a random UUID.
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Build the session. Must be called inside a tokio runtime.
    pub fn build(self) -> Session {
        let session_id = self
            .session_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let batcher = MetricsBatcher::new(self.config.batcher, session_id.clone(), self.outputs);
        let monitor = PerformanceMonitor::new(batcher, self.config.environment);
        let idle = self
            .idle_scheduler
            .unwrap_or_else(|| Arc::new(TimerIdleScheduler::from_config(&self.config.idle)));

        Session {
            session_id,
            loader: BundleLoader::new(self.bundles),
            monitor,
            idle,
            interaction: InteractionSignal::new(),
            teardown: TeardownSignal::new(),
        }
    }
}
