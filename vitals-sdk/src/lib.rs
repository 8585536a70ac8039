//! # vitals-sdk
//!
//! Progressive bundle loading and batched performance telemetry.
//!
//! Two independent pieces share one [`Session`]:
//!
//! - **[`BundleLoader`]** turns named bundle requests into deduplicated,
//!   priority-ordered loads. Critical bundles load at startup, medium ones
//!   in idle time, low ones after the first user interaction.
//! - **[`PerformanceMonitor`]** and **[`MetricsBatcher`]** rate raw
//!   performance observations, batch them, and flush on size, on a timer,
//!   or once when the host is torn down.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vitals_sdk::{BundleDescriptor, InteractionKind, Output, PerformanceEntry, Priority, Session};
//!
//! #[tokio::main]
//! async fn main() {
//!     let session = Session::builder()
//!         .bundle(BundleDescriptor::new("charts", Priority::Medium, || async {
//!             Ok::<_, std::io::Error>(vec![1u8, 2, 3])
//!         }))
//!         .output(Output::tcp("collector:7070"))
//!         .build();
//!
//!     let handle = session.start();
//!
//!     // Observation sources feed raw entries
//!     session.monitor().observe(PerformanceEntry::Navigation {
//!         request_start: 12.0,
//!         response_start: 340.0,
//!     });
//!
//!     // The UI layer reports the first interaction
//!     session.interaction_signal().notify(InteractionKind::Click);
//!
//!     // Application code asks for a bundle when it needs it
//!     let charts = session.loader().request_load("charts").await;
//!     assert!(charts.is_ok());
//!
//!     handle.shutdown();
//! }
//! ```
//!
//! ## Failure model
//!
//! Nothing in this crate panics into the host or returns errors across
//! the subsystem boundary other than as values: failed loads resolve with
//! a [`LoadError`], failed transports are logged through `tracing` and the
//! batch is dropped.

mod batcher;
mod budget;
mod enhance;
mod error;
mod idle;
mod loader;
mod monitor;
mod output;
mod session;
mod signal;

pub use batcher::{BatcherConfig, MetricsBatcher, TeardownFlush};
pub use budget::{evaluate, score, BudgetReport, Penalty};
pub use enhance::{enhance, EnvironmentContext};
pub use error::{LoadError, TransportError};
pub use idle::{
    HostIdleScheduler, IdleConfig, IdleDeadline, IdleNotifier, IdleScheduler, TimerIdleScheduler,
};
pub use loader::{
    BundleDescriptor, BundleLoader, BundleModule, LoadResult, LoadState, LoaderStatus, Priority,
};
pub use monitor::{
    PerformanceMonitor, LONG_TASK, LONG_TASK_THRESHOLD_MS, SLOW_RESOURCE,
    SLOW_RESOURCE_THRESHOLD_MS,
};
pub use output::{Output, TcpTarget, Transport};
pub use session::{Session, SessionBuilder, SessionConfig, SessionHandle};
pub use signal::{InteractionKind, InteractionSignal, TeardownReason, TeardownSignal};

// Re-export types for convenience
pub use vitals_types::{
    BatchPayload, EnhancedMetric, FlushReason, Observation, PerformanceEntry, Rating, Threshold,
};
