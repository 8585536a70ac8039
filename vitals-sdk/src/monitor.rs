//! Turns raw performance entries into enhanced metrics.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;
use vitals_types::{now_ms, EnhancedMetric, Observation, PerformanceEntry, CLS, FCP, FID, LCP, TTFB};

use crate::batcher::MetricsBatcher;
use crate::budget::{evaluate, BudgetReport};
use crate::enhance::{enhance, EnvironmentContext};

/// Main-thread tasks longer than this are reported.
pub const LONG_TASK_THRESHOLD_MS: f64 = 50.0;
/// Resources slower than this are reported.
pub const SLOW_RESOURCE_THRESHOLD_MS: f64 = 1000.0;

pub const LONG_TASK: &str = "long-task";
pub const SLOW_RESOURCE: &str = "slow-resource";

const FIRST_CONTENTFUL_PAINT: &str = "first-contentful-paint";

#[derive(Debug, Default)]
struct MonitorState {
    lcp_candidate: Option<f64>,
    lcp_reported: bool,
    fid_reported: bool,
    cls: Option<f64>,
    cls_reported: bool,
    latest: BTreeMap<String, EnhancedMetric>,
}

struct MonitorInner {
    batcher: MetricsBatcher,
    env: EnvironmentContext,
    state: Mutex<MonitorState>,
}

/// A handle for recording performance observations.
///
/// Obtain one from [`Session::monitor`](crate::Session::monitor), or build
/// one directly around a batcher. Cloning is cheap.
///
/// LCP and CLS keep changing while the page is in use, so they are held
/// back and reported once: LCP at the first input or at [`finalize`], CLS
/// at [`finalize`].
///
/// [`finalize`]: PerformanceMonitor::finalize
#[derive(Clone)]
pub struct PerformanceMonitor {
    inner: Arc<MonitorInner>,
}

impl PerformanceMonitor {
    pub fn new(batcher: MetricsBatcher, env: EnvironmentContext) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                batcher,
                env,
                state: Mutex::new(MonitorState::default()),
            }),
        }
    }

    /// Feed one raw entry from an observation source.
    pub fn observe(&self, entry: PerformanceEntry) {
        trace!(entry_type = entry.entry_type(), "performance entry");
        match entry {
            PerformanceEntry::Paint { name, start_time } => {
                if name == FIRST_CONTENTFUL_PAINT {
                    self.record(FCP, start_time);
                }
            }
            PerformanceEntry::LargestContentfulPaint { start_time, .. } => {
                let mut state = self.inner.state.lock();
                if !state.lcp_reported {
                    state.lcp_candidate = Some(start_time);
                }
            }
            PerformanceEntry::FirstInput {
                start_time,
                processing_start,
            } => {
                let first = {
                    let mut state = self.inner.state.lock();
                    !std::mem::replace(&mut state.fid_reported, true)
                };
                if first {
                    self.record(FID, (processing_start - start_time).max(0.0));
                }
                self.finalize_lcp();
            }
            PerformanceEntry::LayoutShift {
                value,
                had_recent_input,
            } => {
                let mut state = self.inner.state.lock();
                if !had_recent_input && !state.cls_reported {
                    *state.cls.get_or_insert(0.0) += value;
                }
            }
            PerformanceEntry::LongTask { duration } => {
                if duration > LONG_TASK_THRESHOLD_MS {
                    self.record(LONG_TASK, duration);
                }
            }
            PerformanceEntry::Resource {
                name,
                duration,
                transfer_size,
            } => {
                if duration > SLOW_RESOURCE_THRESHOLD_MS {
                    let mut tags = BTreeMap::new();
                    tags.insert("resource".to_string(), name);
                    tags.insert("transfer_size".to_string(), transfer_size.to_string());
                    self.record_with_tags(SLOW_RESOURCE, duration, tags);
                }
            }
            PerformanceEntry::Navigation {
                request_start,
                response_start,
            } => {
                self.record(TTFB, (response_start - request_start).max(0.0));
            }
        }
    }

    /// Record a custom observation.
    ///
    /// Non-finite values are dropped and `None` is returned.
    pub fn record(&self, name: &str, value: f64) -> Option<EnhancedMetric> {
        self.record_with_tags(name, value, BTreeMap::new())
    }

    /// Record a custom observation with extra context tags.
    pub fn record_with_tags(
        &self,
        name: &str,
        value: f64,
        tags: BTreeMap<String, String>,
    ) -> Option<EnhancedMetric> {
        if !value.is_finite() {
            debug!(metric = name, value, "dropping non-finite observation");
            return None;
        }

        let observation = Observation::new(
            name,
            value,
            Uuid::new_v4().to_string(),
            now_ms() as i64,
        );
        let mut metric = enhance(observation, &self.inner.env);
        metric.context_tags.extend(tags);

        self.inner
            .state
            .lock()
            .latest
            .insert(name.to_string(), metric.clone());
        self.inner.batcher.add(metric.clone());
        Some(metric)
    }

    /// Report the held-back LCP and CLS values, if any.
    ///
    /// Later calls report nothing new.
    pub fn finalize(&self) {
        self.finalize_lcp();
        let cls = {
            let mut state = self.inner.state.lock();
            if std::mem::replace(&mut state.cls_reported, true) {
                None
            } else {
                state.cls
            }
        };
        if let Some(cls) = cls {
            self.record(CLS, cls);
        }
    }

    /// Report the held-back LCP, if any. Called on the first interaction.
    pub fn finalize_lcp(&self) {
        let lcp = {
            let mut state = self.inner.state.lock();
            if std::mem::replace(&mut state.lcp_reported, true) {
                None
            } else {
                state.lcp_candidate.take()
            }
        };
        if let Some(lcp) = lcp {
            self.record(LCP, lcp);
        }
    }

    /// Latest recorded metric per name, sorted by name.
    pub fn snapshot(&self) -> Vec<EnhancedMetric> {
        self.inner.state.lock().latest.values().cloned().collect()
    }

    /// Score the latest metrics against the performance budget.
    pub fn budget(&self) -> BudgetReport {
        evaluate(&self.snapshot())
    }

    pub fn batcher(&self) -> &MetricsBatcher {
        &self.inner.batcher
    }
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("env", &self.inner.env)
            .finish()
    }
}
