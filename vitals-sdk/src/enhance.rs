//! Rating and context enrichment for raw observations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vitals_types::{rate, EnhancedMetric, Observation};

const UNKNOWN: &str = "unknown";

/// Host environment attached to every metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentContext {
    /// Effective network class, e.g. `"4g"` or `"slow-2g"`.
    pub effective_type: Option<String>,
    /// Approximate device memory in gigabytes.
    pub device_memory_gb: Option<f64>,
    /// Page or route the session is running on.
    pub page: Option<String>,
}

impl EnvironmentContext {
    fn tags(&self, timestamp: i64) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        tags.insert("timestamp".to_string(), timestamp.to_string());
        tags.insert(
            "connection".to_string(),
            self.effective_type.clone().unwrap_or_else(|| UNKNOWN.to_string()),
        );
        tags.insert(
            "device_memory".to_string(),
            self.device_memory_gb
                .map(|gb| gb.to_string())
                .unwrap_or_else(|| UNKNOWN.to_string()),
        );
        tags.insert(
            "page".to_string(),
            self.page.clone().unwrap_or_else(|| UNKNOWN.to_string()),
        );
        tags
    }
}

/// Attach a rating and environment context to an observation.
///
/// Never fails: metrics without thresholds rate `Good`.
pub fn enhance(observation: Observation, env: &EnvironmentContext) -> EnhancedMetric {
    let rating = rate(&observation.name, observation.value);
    let context_tags = env.tags(observation.timestamp);
    EnhancedMetric {
        observation,
        rating,
        context_tags,
    }
}
