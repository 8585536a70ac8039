//! Observations and their enhanced form.

use alloc::collections::BTreeMap;
use alloc::string::String;

use crate::Rating;

/// A single discrete performance measurement.
///
/// Produced by an observation source, consumed once by the enhancer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Observation {
    /// Metric name, e.g. `"LCP"` or `"long-task"`.
    pub name: String,

    /// Measured value. Milliseconds for timings, unitless for `CLS`.
    pub value: f64,

    /// Unique id of this measurement.
    pub id: String,

    /// Unix timestamp in milliseconds when the measurement was taken.
    pub timestamp: i64,
}

impl Observation {
    pub fn new(name: impl Into<String>, value: f64, id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            value,
            id: id.into(),
            timestamp,
        }
    }
}

/// An observation with its rating and environment context attached.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EnhancedMetric {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub observation: Observation,

    pub rating: Rating,

    /// Environment context, e.g. `connection` or `device_memory`.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "BTreeMap::is_empty")
    )]
    pub context_tags: BTreeMap<String, String>,
}

impl EnhancedMetric {
    pub fn name(&self) -> &str {
        &self.observation.name
    }

    pub fn value(&self) -> f64 {
        self.observation.value
    }

    pub fn id(&self) -> &str {
        &self.observation.id
    }

    /// Look up a context tag.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.context_tags.get(key).map(String::as_str)
    }
}
