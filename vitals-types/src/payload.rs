//! The payload handed to a transport at flush time.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::{EnhancedMetric, SchemaVersion};

/// Why a batch was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FlushReason {
    /// The batch reached its size threshold.
    Size,
    /// The flush interval elapsed.
    Interval,
    /// Flushed explicitly by the host.
    Manual,
    /// Last-chance flush before the process goes away.
    Teardown,
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlushReason::Size => "size",
            FlushReason::Interval => "interval",
            FlushReason::Manual => "manual",
            FlushReason::Teardown => "teardown",
        })
    }
}

/// A flushed batch of metrics, ready for transport.
///
/// Owns its metrics; the batcher never keeps a reference to a payload
/// after handing it off.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchPayload {
    /// Schema version for forward compatibility.
    pub version: SchemaVersion,

    /// Identifies the process session that produced the batch.
    pub session_id: String,

    /// Unix timestamp in milliseconds when the batch was formed.
    pub sent_at_ms: u64,

    pub reason: FlushReason,

    /// Metrics in the order they were added.
    pub metrics: Vec<EnhancedMetric>,
}

impl BatchPayload {
    pub fn new(
        session_id: impl Into<String>,
        sent_at_ms: u64,
        reason: FlushReason,
        metrics: Vec<EnhancedMetric>,
    ) -> Self {
        Self {
            version: SchemaVersion::current(),
            session_id: session_id.into(),
            sent_at_ms,
            reason,
            metrics,
        }
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Observation, Rating};
    use alloc::collections::BTreeMap;

    fn metric(name: &str) -> EnhancedMetric {
        EnhancedMetric {
            observation: Observation::new(name, 1.0, name, 0),
            rating: Rating::Good,
            context_tags: BTreeMap::new(),
        }
    }

    #[test]
    fn payload_keeps_insertion_order() {
        let payload = BatchPayload::new(
            "s-1",
            42,
            FlushReason::Size,
            alloc::vec![metric("a"), metric("b"), metric("c")],
        );
        let names: Vec<&str> = payload.metrics.iter().map(|m| m.name()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(payload.len(), 3);
        assert!(payload.version.is_compatible());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn reason_serializes_snake_case() {
        let payload = BatchPayload::new("s-1", 42, FlushReason::Teardown, Vec::new());
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["reason"], "teardown");
        assert_eq!(json["version"]["major"], crate::SCHEMA_VERSION);
        assert!(payload.is_empty());
    }
}
