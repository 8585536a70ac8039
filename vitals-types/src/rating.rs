//! Quality ratings and the fixed threshold table they are derived from.

use core::fmt;

/// Largest Contentful Paint, in milliseconds.
pub const LCP: &str = "LCP";
/// First Input Delay, in milliseconds.
pub const FID: &str = "FID";
/// Cumulative Layout Shift, unitless.
pub const CLS: &str = "CLS";
/// First Contentful Paint, in milliseconds.
pub const FCP: &str = "FCP";
/// Time To First Byte, in milliseconds.
pub const TTFB: &str = "TTFB";

/// Coarse classification of a measured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Rating {
    #[default]
    Good,
    NeedsImprovement,
    Poor,
}

impl Rating {
    /// Wire name, matching the serialized form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Rating::Good => "good",
            Rating::NeedsImprovement => "needs-improvement",
            Rating::Poor => "poor",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(good, poor)` boundary pair for one metric.
///
/// Values up to and including `good` rate [`Rating::Good`], values up to and
/// including `poor` rate [`Rating::NeedsImprovement`], anything above is
/// [`Rating::Poor`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Threshold {
    pub good: f64,
    pub poor: f64,
}

/// The authoritative threshold table.
///
/// TTFB uses 800/1800; there is exactly one pair per metric.
pub const THRESHOLDS: &[(&str, Threshold)] = &[
    (LCP, Threshold::new(2500.0, 4000.0)),
    (FID, Threshold::new(100.0, 300.0)),
    (CLS, Threshold::new(0.1, 0.25)),
    (FCP, Threshold::new(1800.0, 3000.0)),
    (TTFB, Threshold::new(800.0, 1800.0)),
];

impl Threshold {
    pub const fn new(good: f64, poor: f64) -> Self {
        Self { good, poor }
    }

    /// Look up the thresholds for a metric name.
    ///
    /// Names are matched exactly; unknown metrics have no thresholds.
    pub fn for_metric(name: &str) -> Option<Threshold> {
        THRESHOLDS
            .iter()
            .find(|(metric, _)| *metric == name)
            .map(|(_, threshold)| *threshold)
    }

    /// Rate a value against these thresholds.
    ///
    /// `NaN` passes neither bound and rates as [`Rating::Poor`]; callers
    /// should drop non-finite values before rating them.
    pub fn rate(&self, value: f64) -> Rating {
        if value <= self.good {
            Rating::Good
        } else if value <= self.poor {
            Rating::NeedsImprovement
        } else {
            Rating::Poor
        }
    }
}

/// Rate a named value, defaulting to [`Rating::Good`] for unknown metrics.
pub fn rate(name: &str, value: f64) -> Rating {
    Threshold::for_metric(name).map_or(Rating::Good, |t| t.rate(value))
}
