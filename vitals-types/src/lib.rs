//! # vitals-types
//!
//! Core types for page performance telemetry. This crate defines the data
//! model shared by the instrumentation SDK and anything that consumes the
//! batches it emits.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable the `serde` feature for JSON payloads
//! - **One threshold table**: Ratings are derived from a single fixed table
//! - **Versioned schema**: Payloads include version info for forward compatibility
//!
//! ## Example
//!
//! ```rust
//! use vitals_types::{Observation, Rating, Threshold};
//!
//! let lcp = Observation::new("LCP", 3100.0, "v1-abc", 1703160000000);
//! let threshold = Threshold::for_metric(&lcp.name).unwrap();
//!
//! assert_eq!(threshold.rate(lcp.value), Rating::NeedsImprovement);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod entry;
mod observation;
mod payload;
mod rating;
mod version;

pub use entry::*;
pub use observation::*;
pub use payload::*;
pub use rating::*;
pub use version::*;

/// Current schema version.
///
/// Increment this when making breaking changes to the payload format.
pub const SCHEMA_VERSION: u32 = 1;

/// Current wall-clock time in milliseconds since the Unix epoch.
#[cfg(feature = "std")]
pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
