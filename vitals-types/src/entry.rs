//! Raw entries delivered by observation sources.

use alloc::string::String;

/// A raw performance entry as reported by the host runtime.
///
/// Times are milliseconds relative to the start of the navigation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "entry_type", rename_all = "kebab-case")
)]
pub enum PerformanceEntry {
    /// A paint timing, e.g. `first-contentful-paint`.
    Paint { name: String, start_time: f64 },

    /// A candidate for the largest contentful paint. Later candidates supersede earlier ones.
    LargestContentfulPaint { start_time: f64, size: u64 },

    /// The first discrete user input.
    FirstInput {
        start_time: f64,
        processing_start: f64,
    },

    /// An unexpected layout shift.
    LayoutShift { value: f64, had_recent_input: bool },

    /// A task that occupied the main thread.
    LongTask { duration: f64 },

    /// A fetched resource.
    Resource {
        name: String,
        duration: f64,
        #[cfg_attr(feature = "serde", serde(default))]
        transfer_size: u64,
    },

    /// The navigation request itself.
    Navigation {
        request_start: f64,
        response_start: f64,
    },
}

impl PerformanceEntry {
    /// The kind of entry, matching the serialized `entry_type`.
    pub fn entry_type(&self) -> &'static str {
        match self {
            PerformanceEntry::Paint { .. } => "paint",
            PerformanceEntry::LargestContentfulPaint { .. } => "largest-contentful-paint",
            PerformanceEntry::FirstInput { .. } => "first-input",
            PerformanceEntry::LayoutShift { .. } => "layout-shift",
            PerformanceEntry::LongTask { .. } => "long-task",
            PerformanceEntry::Resource { .. } => "resource",
            PerformanceEntry::Navigation { .. } => "navigation",
        }
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_entries() {
        let entry: PerformanceEntry = serde_json::from_str(
            r#"{"entry_type":"layout-shift","value":0.02,"had_recent_input":false}"#,
        )
        .unwrap();
        assert_eq!(
            entry,
            PerformanceEntry::LayoutShift {
                value: 0.02,
                had_recent_input: false
            }
        );
        assert_eq!(entry.entry_type(), "layout-shift");
    }

    #[test]
    fn resource_transfer_size_is_optional() {
        let entry: PerformanceEntry = serde_json::from_str(
            r#"{"entry_type":"resource","name":"/hero.webp","duration":1400.0}"#,
        )
        .unwrap();
        match entry {
            PerformanceEntry::Resource { transfer_size, .. } => assert_eq!(transfer_size, 0),
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn entry_type_matches_serialized_tag() {
        let entry = PerformanceEntry::FirstInput {
            start_time: 10.0,
            processing_start: 30.0,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["entry_type"], entry.entry_type());
    }
}
