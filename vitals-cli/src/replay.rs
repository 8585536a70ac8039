//! Recorded performance entries, one JSON object per line.

use std::path::Path;

use anyhow::{Context, Result};
use vitals_sdk::PerformanceEntry;

/// Parse newline-delimited entries. Blank lines and `#` comments are skipped.
pub fn parse_entries(input: &str) -> Result<Vec<PerformanceEntry>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid entry on line {}", idx + 1))
        })
        .collect()
}

pub async fn read_entries(path: &Path) -> Result<Vec<PerformanceEntry>> {
    let input = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read entries from {}", path.display()))?;
    parse_entries(&input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_entries() {
        let input = r#"
# navigation first
{"entry_type":"navigation","request_start":10.0,"response_start":420.0}
{"entry_type":"paint","name":"first-contentful-paint","start_time":900.0}

{"entry_type":"long-task","duration":120.0}
"#;
        let entries = parse_entries(input).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].entry_type(), "navigation");
        assert_eq!(entries[2].entry_type(), "long-task");
    }

    #[test]
    fn reports_the_failing_line() {
        let input = "{\"entry_type\":\"long-task\",\"duration\":80.0}\nnot json\n";
        let err = parse_entries(input).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entries.ndjson");
        std::fs::write(&path, "{\"entry_type\":\"layout-shift\",\"value\":0.05,\"had_recent_input\":false}\n")
            .unwrap();

        let entries = read_entries(&path).await.unwrap();
        assert_eq!(entries.len(), 1);
    }
}
