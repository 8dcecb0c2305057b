//! Markdown dead-letter report

use crate::frontier::DeadLetterEntry;
use crate::output::{OutputResult, RunStatistics};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the dead-letter report to `output_path`
///
/// # Arguments
///
/// * `stats` - Statistics for the overview section
/// * `entries` - Dead letters, in the order they should be listed
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(OutputError)` - Failed to write the report
pub fn write_dead_letter_report(
    stats: &RunStatistics,
    entries: &[DeadLetterEntry],
    output_path: &Path,
) -> OutputResult<()> {
    let markdown = format_dead_letter_report(stats, entries, Utc::now());

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats the dead-letter report as markdown
pub fn format_dead_letter_report(
    stats: &RunStatistics,
    entries: &[DeadLetterEntry],
    generated_at: DateTime<Utc>,
) -> String {
    let mut md = String::new();

    md.push_str("# Sumi-Tide Dead-Letter Report\n\n");
    md.push_str(&format!("- **Generated**: {}\n", generated_at.to_rfc3339()));
    md.push_str(&format!("- **Dead letters**: {}\n", entries.len()));
    md.push_str(&format!("- **Processed URLs**: {}\n", stats.processed));
    md.push_str(&format!(
        "- **Pending work**: {} queued, {} awaiting retry\n\n",
        stats.frontier, stats.retry
    ));

    if entries.is_empty() {
        md.push_str("No dead letters.\n");
        return md;
    }

    md.push_str("## By Reason\n\n");
    md.push_str("| Reason | Count |\n");
    md.push_str("|--------|-------|\n");
    for (reason, count) in &stats.dead_letters_by_reason {
        md.push_str(&format!("| {} | {} |\n", escape_cell(reason), count));
    }
    md.push('\n');

    md.push_str("## Entries\n\n");
    md.push_str("| Failed At | URL | Reason | Stage | Route | Attempts | Task |\n");
    md.push_str("|-----------|-----|--------|-------|-------|----------|------|\n");
    for entry in entries {
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} |\n",
            entry.item.failed_at.format("%Y-%m-%d %H:%M:%S"),
            escape_cell(entry.task.url().as_str()),
            escape_cell(&entry.item.reason),
            entry.item.stage_id,
            entry.item.route_id,
            entry.item.attempts,
            entry.task.id()
        ));
    }

    let with_errors: Vec<_> = entries.iter().filter(|e| e.item.error.is_some()).collect();
    if !with_errors.is_empty() {
        md.push_str("\n## Errors\n\n");
        for entry in with_errors {
            if let Some(error) = &entry.item.error {
                md.push_str(&format!("- `{}`: {}\n", entry.task.url(), error));
            }
        }
    }

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{DeadLetterItem, ProcessingTask, RouteId};
    use std::collections::BTreeMap;
    use url::Url;

    fn entry(path: &str, reason: &str, error: Option<&str>) -> DeadLetterEntry {
        let url = Url::parse(&format!("https://example.com{}", path)).unwrap();
        DeadLetterEntry {
            task: ProcessingTask::seed(url, "test", 0, Utc::now()),
            item: DeadLetterItem {
                failed_at: Utc::now(),
                reason: reason.to_string(),
                stage_id: "fetch".to_string(),
                route_id: RouteId::new("route:crawl"),
                attempts: 5,
                error: error.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_empty_report() {
        let md = format_dead_letter_report(&RunStatistics::default(), &[], Utc::now());
        assert!(md.contains("# Sumi-Tide Dead-Letter Report"));
        assert!(md.contains("No dead letters."));
    }

    #[test]
    fn test_report_lists_entries_and_reasons() {
        let entries = vec![
            entry("/a", "retries exhausted (timeout)", Some("Request timed out")),
            entry("/b|c", "client error 403", None),
        ];
        let stats = RunStatistics {
            dead_letters: 2,
            dead_letters_by_reason: BTreeMap::from([
                ("client error 403".to_string(), 1),
                ("retries exhausted (timeout)".to_string(), 1),
            ]),
            ..Default::default()
        };

        let md = format_dead_letter_report(&stats, &entries, Utc::now());
        assert!(md.contains("| client error 403 | 1 |"));
        assert!(md.contains("https://example.com/a"));
        assert!(md.contains("/b\\|c"));
        assert!(md.contains("| fetch | route:crawl | 5 |"));
        assert!(md.contains("## Errors"));
        assert!(md.contains("Request timed out"));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dead-letters.md");
        write_dead_letter_report(&RunStatistics::default(), &[], &path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("No dead letters."));
    }
}
