//! Markdown summary generation

use crate::output::RunSummary;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown summary of `summary` to `output_path`
///
/// # Arguments
///
/// * `summary` - The run summary
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(std::io::Error)` - Failed to write summary
pub fn generate_markdown_summary(summary: &RunSummary, output_path: &Path) -> std::io::Result<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_summary(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Facet-Harvest Summary: {}\n\n", summary.site));

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {} seconds ({:.2} minutes)\n",
        summary.duration.as_secs(),
        summary.duration.as_secs_f64() / 60.0
    ));
    md.push_str(&format!(
        "- **Status**: {}\n\n",
        if summary.interrupted {
            "interrupted"
        } else {
            "completed"
        }
    ));

    md.push_str("## Totals\n\n");
    md.push_str(&format!("- **Records Written**: {}\n", summary.total_written()));
    md.push_str(&format!(
        "- **Duplicates Skipped**: {}\n",
        summary.total_duplicates()
    ));
    md.push_str(&format!("- **Pruned Calls**: {}\n\n", summary.total_pruned()));

    md.push_str("## Categories\n\n");
    md.push_str(
        "| Category | Outcome | Units | Pages | Written | Resumed | Duplicates | Excluded | Invalid | Pruned |\n",
    );
    md.push_str(
        "|----------|---------|-------|-------|---------|---------|------------|----------|---------|--------|\n",
    );
    for report in &summary.categories {
        let t = &report.tally;
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |\n",
            escape_cell(&report.name),
            report.outcome,
            t.units,
            t.pages,
            t.written,
            t.resumed,
            t.duplicates,
            t.excluded,
            t.invalid,
            t.pruned
        ));
    }
    md.push('\n');

    let partial = summary.partially_processed();
    if !partial.is_empty() {
        md.push_str("## Partially Processed\n\n");
        for name in partial {
            md.push_str(&format!("- {}\n", name));
        }
        md.push('\n');
    }

    md
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}
