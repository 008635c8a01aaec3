//! Report generation.
//!
//! JSON output is the dashboard wire object (`elastic`, `defender`,
//! `opencti`, `tenable`, `rss`). Markdown output renders a human-readable
//! snapshot of the same cycle.

use crate::aggregation::stats::{recurring_titles, summary_by_provider, top_alerts};
use crate::models::{
    AggregationResult, AlertItem, ProviderCategory, ReportMetadata, Severity, SeveritySummary,
};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Number of alerts listed in the "Top Alerts" table.
const TOP_ALERTS: usize = 5;

/// Generate the JSON wire object.
pub fn generate_json_report(result: &AggregationResult) -> Result<String> {
    serde_json::to_string_pretty(result).map_err(Into::into)
}

/// Generate a complete Markdown dashboard snapshot.
pub fn generate_markdown_report(result: &AggregationResult, metadata: &ReportMetadata) -> String {
    let mut output = String::new();

    output.push_str("# SocFeed Dashboard\n\n");
    output.push_str(&generate_metadata_section(result, metadata));
    output.push_str(&generate_table_of_contents(result));
    output.push_str(&generate_summary_section(result));
    output.push_str(&generate_alerts_section(result));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(result: &AggregationResult, metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    let reporting = result.iter().filter(|(_, items)| !items.is_empty()).count();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Limit per Provider:** {}\n",
        metadata.limit_per_provider
    ));
    section.push_str(&format!(
        "- **Providers Reporting:** {} of {}\n",
        reporting,
        ProviderCategory::ALL.len()
    ));
    section.push_str(&format!("- **Total Alerts:** {}\n", result.total()));
    section.push_str(&format!(
        "- **Cycle Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the table of contents.
fn generate_table_of_contents(result: &AggregationResult) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Summary](#summary)\n");
    toc.push_str("- [Alerts by Provider](#alerts-by-provider)\n");

    for (category, items) in result.iter() {
        if !items.is_empty() {
            toc.push_str(&format!(
                "  - [{}](#{})\n",
                category.source(),
                category.key()
            ));
        }
    }

    toc.push('\n');

    toc
}

/// Generate the summary section.
fn generate_summary_section(result: &AggregationResult) -> String {
    let mut section = String::new();
    let summary = SeveritySummary::from_items(result.iter().flat_map(|(_, items)| items));

    section.push_str("## Summary\n\n");

    section.push_str("### Severity Breakdown\n\n");
    section.push_str(&severity_table_header("Scope"));
    section.push_str(&severity_table_row("All providers", &summary));
    section.push('\n');

    section.push_str("### By Provider\n\n");
    section.push_str(&severity_table_header("Provider"));
    for (category, provider_summary) in summary_by_provider(result) {
        section.push_str(&severity_table_row(
            &category.source().to_string(),
            &provider_summary,
        ));
    }
    section.push('\n');

    let top = top_alerts(result, TOP_ALERTS);
    if !top.is_empty() {
        section.push_str("### Top Alerts\n\n");
        section.push_str("| Severity | Source | Title |\n");
        section.push_str("|:---|:---|:---|\n");

        for alert in top {
            section.push_str(&format!(
                "| {} | {} | {} |\n",
                severity_badge(alert.severity),
                alert.source,
                escape_cell(&alert.title)
            ));
        }
        section.push('\n');
    }

    let recurring = recurring_titles(result);
    if !recurring.is_empty() {
        section.push_str("### Recurring Titles\n\n");
        section.push_str("| Title | Count |\n");
        section.push_str("|:---|:---:|\n");

        for (title, count) in recurring {
            section.push_str(&format!("| {} | {} |\n", escape_cell(&title), count));
        }
        section.push('\n');
    }

    section
}

fn severity_table_header(label: &str) -> String {
    let mut header = format!("| {} |", label);
    for severity in Severity::ALL {
        header.push_str(&format!(" {} {} |", severity.emoji(), severity));
    }
    header.push_str(" **Total** |\n|:---|");
    header.push_str(&":---:|".repeat(Severity::ALL.len() + 1));
    header.push('\n');
    header
}

fn severity_table_row(label: &str, summary: &SeveritySummary) -> String {
    let mut row = format!("| {} |", label);
    for severity in Severity::ALL {
        row.push_str(&format!(" {} |", summary.count(severity)));
    }
    row.push_str(&format!(" **{}** |\n", summary.total));
    row
}

/// Generate the per-provider alert listing.
fn generate_alerts_section(result: &AggregationResult) -> String {
    let mut section = String::new();

    section.push_str("## Alerts by Provider\n\n");

    if result.total() == 0 {
        section.push_str("No alerts were reported in this cycle. All quiet. 🎉\n\n");
        return section;
    }

    for (category, items) in result.iter() {
        if items.is_empty() {
            continue;
        }

        section.push_str(&format!("### {}\n\n", category.source()));
        section.push_str(&format!("*Alerts: {}*\n\n", items.len()));

        for alert in items {
            section.push_str(&generate_alert_block(alert));
        }
    }

    section
}

/// Severity label with emoji, as shown on the dashboard.
fn severity_badge(severity: Severity) -> String {
    format!(
        "{} **{}**",
        severity.emoji(),
        severity.to_string().to_uppercase()
    )
}

/// Generate a single alert block.
fn generate_alert_block(alert: &AlertItem) -> String {
    let mut block = String::new();

    block.push_str(&format!(
        "#### {} {}\n\n",
        severity_badge(alert.severity),
        alert.title
    ));

    block.push_str(&format!(
        "**ID:** `{}` | **Time:** {}\n\n",
        alert.id,
        alert.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    if let Some(ref description) = alert.description {
        if !description.is_empty() {
            block.push_str(&format!("**Details:** {}\n\n", description));
        }
    }

    if let Some(ref link) = alert.link {
        block.push_str(&format!("> 🔗 [Read more]({})\n\n", link));
    }

    block.push_str("---\n\n");

    block
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Snapshot generated by SocFeed v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Write rendered output to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    Ok(())
}
