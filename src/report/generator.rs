//! Markdown report generation.
//!
//! Renders one or more snapshots as a Markdown document for people; the
//! JSON form is what dashboards consume.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{severity_emoji, MetricsSnapshot, Recommendation, SecondaryAggregate};

/// Generate a complete Markdown report.
pub fn generate_markdown_report(snapshots: &[MetricsSnapshot], generated_at: DateTime<Utc>) -> String {
    let mut output = String::new();

    output.push_str("# Tiersnap Report\n\n");
    output.push_str(&generate_metadata_section(snapshots, generated_at));

    if snapshots.len() > 1 {
        output.push_str(&generate_table_of_contents(snapshots));
    }

    for snapshot in snapshots {
        output.push_str(&generate_snapshot_section(snapshot));
    }

    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(snapshots: &[MetricsSnapshot], generated_at: DateTime<Utc>) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Domains:** {}\n", snapshots.len()));
    section.push_str(&format!(
        "- **Records:** {}\n",
        snapshots
            .iter()
            .map(|s| s.summary.total_records)
            .sum::<usize>()
    ));
    section.push('\n');

    section
}

fn generate_table_of_contents(snapshots: &[MetricsSnapshot]) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    for snapshot in snapshots {
        toc.push_str(&format!(
            "- [{}](#{})\n",
            snapshot.domain,
            anchor(&snapshot.domain)
        ));
    }
    toc.push('\n');

    toc
}

fn anchor(name: &str) -> String {
    name.replace(['/', '.', ' ', '_'], "-").to_lowercase()
}

/// Generate the section for one domain.
pub fn generate_snapshot_section(snapshot: &MetricsSnapshot) -> String {
    let mut section = String::new();
    let summary = &snapshot.summary;

    section.push_str(&format!("## {}\n\n", snapshot.domain));
    section.push_str(&format!(
        "*Computed: {} | Records: {} | Classified: {} | Unclassifiable: {}*\n\n",
        snapshot.computed_at.format("%Y-%m-%d %H:%M:%S UTC"),
        summary.total_records,
        summary.classified_records,
        snapshot.unclassifiable_count
    ));

    // Tiers
    section.push_str("### Tiers\n\n");
    section.push_str("| | Tier | Count | % | Sum | Entities |\n");
    section.push_str("|:---:|:---|:---:|:---:|---:|:---:|\n");
    let tier_count = snapshot.aggregates.len();
    for agg in &snapshot.aggregates {
        section.push_str(&format!(
            "| {} | {} | {} | {:.1} | {:.2} | {} |\n",
            severity_emoji(agg.severity_rank, tier_count),
            agg.tier_label,
            agg.count,
            agg.percentage_of_total,
            agg.sum,
            agg.distinct_entity_count
        ));
    }
    section.push('\n');

    // Summary
    section.push_str("### Summary\n\n");
    section.push_str(&format!(
        "- **Flagged:** {} ({:.1}%)\n",
        summary.flagged_count,
        summary.flagged_percentage()
    ));
    section.push_str(&format!("- **Flagged value:** {:.2}\n", summary.flagged_sum));
    section.push_str(&format!("- **Total value:** {:.2}\n", summary.total_sum));
    section.push_str(&format!(
        "- **Estimated savings:** {:.2}\n",
        snapshot.estimated_savings
    ));
    for (reason, count) in &summary.unclassifiable_by_reason {
        section.push_str(&format!("- **Unclassifiable ({}):** {}\n", reason, count));
    }
    section.push('\n');

    section.push_str(&generate_breakdown_section(&snapshot.top_breakdown));
    section.push_str(&generate_recommendations_section(&snapshot.recommendations));

    section
}

fn generate_breakdown_section(breakdown: &[SecondaryAggregate]) -> String {
    if breakdown.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("### Top Breakdown\n\n");
    section.push_str("| Key | Count | % of flagged | Sum | Entities |\n");
    section.push_str("|:---|:---:|:---:|---:|:---:|\n");
    for group in breakdown {
        section.push_str(&format!(
            "| {} | {} | {:.1} | {:.2} | {} |\n",
            group.key, group.count, group.percentage_of_flagged, group.sum, group.distinct_entity_count
        ));
    }
    section.push('\n');

    section
}

fn generate_recommendations_section(recommendations: &[Recommendation]) -> String {
    let mut section = String::new();

    section.push_str("### Recommendations\n\n");
    for (i, rec) in recommendations.iter().enumerate() {
        section.push_str(&format!(
            "{}. **[P{}] {}** {}\n",
            i + 1,
            rec.priority,
            rec.rec_type,
            rec.message
        ));
        if !rec.action.is_empty() {
            section.push_str(&format!("   > 💡 {}", rec.action));
            if rec.estimated_impact > 0.0 {
                section.push_str(&format!(" (impact: {:.2})", rec.estimated_impact));
            }
            section.push('\n');
        }
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by Tiersnap*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}
