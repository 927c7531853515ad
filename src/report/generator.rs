//! Markdown and JSON report generation.
//!
//! This module renders a [`Report`] into a human-readable Markdown document
//! or a machine-readable JSON document.

use crate::analysis::{GroupAggregate, GroupTable, PipelineResult};
use crate::cli::OutputFormat;
use crate::config::ReportConfig;
use crate::models::{AspectId, Report, ReportMetadata, Sentiment};
use anyhow::{Context, Result};
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, options: &ReportConfig) -> String {
    let result = &report.result;
    let mut output = String::new();

    // Title
    output.push_str("# Review Analysis Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents());
    output.push_str(&generate_overview_section(result));
    output.push_str(&generate_rating_section(result));
    output.push_str(&generate_region_section(result, options.top_regions));
    output.push_str(&generate_variant_section(result));
    output.push_str(&generate_aspect_section(result, options.include_samples));
    output.push_str(&generate_insights_section(result));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** {}\n", metadata.source));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!(
        "- **Reviews Collected:** {}\n",
        metadata.reviews_collected
    ));
    section.push_str(&format!(
        "- **Reviews Analyzed:** {}\n",
        metadata.reviews_analyzed
    ));
    if let Some(pages) = metadata.pages_scraped {
        section.push_str(&format!("- **Pages Scraped:** {}\n", pages));
    }
    if let Some(ref termination) = metadata.termination {
        section.push_str(&format!("- **Scrape Ended:** {}\n", termination));
    }
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the table of contents.
fn generate_table_of_contents() -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    for title in [
        "Overview",
        "Rating Distribution",
        "Regional Analysis",
        "Product Variants",
        "Aspect Analysis",
        "Key Insights",
    ] {
        toc.push_str(&format!(
            "- [{}](#{})\n",
            title,
            title.to_lowercase().replace(' ', "-")
        ));
    }
    toc.push('\n');

    toc
}

fn generate_overview_section(result: &PipelineResult) -> String {
    let mut section = String::new();

    section.push_str("## Overview\n\n");
    section.push_str(&format!("- **Total Reviews:** {}\n", result.total_reviews));
    section.push_str(&format!("- **Rated Reviews:** {}\n", result.rated_reviews()));
    section.push_str(&format!(
        "- **Average Rating:** {}\n",
        format_mean(result.mean_rating())
    ));
    section.push_str(&format!("- **Regions:** {}\n", result.regions.len()));
    section.push_str(&format!("- **Product Variants:** {}\n\n", result.variants.len()));

    section
}

fn generate_rating_section(result: &PipelineResult) -> String {
    let mut section = String::new();
    let rated = result.rated_reviews();

    section.push_str("## Rating Distribution\n\n");
    if rated == 0 {
        section.push_str("No rated reviews.\n\n");
        return section;
    }

    section.push_str("| Rating | Reviews | Share |\n");
    section.push_str("|:---|:---:|:---:|\n");
    for (star, count) in result.histogram.iter().rev() {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            "★".repeat(usize::from(*star)),
            count,
            percent(*count, rated)
        ));
    }
    section.push('\n');

    section
}

fn generate_region_section(result: &PipelineResult, top: usize) -> String {
    let mut section = String::new();

    section.push_str("## Regional Analysis\n\n");
    if result.regions.is_empty() {
        section.push_str("No regional data.\n\n");
        return section;
    }

    if result.regions.len() > top {
        section.push_str(&format!(
            "Top {} of {} regions by review count.\n\n",
            top,
            result.regions.len()
        ));
    }
    section.push_str(&group_table(result, "Region", &result.regions, top));

    section
}

fn generate_variant_section(result: &PipelineResult) -> String {
    let mut section = String::new();

    section.push_str("## Product Variants\n\n");
    if result.variants.is_empty() {
        section.push_str("No variant data.\n\n");
        return section;
    }
    section.push_str(&group_table(result, "Variant", &result.variants, usize::MAX));

    section
}

/// Render groups sorted by review count, with their share of all reviews
/// and per-aspect positive rates.
fn group_table(result: &PipelineResult, label: &str, table: &GroupTable, limit: usize) -> String {
    let mut out = String::new();

    out.push_str(&format!("| {} | Reviews | Share | Avg Rating |", label));
    for aspect in AspectId::ALL {
        out.push_str(&format!(" {} 👍 |", aspect.label()));
    }
    out.push('\n');
    out.push_str("|:---|:---:|:---:|:---:|:---:|:---:|:---:|\n");

    for (key, group) in table.by_review_count().into_iter().take(limit) {
        out.push_str(&group_row(key, group, result.share_of_total(group)));
    }
    out.push('\n');

    out
}

fn group_row(key: &str, group: &GroupAggregate, share: f64) -> String {
    let mut row = format!(
        "| {} | {} | {} | {} |",
        key,
        group.review_count,
        format_ratio(Some(share)),
        format_mean(group.mean_rating)
    );
    for aspect in AspectId::ALL {
        row.push_str(&format!(" {} |", format_ratio(Some(group.positive_rate(aspect)))));
    }
    row.push('\n');
    row
}

fn generate_aspect_section(result: &PipelineResult, include_samples: bool) -> String {
    let mut section = String::new();

    section.push_str("## Aspect Analysis\n\n");
    section.push_str("| Aspect | Mention Rate | Positive | Negative | Neutral | Mixed | Satisfaction |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|:---:|:---:|\n");

    for aspect in AspectId::ALL {
        let agg = result.aspects.get(aspect);
        let mut row = format!(
            "| {} | {} ({}/{}) |",
            aspect.label(),
            percent(agg.mentioned, result.total_reviews),
            agg.mentioned,
            result.total_reviews
        );
        for sentiment in Sentiment::ALL {
            row.push_str(&format!(" {} |", format_ratio(agg.share(sentiment))));
        }
        row.push_str(&format!(" {} |\n", format_ratio(agg.satisfaction())));
        section.push_str(&row);
    }
    section.push('\n');

    if include_samples {
        for aspect in AspectId::ALL {
            let samples = result.samples.get(aspect);
            if samples.is_empty() {
                continue;
            }
            section.push_str(&format!("### {}: Sample Comments\n\n", aspect.label()));
            for sample in samples {
                let rating = if sample.rating == 0 {
                    "unrated".to_string()
                } else {
                    format!("{}★", sample.rating)
                };
                section.push_str(&format!(
                    "> {}\n>\n> *{} · {} · {}*\n\n",
                    sample.comment.replace('\n', " "),
                    sample.region,
                    sample.variant,
                    rating
                ));
            }
        }
    }

    section
}

fn generate_insights_section(result: &PipelineResult) -> String {
    let mut section = String::new();

    section.push_str("## Key Insights\n\n");
    for (i, insight) in result.insights.iter().enumerate() {
        section.push_str(&format!("{}. {}\n", i + 1, insight));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by ReviewLens v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

fn percent(part: u64, whole: u64) -> String {
    if whole == 0 {
        return "n/a".to_string();
    }
    format!("{:.1}%", part as f64 * 100.0 / whole as f64)
}

fn format_ratio(ratio: Option<f64>) -> String {
    ratio.map_or_else(|| "n/a".to_string(), |r| format!("{:.1}%", r * 100.0))
}

fn format_mean(mean: Option<f64>) -> String {
    mean.map_or_else(|| "n/a".to_string(), |m| format!("{:.2}", m))
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Render the report in the configured format and write it to `path`.
pub fn write_report(report: &Report, path: &Path, options: &ReportConfig) -> Result<()> {
    let content = match options.format {
        OutputFormat::Json => generate_json_report(report)?,
        OutputFormat::Markdown => generate_markdown_report(report, options),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    Ok(())
}
