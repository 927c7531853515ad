//! Persistence of scraped reviews and per-review analysis rows.
//!
//! Reviews are stored as a pretty-printed JSON array so a scrape can be
//! re-analyzed later with `--input`. Analysis rows are written as CSV with a
//! UTF-8 byte order mark, which spreadsheet tools need to detect the
//! encoding of non-ASCII review text.

use crate::models::{AnalyzedReview, AspectId, ReviewRecord};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

const UTF8_BOM: &str = "\u{feff}";

/// Save reviews as JSON.
pub fn save_reviews(path: &Path, reviews: &[ReviewRecord]) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(reviews).context("Failed to serialize reviews")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write reviews to {}", path.display()))?;
    info!("Saved {} reviews to {}", reviews.len(), path.display());
    Ok(())
}

/// Load reviews saved by [`save_reviews`]. Records without text are dropped.
pub fn load_reviews(path: &Path) -> Result<Vec<ReviewRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read reviews file: {}", path.display()))?;
    let reviews: Vec<ReviewRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse reviews file: {}", path.display()))?;

    let total = reviews.len();
    let reviews: Vec<ReviewRecord> = reviews
        .into_iter()
        .filter(|r| !r.text.trim().is_empty())
        .collect();
    if reviews.len() < total {
        warn!("Skipped {} reviews without text", total - reviews.len());
    }
    Ok(reviews)
}

/// Write one CSV row per analyzed review.
pub fn write_analysis_csv(path: &Path, rows: &[AnalyzedReview]) -> Result<()> {
    ensure_parent(path)?;
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_analysis_rows(&mut writer, rows)
        .and_then(|_| writer.flush())
        .with_context(|| format!("Failed to write analysis rows to {}", path.display()))?;
    info!("Wrote {} analysis rows to {}", rows.len(), path.display());
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

fn header() -> Vec<String> {
    let mut columns: Vec<String> = ["review_text", "region", "variant", "rating"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    for aspect in AspectId::ALL {
        for field in ["mentioned", "sentiment", "comment"] {
            columns.push(format!("{}_{}", aspect.key(), field));
        }
    }
    columns
}

fn row(analyzed: &AnalyzedReview) -> Vec<String> {
    let review = &analyzed.review;
    let mut cells = vec![
        review.text.clone(),
        review.region_key().to_string(),
        review.variant_key().to_string(),
        review.star_rating.to_string(),
    ];
    for verdict in analyzed.verdicts.iter() {
        cells.push(verdict.mentioned.to_string());
        cells.push(verdict.sentiment.to_string());
        cells.push(verdict.comment.clone());
    }
    cells
}

fn write_analysis_rows<W: Write>(mut w: W, rows: &[AnalyzedReview]) -> io::Result<()> {
    w.write_all(UTF8_BOM.as_bytes())?;
    write_row(&mut w, &header())?;
    for analyzed in rows {
        write_row(&mut w, &row(analyzed))?;
    }
    Ok(())
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<W: Write>(w: &mut W, cells: &[String]) -> io::Result<()> {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\r\n")
}
