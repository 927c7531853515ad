//! Classification and aggregation driver.
//!
//! Reviews are classified with bounded concurrency, but results are consumed
//! in input order and folded by a single writer, so the aggregate does not
//! depend on request timing. Results are folded in batches of
//! [`BATCH_SIZE`] reviews that are merged into the running total in order.

use crate::analysis::{AggregationState, InsightConfig, PipelineResult};
use crate::classifier::AspectClassifier;
use crate::models::{AnalyzedReview, ReviewRecord};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

/// Reviews folded into one batch state before it is merged.
const BATCH_SIZE: usize = 25;

/// Settings for one analysis run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Classify at most this many reviews, from the front; 0 means all.
    pub review_limit: usize,
    pub concurrency: usize,
    pub sample_cap: usize,
    pub insights: InsightConfig,
    pub show_progress: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            review_limit: 100,
            concurrency: 4,
            sample_cap: 3,
            insights: InsightConfig::default(),
            show_progress: false,
        }
    }
}

/// Output of [`analyze_reviews`].
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    /// One row per classified review, in input order.
    pub rows: Vec<AnalyzedReview>,
    pub result: PipelineResult,
}

/// Classify `reviews` and fold them into a finalized result.
pub async fn analyze_reviews(
    reviews: &[ReviewRecord],
    classifier: &AspectClassifier,
    settings: &PipelineSettings,
) -> AnalysisRun {
    let selected = select_reviews(reviews, settings.review_limit);
    info!(
        "Classifying {} of {} reviews with {} (concurrency {})",
        selected.len(),
        reviews.len(),
        classifier.model(),
        settings.concurrency
    );

    let pb = progress_bar(selected.len() as u64, settings.show_progress);
    let mut state = AggregationState::new(settings.sample_cap);
    let mut batch = AggregationState::new(settings.sample_cap);
    let mut rows = Vec::with_capacity(selected.len());

    let mut classified = stream::iter(selected)
        .map(|review| async move { (review, classifier.classify(&review.text).await) })
        .buffered(settings.concurrency.max(1));

    while let Some((review, verdicts)) = classified.next().await {
        batch.apply(review, &verdicts);
        let position = rows.len() + 1;
        if verdicts.any_mentioned() {
            debug!(
                "Review {}: {} aspect(s) mentioned",
                position,
                verdicts.iter().filter(|v| v.mentioned).count()
            );
        } else {
            debug!("Review {}: no aspect mentioned", position);
        }
        rows.push(AnalyzedReview {
            review: review.clone(),
            verdicts,
        });
        pb.inc(1);

        if batch.total_reviews() as usize >= BATCH_SIZE {
            state = state.merge(&batch);
            batch = AggregationState::new(settings.sample_cap);
            debug!(
                "Aggregated {}/{} reviews",
                state.total_reviews(),
                selected.len()
            );
        }
    }
    pb.finish_and_clear();

    let result = state.merge(&batch).finalize(&settings.insights);
    AnalysisRun { rows, result }
}

fn select_reviews(reviews: &[ReviewRecord], limit: usize) -> &[ReviewRecord] {
    if limit == 0 || limit >= reviews.len() {
        reviews
    } else {
        &reviews[..limit]
    }
}

fn progress_bar(len: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} reviews ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}
