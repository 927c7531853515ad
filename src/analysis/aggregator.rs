//! Review aggregation and statistics.
//!
//! Classified reviews are folded one at a time into an [`AggregationState`].
//! Every counter is a plain sum, so two states built from disjoint slices of
//! the same review set can be merged field by field and give the same totals
//! as a single pass over the whole set.

use crate::analysis::insights::{synthesize, Insight, InsightConfig};
use crate::models::{AspectId, ReviewRecord, Sentiment, VerdictSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One value per aspect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerAspect<T> {
    pub feature: T,
    pub audio: T,
    pub appearance: T,
}

impl<T> PerAspect<T> {
    pub fn get(&self, aspect: AspectId) -> &T {
        match aspect {
            AspectId::Feature => &self.feature,
            AspectId::Audio => &self.audio,
            AspectId::Appearance => &self.appearance,
        }
    }

    pub fn get_mut(&mut self, aspect: AspectId) -> &mut T {
        match aspect {
            AspectId::Feature => &mut self.feature,
            AspectId::Audio => &mut self.audio,
            AspectId::Appearance => &mut self.appearance,
        }
    }
}

/// Mention and sentiment counts for one aspect.
///
/// The four sentiment counters always sum to `mentioned`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectAggregate {
    pub mentioned: u64,
    pub positive: u64,
    pub negative: u64,
    pub neutral: u64,
    pub mixed: u64,
}

impl AspectAggregate {
    /// Count one mention with the given sentiment.
    pub fn record(&mut self, sentiment: Sentiment) {
        self.mentioned += 1;
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Negative => self.negative += 1,
            Sentiment::Neutral => self.neutral += 1,
            Sentiment::Mixed => self.mixed += 1,
        }
    }

    pub fn count(&self, sentiment: Sentiment) -> u64 {
        match sentiment {
            Sentiment::Positive => self.positive,
            Sentiment::Negative => self.negative,
            Sentiment::Neutral => self.neutral,
            Sentiment::Mixed => self.mixed,
        }
    }

    pub fn merge(&mut self, other: &AspectAggregate) {
        self.mentioned += other.mentioned;
        self.positive += other.positive;
        self.negative += other.negative;
        self.neutral += other.neutral;
        self.mixed += other.mixed;
    }

    /// Fraction of mentions carrying `sentiment`, `None` without mentions.
    pub fn share(&self, sentiment: Sentiment) -> Option<f64> {
        if self.mentioned == 0 {
            return None;
        }
        Some(self.count(sentiment) as f64 / self.mentioned as f64)
    }

    /// `(positive + 0.5 * mixed) / mentioned`, `None` without mentions.
    pub fn satisfaction(&self) -> Option<f64> {
        if self.mentioned == 0 {
            return None;
        }
        Some((self.positive as f64 + 0.5 * self.mixed as f64) / self.mentioned as f64)
    }
}

/// Statistics bucket for one region or one product variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupAggregate {
    /// Reviews seen for this key, rated or not.
    pub review_count: u64,
    /// Reviews with a known 1-5 rating.
    pub rated_count: u64,
    /// Sum of known ratings.
    pub rating_sum: u64,
    /// Positive mentions per aspect.
    pub positive: PerAspect<u64>,
    /// Mean of known ratings. Only set by finalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_rating: Option<f64>,
}

impl GroupAggregate {
    fn record(&mut self, review: &ReviewRecord, verdicts: &VerdictSet) {
        self.review_count += 1;
        if let Some(rating) = review.rating() {
            self.rated_count += 1;
            self.rating_sum += u64::from(rating);
        }
        for verdict in verdicts.iter() {
            if verdict.mentioned && verdict.sentiment == Sentiment::Positive {
                *self.positive.get_mut(verdict.aspect) += 1;
            }
        }
        self.mean_rating = None;
    }

    fn merge(&mut self, other: &GroupAggregate) {
        self.review_count += other.review_count;
        self.rated_count += other.rated_count;
        self.rating_sum += other.rating_sum;
        for aspect in AspectId::ALL {
            *self.positive.get_mut(aspect) += other.positive.get(aspect);
        }
        self.mean_rating = None;
    }

    fn finalize(&mut self) {
        self.mean_rating =
            (self.rated_count > 0).then(|| self.rating_sum as f64 / self.rated_count as f64);
    }

    /// Positive mentions of `aspect` per review in this group.
    pub fn positive_rate(&self, aspect: AspectId) -> f64 {
        if self.review_count == 0 {
            return 0.0;
        }
        *self.positive.get(aspect) as f64 / self.review_count as f64
    }
}

/// A keyed group in a [`GroupTable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub key: String,
    #[serde(flatten)]
    pub stats: GroupAggregate,
}

/// Groups keyed by region or variant, kept in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<GroupEntry>", into = "Vec<GroupEntry>")]
pub struct GroupTable {
    entries: Vec<GroupEntry>,
    index: HashMap<String, usize>,
}

impl GroupTable {
    /// The group for `key`, created empty on first sight.
    fn entry_mut(&mut self, key: &str) -> &mut GroupAggregate {
        let idx = match self.index.get(key) {
            Some(&idx) => idx,
            None => {
                self.entries.push(GroupEntry {
                    key: key.to_string(),
                    stats: GroupAggregate::default(),
                });
                let idx = self.entries.len() - 1;
                self.index.insert(key.to_string(), idx);
                idx
            }
        };
        &mut self.entries[idx].stats
    }

    pub fn get(&self, key: &str) -> Option<&GroupAggregate> {
        self.index.get(key).map(|&idx| &self.entries[idx].stats)
    }

    /// Groups in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &GroupAggregate)> {
        self.entries.iter().map(|e| (e.key.as_str(), &e.stats))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Groups sorted by review count, largest first. Ties keep insertion order.
    pub fn by_review_count(&self) -> Vec<(&str, &GroupAggregate)> {
        let mut groups: Vec<_> = self.iter().collect();
        groups.sort_by_key(|(_, g)| std::cmp::Reverse(g.review_count));
        groups
    }

    fn merge(&mut self, other: &GroupTable) {
        for (key, stats) in other.iter() {
            self.entry_mut(key).merge(stats);
        }
    }

    fn finalize(&mut self) {
        for entry in &mut self.entries {
            entry.stats.finalize();
        }
    }
}

impl From<Vec<GroupEntry>> for GroupTable {
    fn from(entries: Vec<GroupEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.key.clone(), idx))
            .collect();
        Self { entries, index }
    }
}

impl From<GroupTable> for Vec<GroupEntry> {
    fn from(table: GroupTable) -> Self {
        table.entries
    }
}

/// A representative comment kept for the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleComment {
    pub comment: String,
    pub region: String,
    pub variant: String,
    pub rating: u8,
}

/// Running statistics over the classified review stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationState {
    total_reviews: u64,
    aspects: PerAspect<AspectAggregate>,
    regions: GroupTable,
    variants: GroupTable,
    histogram: BTreeMap<u8, u64>,
    samples: PerAspect<Vec<SampleComment>>,
    sample_cap: usize,
}

impl AggregationState {
    /// Empty state keeping at most `sample_cap` comments per aspect.
    pub fn new(sample_cap: usize) -> Self {
        Self {
            total_reviews: 0,
            aspects: PerAspect::default(),
            regions: GroupTable::default(),
            variants: GroupTable::default(),
            histogram: (1..=5).map(|star| (star, 0)).collect(),
            samples: PerAspect::default(),
            sample_cap,
        }
    }

    pub fn total_reviews(&self) -> u64 {
        self.total_reviews
    }

    /// Fold one classified review into the state.
    pub fn update(mut self, review: &ReviewRecord, verdicts: &VerdictSet) -> Self {
        self.apply(review, verdicts);
        self
    }

    /// In-place form of [`AggregationState::update`].
    pub fn apply(&mut self, review: &ReviewRecord, verdicts: &VerdictSet) {
        self.total_reviews += 1;

        if let Some(rating) = review.rating() {
            *self.histogram.entry(rating).or_default() += 1;
        }

        let region = review.region_key();
        let variant = review.variant_key();
        self.regions.entry_mut(region).record(review, verdicts);
        self.variants.entry_mut(variant).record(review, verdicts);

        for verdict in verdicts.iter().filter(|v| v.mentioned) {
            self.aspects.get_mut(verdict.aspect).record(verdict.sentiment);

            let samples = self.samples.get_mut(verdict.aspect);
            if !verdict.comment.is_empty() && samples.len() < self.sample_cap {
                samples.push(SampleComment {
                    comment: verdict.comment.clone(),
                    region: region.to_string(),
                    variant: variant.to_string(),
                    rating: review.star_rating,
                });
            }
        }
    }

    /// Field-wise sum of two states. Samples keep `self`'s first.
    pub fn merge(mut self, other: &AggregationState) -> Self {
        self.total_reviews += other.total_reviews;
        for aspect in AspectId::ALL {
            self.aspects.get_mut(aspect).merge(other.aspects.get(aspect));

            let cap = self.sample_cap;
            let samples = self.samples.get_mut(aspect);
            let room = cap.saturating_sub(samples.len());
            samples.extend(other.samples.get(aspect).iter().take(room).cloned());
        }
        self.regions.merge(&other.regions);
        self.variants.merge(&other.variants);
        for (star, count) in &other.histogram {
            *self.histogram.entry(*star).or_default() += count;
        }
        self
    }

    /// Compute group means and derive insights.
    pub fn finalize(mut self, config: &InsightConfig) -> PipelineResult {
        self.regions.finalize();
        self.variants.finalize();

        let mut result = PipelineResult {
            total_reviews: self.total_reviews,
            aspects: self.aspects,
            regions: self.regions,
            variants: self.variants,
            histogram: self.histogram,
            samples: self.samples,
            insights: Vec::new(),
        };
        result.insights = synthesize(&result, config);
        result
    }
}

/// Final, immutable snapshot of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub total_reviews: u64,
    pub aspects: PerAspect<AspectAggregate>,
    pub regions: GroupTable,
    pub variants: GroupTable,
    /// Star rating → review count, for ratings 1-5 only.
    pub histogram: BTreeMap<u8, u64>,
    pub samples: PerAspect<Vec<SampleComment>>,
    pub insights: Vec<Insight>,
}

impl PipelineResult {
    /// Number of reviews with a known rating.
    pub fn rated_reviews(&self) -> u64 {
        self.histogram.values().sum()
    }

    /// Mean of all known ratings.
    pub fn mean_rating(&self) -> Option<f64> {
        let rated = self.rated_reviews();
        if rated == 0 {
            return None;
        }
        let sum: u64 = self
            .histogram
            .iter()
            .map(|(star, count)| u64::from(*star) * count)
            .sum();
        Some(sum as f64 / rated as f64)
    }

    /// Fraction of all reviews that mention `aspect`.
    pub fn mention_rate(&self, aspect: AspectId) -> f64 {
        if self.total_reviews == 0 {
            return 0.0;
        }
        self.aspects.get(aspect).mentioned as f64 / self.total_reviews as f64
    }

    /// Fraction of all reviews falling in `group`.
    pub fn share_of_total(&self, group: &GroupAggregate) -> f64 {
        if self.total_reviews == 0 {
            return 0.0;
        }
        group.review_count as f64 / self.total_reviews as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AspectVerdict;

    fn review(region: &str, variant: &str, rating: u8) -> ReviewRecord {
        ReviewRecord {
            region: Some(region.to_string()),
            product_variant: Some(variant.to_string()),
            star_rating: rating,
            ..ReviewRecord::new("some review")
        }
    }

    fn verdicts(aspect: AspectId, sentiment: Sentiment, comment: &str) -> VerdictSet {
        let mut set = VerdictSet::unmentioned();
        let verdict = AspectVerdict::new(aspect, true, sentiment, comment);
        match aspect {
            AspectId::Feature => set.feature = verdict,
            AspectId::Audio => set.audio = verdict,
            AspectId::Appearance => set.appearance = verdict,
        }
        set
    }

    fn fold(items: &[(ReviewRecord, VerdictSet)]) -> AggregationState {
        items
            .iter()
            .fold(AggregationState::new(3), |state, (r, v)| state.update(r, v))
    }

    fn scenario() -> Vec<(ReviewRecord, VerdictSet)> {
        vec![
            (
                review("A", "Blue", 5),
                verdicts(AspectId::Feature, Sentiment::Positive, "smart"),
            ),
            (
                review("A", "Blue", 3),
                verdicts(AspectId::Feature, Sentiment::Negative, "dumb"),
            ),
            (review("B", "Pink", 4), VerdictSet::unmentioned()),
        ]
    }

    #[test]
    fn test_three_review_scenario() {
        let result = fold(&scenario()).finalize(&InsightConfig::default());

        assert_eq!(result.total_reviews, 3);

        let a = result.regions.get("A").unwrap();
        assert_eq!(a.review_count, 2);
        assert_eq!(a.mean_rating, Some(4.0));
        assert_eq!(a.positive.feature, 1);

        let b = result.regions.get("B").unwrap();
        assert_eq!(b.review_count, 1);
        assert_eq!(b.mean_rating, Some(4.0));
        assert_eq!(b.positive.feature, 0);

        let feature = result.aspects.feature;
        assert_eq!(feature.mentioned, 2);
        assert_eq!(feature.positive, 1);
        assert_eq!(feature.negative, 1);
        assert_eq!(feature.satisfaction(), Some(0.5));
        assert_eq!(result.aspects.audio.mentioned, 0);
        assert_eq!(result.aspects.audio.satisfaction(), None);
    }

    #[test]
    fn test_total_matches_number_of_reviews() {
        let items: Vec<_> = (0..17)
            .map(|i| (review("R", "V", (i % 6) as u8), VerdictSet::unmentioned()))
            .collect();
        let state = fold(&items);
        assert_eq!(state.total_reviews(), 17);
    }

    #[test]
    fn test_unknown_rating_excluded_from_histogram_and_mean() {
        let items = vec![
            (review("A", "V", 0), VerdictSet::unmentioned()),
            (review("A", "V", 2), VerdictSet::unmentioned()),
        ];
        let result = fold(&items).finalize(&InsightConfig::default());

        let a = result.regions.get("A").unwrap();
        assert_eq!(a.review_count, 2);
        assert_eq!(a.rated_count, 1);
        assert_eq!(a.mean_rating, Some(2.0));
        assert!(!result.histogram.contains_key(&0));
        assert_eq!(result.rated_reviews(), 1);
        assert_eq!(result.histogram[&5], 0);
    }

    #[test]
    fn test_group_without_ratings_has_no_mean() {
        let items = vec![(review("A", "V", 0), VerdictSet::unmentioned())];
        let result = fold(&items).finalize(&InsightConfig::default());
        assert_eq!(result.regions.get("A").unwrap().mean_rating, None);
        assert_eq!(result.mean_rating(), None);
    }

    #[test]
    fn test_missing_region_uses_sentinel() {
        let items = vec![(ReviewRecord::new("no meta"), VerdictSet::unmentioned())];
        let result = fold(&items).finalize(&InsightConfig::default());
        assert!(result.regions.get("unknown").is_some());
        assert!(result.variants.get("standard").is_some());
    }

    #[test]
    fn test_keys_are_not_normalized() {
        let items = vec![
            (review("Beijing", "V", 5), VerdictSet::unmentioned()),
            (review("beijing", "V", 5), VerdictSet::unmentioned()),
        ];
        let state = fold(&items);
        assert_eq!(state.regions.len(), 2);
    }

    #[test]
    fn test_samples_are_capped_in_insertion_order() {
        let items: Vec<_> = (1..=5)
            .map(|i| {
                (
                    review("A", "V", 5),
                    verdicts(AspectId::Audio, Sentiment::Positive, &format!("loud {}", i)),
                )
            })
            .collect();
        let state = fold(&items);
        let comments: Vec<_> = state
            .samples
            .audio
            .iter()
            .map(|s| s.comment.as_str())
            .collect();
        assert_eq!(comments, vec!["loud 1", "loud 2", "loud 3"]);
    }

    #[test]
    fn test_empty_comments_are_not_sampled() {
        let items = vec![(
            review("A", "V", 5),
            verdicts(AspectId::Audio, Sentiment::Positive, ""),
        )];
        let state = fold(&items);
        assert!(state.samples.audio.is_empty());
        assert_eq!(state.aspects.audio.mentioned, 1);
    }

    #[test]
    fn test_merge_of_partitions_matches_single_pass() {
        let mut items = scenario();
        items.push((
            review("C", "Blue", 1),
            verdicts(AspectId::Appearance, Sentiment::Mixed, "ok-ish"),
        ));
        items.push((
            review("A", "Pink", 0),
            verdicts(AspectId::Audio, Sentiment::Neutral, "fine"),
        ));

        let whole = fold(&items).finalize(&InsightConfig::default());

        let (left, right) = items.split_at(2);
        let merged = fold(left)
            .merge(&fold(right))
            .finalize(&InsightConfig::default());
        assert_eq!(merged, whole);

        // Commutative for every counter; only group order and samples differ.
        let swapped = fold(right)
            .merge(&fold(left))
            .finalize(&InsightConfig::default());
        assert_eq!(swapped.total_reviews, whole.total_reviews);
        assert_eq!(swapped.aspects, whole.aspects);
        assert_eq!(swapped.histogram, whole.histogram);
        for (key, stats) in whole.regions.iter() {
            assert_eq!(swapped.regions.get(key), Some(stats));
        }
        for (key, stats) in whole.variants.iter() {
            assert_eq!(swapped.variants.get(key), Some(stats));
        }
    }

    #[test]
    fn test_group_table_serde_keeps_order_and_index() {
        let state = fold(&scenario());
        let json = serde_json::to_string(&state.regions).unwrap();
        let table: GroupTable = serde_json::from_str(&json).unwrap();
        let keys: Vec<_> = table.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(table.get("B").map(|g| g.review_count), Some(1));
    }

    #[test]
    fn test_by_review_count() {
        let items = vec![
            (review("small", "V", 5), VerdictSet::unmentioned()),
            (review("big", "V", 5), VerdictSet::unmentioned()),
            (review("big", "V", 5), VerdictSet::unmentioned()),
        ];
        let state = fold(&items);
        let order: Vec<_> = state
            .regions
            .by_review_count()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(order, vec!["big", "small"]);
    }

    #[test]
    fn test_aspect_share() {
        let mut agg = AspectAggregate::default();
        assert_eq!(agg.share(Sentiment::Positive), None);
        agg.record(Sentiment::Positive);
        agg.record(Sentiment::Mixed);
        assert_eq!(agg.share(Sentiment::Positive), Some(0.5));
        assert_eq!(agg.satisfaction(), Some(0.75));
    }
}
