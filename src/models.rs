//! Data models for the review pipeline.
//!
//! This module contains the records produced by the scraper, the per-aspect
//! verdicts produced by the classifier, and the report envelope that the
//! renderers consume.

use crate::analysis::PipelineResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Grouping key used when a review carries no region.
pub const UNKNOWN_REGION: &str = "unknown";

/// Grouping key used when a review carries no product variant.
pub const STANDARD_VARIANT: &str = "standard";

/// One of the fixed product dimensions a review is classified along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectId {
    /// Smart/AI functions of the product
    Feature,
    /// Sound quality and audio effects
    Audio,
    /// Packaging, industrial design and looks
    Appearance,
}

impl AspectId {
    /// All aspects in report order.
    pub const ALL: [AspectId; 3] = [AspectId::Feature, AspectId::Audio, AspectId::Appearance];

    /// Stable machine key, used in JSON and CSV column names.
    pub fn key(&self) -> &'static str {
        match self {
            AspectId::Feature => "feature",
            AspectId::Audio => "audio",
            AspectId::Appearance => "appearance",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            AspectId::Feature => "Smart features",
            AspectId::Audio => "Audio quality",
            AspectId::Appearance => "Appearance",
        }
    }
}

impl fmt::Display for AspectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Sentiment label attached to a mentioned aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
    /// Both praise and criticism in the same review
    Mixed,
}

impl Sentiment {
    /// All sentiment values in report order.
    pub const ALL: [Sentiment; 4] = [
        Sentiment::Positive,
        Sentiment::Negative,
        Sentiment::Neutral,
        Sentiment::Mixed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
            Sentiment::Mixed => "mixed",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            "mixed" => Ok(Sentiment::Mixed),
            other => Err(format!("unknown sentiment label: {:?}", other)),
        }
    }
}

/// A single review observed on the product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    /// Opaque reviewer identifier (the `data-guid` attribute on the site).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,
    /// Membership tier shown next to the reviewer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_tier: Option<String>,
    /// Review body. Never empty for records produced by the extractor.
    pub text: String,
    /// Star rating 1-5, or 0 when the marker could not be parsed.
    #[serde(default)]
    pub star_rating: u8,
    /// Product variant the reviewer bought.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_variant: Option<String>,
    /// Region the order was shipped to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Purchase time as displayed by the site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_time: Option<String>,
    /// Attached image URLs in page order.
    #[serde(default)]
    pub image_urls: Vec<String>,
}

impl ReviewRecord {
    /// Creates a record with only the review text set.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            reviewer_id: None,
            user_tier: None,
            text: text.into(),
            star_rating: 0,
            product_variant: None,
            region: None,
            purchase_time: None,
            image_urls: Vec::new(),
        }
    }

    /// Region grouping key, falling back to [`UNKNOWN_REGION`].
    pub fn region_key(&self) -> &str {
        non_blank(self.region.as_deref()).unwrap_or(UNKNOWN_REGION)
    }

    /// Variant grouping key, falling back to [`STANDARD_VARIANT`].
    pub fn variant_key(&self) -> &str {
        non_blank(self.product_variant.as_deref()).unwrap_or(STANDARD_VARIANT)
    }

    /// The star rating when it is a known value in 1-5.
    pub fn rating(&self) -> Option<u8> {
        (1..=5).contains(&self.star_rating).then_some(self.star_rating)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// The classifier's judgment for one aspect of one review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AspectVerdict {
    pub aspect: AspectId,
    pub mentioned: bool,
    pub sentiment: Sentiment,
    /// Short quote or paraphrase supporting the verdict.
    pub comment: String,
}

impl AspectVerdict {
    /// Verdict for an aspect the review does not talk about.
    pub fn unmentioned(aspect: AspectId) -> Self {
        Self {
            aspect,
            mentioned: false,
            sentiment: Sentiment::Neutral,
            comment: String::new(),
        }
    }

    /// Builds a verdict, enforcing that unmentioned aspects carry no
    /// sentiment and no comment.
    pub fn new(aspect: AspectId, mentioned: bool, sentiment: Sentiment, comment: &str) -> Self {
        if !mentioned {
            return Self::unmentioned(aspect);
        }
        Self {
            aspect,
            mentioned,
            sentiment,
            comment: comment.trim().to_string(),
        }
    }
}

/// The fixed triple of verdicts for one review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictSet {
    pub feature: AspectVerdict,
    pub audio: AspectVerdict,
    pub appearance: AspectVerdict,
}

impl VerdictSet {
    /// All three aspects unmentioned.
    pub fn unmentioned() -> Self {
        Self {
            feature: AspectVerdict::unmentioned(AspectId::Feature),
            audio: AspectVerdict::unmentioned(AspectId::Audio),
            appearance: AspectVerdict::unmentioned(AspectId::Appearance),
        }
    }

    pub fn get(&self, aspect: AspectId) -> &AspectVerdict {
        match aspect {
            AspectId::Feature => &self.feature,
            AspectId::Audio => &self.audio,
            AspectId::Appearance => &self.appearance,
        }
    }

    /// Verdicts in report order.
    pub fn iter(&self) -> impl Iterator<Item = &AspectVerdict> {
        [&self.feature, &self.audio, &self.appearance].into_iter()
    }

    pub fn any_mentioned(&self) -> bool {
        self.iter().any(|v| v.mentioned)
    }
}

impl Default for VerdictSet {
    fn default() -> Self {
        Self::unmentioned()
    }
}

/// A review together with its classification, one export row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedReview {
    pub review: ReviewRecord,
    pub verdicts: VerdictSet,
}

/// Metadata about a report run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Product URL or input file the reviews came from.
    pub source: String,
    /// Date and time of the analysis.
    pub analysis_date: DateTime<Utc>,
    /// Name of the LLM model used.
    pub model_used: String,
    /// Number of reviews collected (scraped or loaded).
    pub reviews_collected: usize,
    /// Number of reviews sent through classification.
    pub reviews_analyzed: usize,
    /// Number of review pages visited, when the reviews were scraped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages_scraped: Option<usize>,
    /// Why pagination stopped, when the reviews were scraped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<String>,
    /// Duration of the run in seconds.
    pub duration_seconds: f64,
}

/// The complete review analysis report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub result: PipelineResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_from_str() {
        assert_eq!("positive".parse::<Sentiment>(), Ok(Sentiment::Positive));
        assert_eq!(" Mixed ".parse::<Sentiment>(), Ok(Sentiment::Mixed));
        assert_eq!("NEGATIVE".parse::<Sentiment>(), Ok(Sentiment::Negative));
        assert!("great".parse::<Sentiment>().is_err());
    }

    #[test]
    fn test_grouping_keys_fall_back_to_sentinels() {
        let mut review = ReviewRecord::new("nice");
        assert_eq!(review.region_key(), UNKNOWN_REGION);
        assert_eq!(review.variant_key(), STANDARD_VARIANT);

        review.region = Some("  ".to_string());
        review.product_variant = Some("Pink".to_string());
        assert_eq!(review.region_key(), UNKNOWN_REGION);
        assert_eq!(review.variant_key(), "Pink");
    }

    #[test]
    fn test_rating_zero_is_unknown() {
        let mut review = ReviewRecord::new("ok");
        assert_eq!(review.rating(), None);
        review.star_rating = 4;
        assert_eq!(review.rating(), Some(4));
        review.star_rating = 9;
        assert_eq!(review.rating(), None);
    }

    #[test]
    fn test_unmentioned_verdict_is_normalized() {
        let verdict = AspectVerdict::new(AspectId::Audio, false, Sentiment::Negative, "muddy");
        assert_eq!(verdict, AspectVerdict::unmentioned(AspectId::Audio));

        let verdict = AspectVerdict::new(AspectId::Audio, true, Sentiment::Negative, " muddy ");
        assert_eq!(verdict.comment, "muddy");
        assert_eq!(verdict.sentiment, Sentiment::Negative);
    }

    #[test]
    fn test_verdict_set_lookup() {
        let mut set = VerdictSet::unmentioned();
        assert!(!set.any_mentioned());
        set.appearance = AspectVerdict::new(AspectId::Appearance, true, Sentiment::Positive, "cute");
        assert!(set.any_mentioned());
        assert_eq!(set.get(AspectId::Appearance).comment, "cute");
        assert_eq!(
            set.iter().map(|v| v.aspect).collect::<Vec<_>>(),
            AspectId::ALL.to_vec()
        );
    }

    #[test]
    fn test_review_record_json_defaults() {
        let review: ReviewRecord = serde_json::from_str(r#"{"text": "good"}"#).unwrap();
        assert_eq!(review.star_rating, 0);
        assert!(review.image_urls.is_empty());
        assert_eq!(review.region, None);
    }
}
