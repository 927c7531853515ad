//! Derived findings over a finalized result.

use crate::analysis::aggregator::{GroupTable, PipelineResult};
use crate::models::AspectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Thresholds used when deriving insights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsightConfig {
    /// In-region positive rate an aspect must exceed to count as an affinity.
    pub affinity_threshold: f64,
    /// Minimum share of all reviews a region needs to be considered.
    pub min_region_share: f64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            affinity_threshold: 0.7,
            min_region_share: 0.1,
        }
    }
}

/// A single finding, in the order the report lists them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Insight {
    HighestRatedRegion {
        region: String,
        mean_rating: f64,
    },
    FavoredVariant {
        variant: String,
        mean_rating: f64,
    },
    StrongestAspect {
        aspect: AspectId,
        satisfaction: f64,
    },
    WeakestAspect {
        aspect: AspectId,
        satisfaction: f64,
    },
    InsufficientAspectData,
    RegionalAffinity {
        region: String,
        aspects: Vec<AspectId>,
    },
    NoInsights,
}

impl fmt::Display for Insight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insight::HighestRatedRegion {
                region,
                mean_rating,
            } => write!(
                f,
                "Users in {} gave the highest average rating ({:.2}/5)",
                region, mean_rating
            ),
            Insight::FavoredVariant {
                variant,
                mean_rating,
            } => write!(
                f,
                "The {} variant is the most favored ({:.2}/5)",
                variant, mean_rating
            ),
            Insight::StrongestAspect {
                aspect,
                satisfaction,
            } => write!(
                f,
                "{} has the highest satisfaction ({:.1}%)",
                aspect,
                satisfaction * 100.0
            ),
            Insight::WeakestAspect {
                aspect,
                satisfaction,
            } => write!(
                f,
                "{} needs the most improvement ({:.1}% satisfaction)",
                aspect,
                satisfaction * 100.0
            ),
            Insight::InsufficientAspectData => {
                write!(f, "Not enough aspect mentions to rank satisfaction")
            }
            Insight::RegionalAffinity { region, aspects } => {
                let names: Vec<&str> = aspects.iter().map(|a| a.label()).collect();
                write!(
                    f,
                    "Users in {} are especially positive about: {}",
                    region,
                    names.join(", ")
                )
            }
            Insight::NoInsights => write!(f, "No insights available"),
        }
    }
}

/// Derive the ordered insight list for a finalized result.
pub fn synthesize(result: &PipelineResult, config: &InsightConfig) -> Vec<Insight> {
    let mut insights = Vec::new();

    if let Some((region, mean_rating)) = best_group(&result.regions) {
        insights.push(Insight::HighestRatedRegion {
            region: region.to_string(),
            mean_rating,
        });
    }

    if let Some((variant, mean_rating)) = best_group(&result.variants) {
        insights.push(Insight::FavoredVariant {
            variant: variant.to_string(),
            mean_rating,
        });
    }

    let scored: Vec<(AspectId, f64)> = AspectId::ALL
        .iter()
        .filter_map(|&a| result.aspects.get(a).satisfaction().map(|s| (a, s)))
        .collect();

    match (strongest(&scored), weakest(&scored)) {
        (Some((best, best_score)), Some((worst, worst_score))) => {
            insights.push(Insight::StrongestAspect {
                aspect: best,
                satisfaction: best_score,
            });
            insights.push(Insight::WeakestAspect {
                aspect: worst,
                satisfaction: worst_score,
            });
        }
        _ => insights.push(Insight::InsufficientAspectData),
    }

    for (region, group) in result.regions.iter() {
        if result.share_of_total(group) < config.min_region_share {
            continue;
        }
        let aspects: Vec<AspectId> = AspectId::ALL
            .into_iter()
            .filter(|&a| group.positive_rate(a) > config.affinity_threshold)
            .collect();
        if !aspects.is_empty() {
            insights.push(Insight::RegionalAffinity {
                region: region.to_string(),
                aspects,
            });
        }
    }

    or_placeholder(insights)
}

/// Never hand out an empty list.
fn or_placeholder(insights: Vec<Insight>) -> Vec<Insight> {
    if insights.is_empty() {
        vec![Insight::NoInsights]
    } else {
        insights
    }
}

/// Group with the highest mean rating; ties go to the first inserted.
fn best_group(table: &GroupTable) -> Option<(&str, f64)> {
    let mut best: Option<(&str, f64)> = None;
    for (key, group) in table.iter() {
        let Some(mean) = group.mean_rating else {
            continue;
        };
        if best.map_or(true, |(_, m)| mean > m) {
            best = Some((key, mean));
        }
    }
    best
}

fn strongest(scored: &[(AspectId, f64)]) -> Option<(AspectId, f64)> {
    scored
        .iter()
        .copied()
        .fold(None, |acc, (a, s)| match acc {
            Some((_, best)) if s <= best => acc,
            _ => Some((a, s)),
        })
}

fn weakest(scored: &[(AspectId, f64)]) -> Option<(AspectId, f64)> {
    scored
        .iter()
        .copied()
        .fold(None, |acc, (a, s)| match acc {
            Some((_, worst)) if s >= worst => acc,
            _ => Some((a, s)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AggregationState;
    use crate::models::{AspectVerdict, ReviewRecord, Sentiment, VerdictSet};

    fn review(region: &str, variant: &str, rating: u8) -> ReviewRecord {
        ReviewRecord {
            region: Some(region.to_string()),
            product_variant: Some(variant.to_string()),
            star_rating: rating,
            ..ReviewRecord::new("text")
        }
    }

    fn with(aspects: &[(AspectId, Sentiment)]) -> VerdictSet {
        let mut set = VerdictSet::unmentioned();
        for &(aspect, sentiment) in aspects {
            let verdict = AspectVerdict::new(aspect, true, sentiment, "c");
            match aspect {
                AspectId::Feature => set.feature = verdict,
                AspectId::Audio => set.audio = verdict,
                AspectId::Appearance => set.appearance = verdict,
            }
        }
        set
    }

    fn result(items: Vec<(ReviewRecord, VerdictSet)>) -> PipelineResult {
        items
            .iter()
            .fold(AggregationState::new(3), |s, (r, v)| s.update(r, v))
            .finalize(&InsightConfig::default())
    }

    #[test]
    fn test_empty_run_reports_insufficient_data() {
        let result = result(Vec::new());
        assert_eq!(result.insights, vec![Insight::InsufficientAspectData]);
    }

    #[test]
    fn test_empty_insight_list_becomes_placeholder() {
        assert_eq!(or_placeholder(Vec::new()), vec![Insight::NoInsights]);
        assert_eq!(
            or_placeholder(vec![Insight::InsufficientAspectData]),
            vec![Insight::InsufficientAspectData]
        );
        assert_eq!(Insight::NoInsights.to_string(), "No insights available");
    }

    #[test]
    fn test_ranking_ties_go_to_first_inserted() {
        let result = result(vec![
            (review("North", "Blue", 4), VerdictSet::unmentioned()),
            (review("South", "Pink", 4), VerdictSet::unmentioned()),
        ]);
        assert_eq!(
            result.insights[0],
            Insight::HighestRatedRegion {
                region: "North".to_string(),
                mean_rating: 4.0
            }
        );
        assert_eq!(
            result.insights[1],
            Insight::FavoredVariant {
                variant: "Blue".to_string(),
                mean_rating: 4.0
            }
        );
    }

    #[test]
    fn test_unrated_groups_are_skipped_by_rankings() {
        let result = result(vec![
            (review("North", "Blue", 0), VerdictSet::unmentioned()),
            (review("South", "Blue", 2), VerdictSet::unmentioned()),
        ]);
        assert!(matches!(
            &result.insights[0],
            Insight::HighestRatedRegion { region, .. } if region == "South"
        ));
    }

    #[test]
    fn test_unmentioned_aspects_are_not_ranked() {
        let result = result(vec![
            (
                review("A", "V", 5),
                with(&[(AspectId::Audio, Sentiment::Positive)]),
            ),
            (
                review("A", "V", 5),
                with(&[(AspectId::Appearance, Sentiment::Negative)]),
            ),
        ]);
        assert!(result.insights.contains(&Insight::StrongestAspect {
            aspect: AspectId::Audio,
            satisfaction: 1.0
        }));
        assert!(result.insights.contains(&Insight::WeakestAspect {
            aspect: AspectId::Appearance,
            satisfaction: 0.0
        }));
        assert!(!result
            .insights
            .iter()
            .any(|i| matches!(i, Insight::StrongestAspect { aspect: AspectId::Feature, .. })));
    }

    #[test]
    fn test_regional_affinity() {
        let mut items = Vec::new();
        // Region "Fans": 4 reviews, all positive on audio, half on feature.
        for i in 0..4 {
            let mut aspects = vec![(AspectId::Audio, Sentiment::Positive)];
            if i % 2 == 0 {
                aspects.push((AspectId::Feature, Sentiment::Positive));
            }
            items.push((review("Fans", "V", 5), with(&aspects)));
        }
        // Region "Tiny": 1 review out of 20, ignored by the share filter.
        items.push((
            review("Tiny", "V", 5),
            with(&[(AspectId::Audio, Sentiment::Positive)]),
        ));
        for _ in 0..15 {
            items.push((review("Crowd", "V", 3), VerdictSet::unmentioned()));
        }

        let result = result(items);
        let affinities: Vec<_> = result
            .insights
            .iter()
            .filter(|i| matches!(i, Insight::RegionalAffinity { .. }))
            .collect();
        assert_eq!(
            affinities,
            vec![&Insight::RegionalAffinity {
                region: "Fans".to_string(),
                aspects: vec![AspectId::Audio]
            }]
        );
    }

    #[test]
    fn test_display() {
        let insight = Insight::StrongestAspect {
            aspect: AspectId::Audio,
            satisfaction: 0.5,
        };
        assert_eq!(
            insight.to_string(),
            "Audio quality has the highest satisfaction (50.0%)"
        );
        let insight = Insight::RegionalAffinity {
            region: "Beijing".to_string(),
            aspects: vec![AspectId::Feature, AspectId::Appearance],
        };
        assert_eq!(
            insight.to_string(),
            "Users in Beijing are especially positive about: Smart features, Appearance"
        );
    }
}
