//! Turns free-form LLM output into a validated [`VerdictSet`].

use crate::classifier::oracle::Oracle;
use crate::models::{AspectId, AspectVerdict, Sentiment, VerdictSet};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You are a professional product review analyst. \
Always answer with a single JSON object and nothing else.";

/// Result of validating one oracle response.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Valid(VerdictSet),
    Malformed(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVerdicts {
    #[serde(alias = "ai_feature")]
    feature: RawVerdict,
    #[serde(alias = "sound_quality")]
    audio: RawVerdict,
    appearance: RawVerdict,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVerdict {
    mentioned: bool,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    comment: Option<String>,
}

impl RawVerdict {
    fn into_verdict(self, aspect: AspectId) -> Result<AspectVerdict, String> {
        if !self.mentioned {
            return Ok(AspectVerdict::unmentioned(aspect));
        }
        let label = self
            .sentiment
            .ok_or_else(|| format!("{} is mentioned but has no sentiment", aspect.key()))?;
        let sentiment: Sentiment = label
            .parse()
            .map_err(|e: String| format!("{}: {}", aspect.key(), e))?;
        Ok(AspectVerdict::new(
            aspect,
            true,
            sentiment,
            self.comment.as_deref().unwrap_or_default(),
        ))
    }
}

/// Classifies review text along the three product aspects.
#[derive(Clone)]
pub struct AspectClassifier {
    oracle: Arc<dyn Oracle>,
}

impl AspectClassifier {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    pub fn model(&self) -> &str {
        self.oracle.model()
    }

    /// Classify one review. Never fails: oracle errors and unusable
    /// responses degrade to all aspects unmentioned.
    pub async fn classify(&self, text: &str) -> VerdictSet {
        if text.trim().is_empty() {
            return VerdictSet::unmentioned();
        }

        let raw = match self.oracle.complete(SYSTEM_PROMPT, &build_prompt(text)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Classification request failed: {}", e);
                return VerdictSet::unmentioned();
            }
        };

        match parse_response(&raw) {
            ParseOutcome::Valid(verdicts) => verdicts,
            ParseOutcome::Malformed(reason) => {
                warn!("Discarding malformed classification: {}", reason);
                debug!("Raw response: {}", raw);
                VerdictSet::unmentioned()
            }
        }
    }
}

fn build_prompt(text: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("Analyze the following product review along these aspects:\n");
    prompt.push_str("1. feature: the smart/AI assistant functions of the product\n");
    prompt.push_str("2. audio: sound quality and audio effects\n");
    prompt.push_str("3. appearance: packaging, product design and looks\n\n");
    prompt.push_str(&format!("Review:\n{}\n\n", text));
    prompt.push_str("Return JSON in exactly this shape:\n");
    prompt.push_str(
        r#"{
  "feature": {"mentioned": true/false, "sentiment": "positive/negative/neutral/mixed", "comment": "short quote or summary"},
  "audio": {"mentioned": true/false, "sentiment": "positive/negative/neutral/mixed", "comment": "short quote or summary"},
  "appearance": {"mentioned": true/false, "sentiment": "positive/negative/neutral/mixed", "comment": "short quote or summary"}
}"#,
    );
    prompt.push_str("\nUse \"mentioned\": false when the review says nothing about an aspect.");
    prompt
}

/// Validate a raw oracle response against the verdict schema.
pub fn parse_response(raw: &str) -> ParseOutcome {
    let Some(json) = extract_json(raw) else {
        return ParseOutcome::Malformed("no JSON object in response".to_string());
    };

    let parsed: RawVerdicts = match serde_json::from_str(json) {
        Ok(parsed) => parsed,
        Err(e) => return ParseOutcome::Malformed(e.to_string()),
    };

    let verdicts = parsed
        .feature
        .into_verdict(AspectId::Feature)
        .and_then(|feature| {
            Ok(VerdictSet {
                feature,
                audio: parsed.audio.into_verdict(AspectId::Audio)?,
                appearance: parsed.appearance.into_verdict(AspectId::Appearance)?,
            })
        });

    match verdicts {
        Ok(set) => ParseOutcome::Valid(set),
        Err(reason) => ParseOutcome::Malformed(reason),
    }
}

/// The JSON object inside a response, without code fences or prose.
fn extract_json(raw: &str) -> Option<&str> {
    let mut body = raw.trim();
    if let Some(rest) = body.strip_prefix("```") {
        // Drop the info string (`json`) on the fence line.
        body = rest.split_once('\n').map_or("", |(_, after)| after);
        body = body.trim_end().trim_end_matches("```");
    }

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}
