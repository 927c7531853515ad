//! Review extraction from a rendered review page.
//!
//! Parsing happens on a page-source string so the non-`Send` DOM never
//! crosses an `.await`. Every optional field degrades on its own: a review
//! whose order info or images are missing still yields a record, and only a
//! missing review body drops the element.

use crate::config::SelectorConfig;
use crate::models::ReviewRecord;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

/// Characters of review text folded into a page fingerprint.
const FINGERPRINT_PREFIX: usize = 32;

/// Errors raised while preparing extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid {name} selector {selector:?}: {reason}")]
    InvalidSelector {
        name: &'static str,
        selector: String,
        reason: String,
    },
}

/// CSS selectors compiled once per run.
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    item: Selector,
    reviewer_id_attr: String,
    user_tier: Selector,
    text: Selector,
    star: Selector,
    order_info: Selector,
    images: Selector,
    next_page: Selector,
}

fn compile(name: &'static str, css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::InvalidSelector {
        name,
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

impl CompiledSelectors {
    pub fn compile(config: &SelectorConfig) -> Result<Self, ExtractError> {
        Ok(Self {
            item: compile("review item", &config.item)?,
            reviewer_id_attr: config.reviewer_id_attr.clone(),
            user_tier: compile("user tier", &config.user_tier)?,
            text: compile("review text", &config.text)?,
            star: compile("star rating", &config.star)?,
            order_info: compile("order info", &config.order_info)?,
            images: compile("image", &config.images)?,
            next_page: compile("next page", &config.next_page)?,
        })
    }
}

/// Records found on one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageExtraction {
    pub records: Vec<ReviewRecord>,
    /// Review elements seen, including those skipped for lack of text.
    pub candidates: usize,
}

/// State of the pager's "next page" control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextControl {
    Absent,
    Disabled,
    Enabled,
}

/// Pager control state plus the identity of the reviews shown with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagerState {
    pub next: NextControl,
    pub fingerprint: String,
}

/// Inspect the pager of a page.
pub fn pager_state(html: &str, selectors: &CompiledSelectors) -> PagerState {
    let document = Html::parse_document(html);
    PagerState {
        next: next_control_from(&document, selectors),
        fingerprint: fingerprint_from(&document, selectors),
    }
}

/// Extract the review records on a page.
pub fn extract_page(html: &str, selectors: &CompiledSelectors) -> PageExtraction {
    extract_from(&Html::parse_document(html), selectors)
}

/// Identity of the reviews currently shown, used to notice page changes.
pub fn fingerprint(html: &str, selectors: &CompiledSelectors) -> String {
    fingerprint_from(&Html::parse_document(html), selectors)
}

fn extract_from(document: &Html, selectors: &CompiledSelectors) -> PageExtraction {
    let mut extraction = PageExtraction::default();
    for element in document.select(&selectors.item) {
        extraction.candidates += 1;
        if let Some(record) = extract_record(element, selectors) {
            extraction.records.push(record);
        }
    }
    extraction
}

fn extract_record(element: ElementRef<'_>, selectors: &CompiledSelectors) -> Option<ReviewRecord> {
    let text = first_text(element, &selectors.text)?;

    let reviewer_id = element
        .value()
        .attr(&selectors.reviewer_id_attr)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    let star_rating = element
        .select(&selectors.star)
        .next()
        .and_then(|star| star.value().attr("class"))
        .map(parse_star_class)
        .unwrap_or(0);

    let spans: Vec<String> = element
        .select(&selectors.order_info)
        .map(element_text)
        .collect();
    let span = |idx: usize| spans.get(idx).filter(|s| !s.is_empty()).cloned();

    let image_urls = element
        .select(&selectors.images)
        .filter_map(|img| img.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .map(str::to_string)
        .collect();

    Some(ReviewRecord {
        reviewer_id,
        user_tier: first_text(element, &selectors.user_tier),
        text,
        star_rating,
        product_variant: span(0),
        purchase_time: span(3),
        region: span(4),
        image_urls,
    })
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Star count from a class list such as `comment-star star4`; 0 when absent.
fn parse_star_class(class: &str) -> u8 {
    class
        .rsplit("star")
        .next()
        .and_then(|suffix| suffix.trim().parse::<u8>().ok())
        .filter(|stars| (1..=5).contains(stars))
        .unwrap_or(0)
}

fn next_control_from(document: &Html, selectors: &CompiledSelectors) -> NextControl {
    let Some(control) = document.select(&selectors.next_page).next() else {
        return NextControl::Absent;
    };
    let value = control.value();
    let class_disabled = value
        .attr("class")
        .is_some_and(|class| class.contains("disabled"));
    if class_disabled || value.attr("disabled").is_some() {
        NextControl::Disabled
    } else {
        NextControl::Enabled
    }
}

fn fingerprint_from(document: &Html, selectors: &CompiledSelectors) -> String {
    document
        .select(&selectors.item)
        .map(|element| {
            let id = element
                .value()
                .attr(&selectors.reviewer_id_attr)
                .unwrap_or_default();
            let text = first_text(element, &selectors.text).unwrap_or_default();
            let prefix: String = text.chars().take(FINGERPRINT_PREFIX).collect();
            format!("{}:{}", id, prefix)
        })
        .collect::<Vec<_>>()
        .join("|")
}
