//! Pagination controller for the review list.
//!
//! Review pages are reached by clicking a "next page" control that rewrites
//! the list in place, so there is no URL or cursor to follow. The controller
//! runs a small state machine over a [`PageDriver`]:
//!
//! ```text
//! LoadingPage ──▶ Extracting ──▶ Advancing ──▶ LoadingPage
//!      │               │             │  ▲
//!      ▼               ▼             │  └── retry (unchanged page)
//!   Failed        Terminated ◀───────┘
//! ```
//!
//! "No more pages" is only concluded from the pager itself (control absent or
//! disabled) or from an empty page. A click that does not change the listed
//! reviews is retried before the run is declared stalled. Each retry first
//! checks whether the earlier click has landed in the meantime. Reviews
//! collected before any stop are always returned.

use crate::config::SelectorConfig;
use crate::models::ReviewRecord;
use crate::scrape::driver::{DriverError, PageDriver};
use crate::scrape::extractor::{
    extract_page, fingerprint, pager_state, CompiledSelectors, ExtractError, NextControl,
};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Limits and timeouts for one scraping run.
#[derive(Debug, Clone)]
pub struct PaginationSettings {
    pub max_pages: usize,
    /// Wait for the review list after navigation or a page change.
    pub load_timeout: Duration,
    /// Wait for the listed reviews to change after clicking "next".
    pub advance_timeout: Duration,
    /// Extra attempts after a click that did not change the page.
    pub advance_retries: usize,
    pub poll_interval: Duration,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            max_pages: 1000,
            load_timeout: Duration::from_secs(10),
            advance_timeout: Duration::from_secs(5),
            advance_retries: 1,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Why a run ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A page listed no reviews.
    EmptyPage,
    /// The next-page control was absent or disabled.
    LastPage,
    /// Clicking next never changed the listed reviews.
    AdvanceStalled,
    /// The configured page ceiling was reached.
    PageCeiling,
    Cancelled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Termination::EmptyPage => "empty page",
            Termination::LastPage => "last page reached",
            Termination::AdvanceStalled => "page advance stalled",
            Termination::PageCeiling => "page ceiling reached",
            Termination::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// How a run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stop {
    Terminated(Termination),
    /// The page stopped responding mid-run. Collected reviews are kept.
    Failed(String),
}

impl fmt::Display for Stop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stop::Terminated(t) => write!(f, "{}", t),
            Stop::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Result of a run that got past session start.
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    /// Reviews in page order.
    pub reviews: Vec<ReviewRecord>,
    /// Pages extracted.
    pub pages: usize,
    pub stop: Stop,
}

/// Fatal scraping errors. Both carry whatever was collected.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("cannot open {url}: {source}")]
    Session {
        url: String,
        #[source]
        source: DriverError,
        partial: Vec<ReviewRecord>,
    },

    #[error(
        "saw {candidates} review elements on {pages} page(s) but extracted no review text; \
         the review selectors are probably outdated"
    )]
    SelectorDrift {
        candidates: usize,
        pages: usize,
        partial: Vec<ReviewRecord>,
    },
}

impl ScrapeError {
    /// Reviews collected before the failure.
    pub fn into_partial(self) -> Vec<ReviewRecord> {
        match self {
            ScrapeError::Session { partial, .. } | ScrapeError::SelectorDrift { partial, .. } => {
                partial
            }
        }
    }
}

#[derive(Debug)]
enum State {
    LoadingPage,
    Extracting,
    /// `before` is the fingerprint seen before the first click on this page.
    Advancing {
        attempt: usize,
        before: Option<String>,
    },
    Terminated(Termination),
    Failed(String),
}

/// Walks the paginated review list of a product page.
pub struct ReviewScraper<D> {
    driver: D,
    selectors: SelectorConfig,
    compiled: CompiledSelectors,
    settings: PaginationSettings,
}

impl<D: PageDriver> ReviewScraper<D> {
    pub fn new(
        driver: D,
        selectors: SelectorConfig,
        settings: PaginationSettings,
    ) -> Result<Self, ExtractError> {
        let compiled = CompiledSelectors::compile(&selectors)?;
        Ok(Self {
            driver,
            selectors,
            compiled,
            settings,
        })
    }

    /// Give back the driver, e.g. to close the browser session.
    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Collect every review reachable from `url`.
    pub async fn run(
        &mut self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        info!("Opening {}", url);
        if let Err(source) = self.driver.open(url).await {
            return Err(ScrapeError::Session {
                url: url.to_string(),
                source,
                partial: Vec::new(),
            });
        }
        self.open_review_tab().await;

        let mut reviews: Vec<ReviewRecord> = Vec::new();
        let mut pages = 0;
        let mut candidates = 0;
        let mut state = State::LoadingPage;

        let stop = loop {
            state = match state {
                State::LoadingPage => {
                    if cancel.is_cancelled() {
                        State::Terminated(Termination::Cancelled)
                    } else if pages >= self.settings.max_pages {
                        State::Terminated(Termination::PageCeiling)
                    } else {
                        self.load_page().await
                    }
                }
                State::Extracting => match self.driver.page_source().await {
                    Ok(html) => {
                        let page = extract_page(&html, &self.compiled);
                        pages += 1;
                        candidates += page.candidates;
                        debug!(
                            "Page {}: {} reviews from {} elements",
                            pages,
                            page.records.len(),
                            page.candidates
                        );
                        if page.records.is_empty() {
                            State::Terminated(Termination::EmptyPage)
                        } else {
                            reviews.extend(page.records);
                            State::Advancing {
                                attempt: 0,
                                before: None,
                            }
                        }
                    }
                    Err(e) => State::Failed(e.to_string()),
                },
                State::Advancing { attempt, before } => self.advance(attempt, before).await,
                State::Terminated(termination) => break Stop::Terminated(termination),
                State::Failed(reason) => break Stop::Failed(reason),
            };
        };

        if reviews.is_empty() && candidates > 0 {
            return Err(ScrapeError::SelectorDrift {
                candidates,
                pages,
                partial: reviews,
            });
        }

        match &stop {
            Stop::Terminated(t) => info!(
                "Scraped {} reviews from {} pages ({})",
                reviews.len(),
                pages,
                t
            ),
            Stop::Failed(reason) => warn!(
                "Scraping stopped early after {} pages: {}",
                pages, reason
            ),
        }

        Ok(ScrapeOutcome {
            reviews,
            pages,
            stop,
        })
    }

    async fn open_review_tab(&mut self) {
        let tab = &self.selectors.review_tab;
        let result = match self.driver.wait_for(tab, self.settings.load_timeout).await {
            Ok(()) => self.driver.click(tab).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            debug!("Review tab not clicked: {}", e);
        }
    }

    async fn load_page(&mut self) -> State {
        match self
            .driver
            .wait_for(&self.selectors.review_list, self.settings.load_timeout)
            .await
        {
            Ok(()) => State::Extracting,
            Err(e) => State::Failed(e.to_string()),
        }
    }

    async fn advance(&mut self, attempt: usize, before: Option<String>) -> State {
        if let Err(e) = self.driver.scroll_into_view(&self.selectors.pager).await {
            debug!("Pager not scrolled into view: {}", e);
        }

        let html = match self.driver.page_source().await {
            Ok(html) => html,
            Err(e) => return State::Failed(e.to_string()),
        };
        let pager = pager_state(&html, &self.compiled);

        // An earlier click may have registered after the change wait gave up.
        if let Some(before) = &before {
            if pager.fingerprint != *before {
                debug!("Page changed after an earlier next click");
                return State::LoadingPage;
            }
        }

        if pager.next != NextControl::Enabled {
            debug!("Next page control is {:?}", pager.next);
            return State::Terminated(Termination::LastPage);
        }

        match self.driver.remove_matching(&self.selectors.overlays).await {
            Ok(0) => {}
            Ok(removed) => debug!("Removed {} overlay elements", removed),
            Err(e) => debug!("Overlay removal failed: {}", e),
        }

        let before = before.unwrap_or(pager.fingerprint);
        let moved = match self.driver.click(&self.selectors.next_page).await {
            Ok(()) => self.wait_for_change(&before).await,
            Err(e) if e.is_transient() => {
                debug!("Next page click failed: {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        };

        match moved {
            Ok(true) => State::LoadingPage,
            Ok(false) if attempt < self.settings.advance_retries => {
                warn!(
                    "Page did not change after clicking next, retrying ({}/{})",
                    attempt + 1,
                    self.settings.advance_retries
                );
                State::Advancing {
                    attempt: attempt + 1,
                    before: Some(before),
                }
            }
            Ok(false) => State::Terminated(Termination::AdvanceStalled),
            Err(e) => State::Failed(e.to_string()),
        }
    }

    /// Poll until the listed reviews differ from `before`.
    async fn wait_for_change(&mut self, before: &str) -> Result<bool, DriverError> {
        let deadline = Instant::now() + self.settings.advance_timeout;
        loop {
            let html = self.driver.page_source().await?;
            if fingerprint(&html, &self.compiled) != before {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}
