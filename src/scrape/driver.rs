//! The page navigation seam.
//!
//! The pagination controller only talks to a browser through [`PageDriver`],
//! so it can run against a real WebDriver session or an in-memory fake.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a [`PageDriver`].
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("timed out after {:.1}s waiting for {selector}", .waited.as_secs_f64())]
    Timeout { selector: String, waited: Duration },

    #[error("no element matches {0}")]
    NoSuchElement(String),

    #[error("cannot reach WebDriver at {0}")]
    Connect(String),

    #[error("WebDriver session error: {0}")]
    Session(String),

    #[error("WebDriver protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Whether the error only means the page is not ready yet.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DriverError::Timeout { .. } | DriverError::NoSuchElement(_)
        )
    }
}

/// Browser operations needed to walk a paginated review list.
///
/// Selectors are CSS selectors. Implementations may take as long as the
/// underlying browser needs, but `wait_for` must give up after `timeout`.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate to `url`.
    async fn open(&mut self, url: &str) -> Result<(), DriverError>;

    /// Wait until at least one element matches `selector`.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Serialized DOM of the current page.
    async fn page_source(&mut self) -> Result<String, DriverError>;

    /// Click the first element matching `selector`.
    async fn click(&mut self, selector: &str) -> Result<(), DriverError>;

    /// Scroll the first element matching `selector` into view.
    async fn scroll_into_view(&mut self, selector: &str) -> Result<(), DriverError>;

    /// Remove every element matching `selector` from the DOM, returning how
    /// many were removed.
    async fn remove_matching(&mut self, selector: &str) -> Result<usize, DriverError>;
}
