//! Review acquisition from a rendered product page.

pub mod driver;
pub mod extractor;
pub mod pagination;
pub mod webdriver;

pub use driver::{DriverError, PageDriver};
pub use pagination::{PaginationSettings, ReviewScraper, ScrapeError, ScrapeOutcome, Stop};
pub use webdriver::{WebDriverSession, WebDriverSettings};
