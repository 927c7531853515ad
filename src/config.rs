//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.reviewlens.toml` files.

use crate::analysis::InsightConfig;
use crate::classifier::OracleSettings;
use crate::cli::{Args, OutputFormat, Provider};
use crate::scrape::{PaginationSettings, WebDriverSettings};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = ".reviewlens.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Browser and pagination settings.
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// CSS selectors for the review page.
    #[serde(default)]
    pub selectors: SelectorConfig,

    /// Aggregation and insight settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default report file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Where scraped reviews are saved.
    #[serde(default = "default_reviews_out")]
    pub reviews_out: String,

    /// Where per-review analysis rows are written.
    #[serde(default = "default_rows_out")]
    pub rows_out: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of concurrent classification requests.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            reviews_out: default_reviews_out(),
            rows_out: default_rows_out(),
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_output() -> String {
    "review_report.md".to_string()
}

fn default_reviews_out() -> String {
    "reviews.json".to_string()
}

fn default_rows_out() -> String {
    "review_analysis.csv".to_string()
}

fn default_concurrency() -> usize {
    4
}

/// LLM model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API flavour.
    #[serde(default)]
    pub provider: Provider,

    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// API base URL.
    #[serde(default = "default_llm_url")]
    pub url: String,

    /// Environment variable holding the API key (openai provider).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens in response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<usize>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            name: default_model(),
            url: default_llm_url(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_llm_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_api_key_env() -> String {
    "DEEPSEEK_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> Option<usize> {
    Some(1000)
}

fn default_timeout() -> u64 {
    120
}

/// Browser and pagination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// WebDriver server URL.
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    /// Browser name requested from the WebDriver server.
    #[serde(default = "default_browser")]
    pub browser: String,

    /// Run the browser without a window.
    #[serde(default)]
    pub headless: bool,

    /// Maximum review pages to visit.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Seconds to wait for the review list to appear.
    #[serde(default = "default_load_timeout")]
    pub load_timeout_secs: u64,

    /// Seconds to wait for the list to change after clicking "next".
    #[serde(default = "default_advance_timeout")]
    pub advance_timeout_secs: u64,

    /// Extra attempts when a page change is not observed.
    #[serde(default = "default_advance_retries")]
    pub advance_retries: usize,

    /// Milliseconds between DOM polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            browser: default_browser(),
            headless: false,
            max_pages: default_max_pages(),
            load_timeout_secs: default_load_timeout(),
            advance_timeout_secs: default_advance_timeout(),
            advance_retries: default_advance_retries(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_browser() -> String {
    "chrome".to_string()
}

fn default_max_pages() -> usize {
    1000
}

fn default_load_timeout() -> u64 {
    10
}

fn default_advance_timeout() -> u64 {
    5
}

fn default_advance_retries() -> usize {
    1
}

fn default_poll_interval() -> u64 {
    500
}

/// CSS selectors for the review page. The defaults match JD.com item pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Tab that switches the product page to its reviews.
    pub review_tab: String,
    /// Container that is present once the review list has rendered.
    pub review_list: String,
    /// One review.
    pub item: String,
    /// Attribute of the review element holding the reviewer id.
    pub reviewer_id_attr: String,
    pub user_tier: String,
    pub text: String,
    /// Element whose class ends in the star count, e.g. `star4`.
    pub star: String,
    /// Spans of order metadata: variant, -, -, purchase time, region.
    pub order_info: String,
    pub images: String,
    /// Pager container, scrolled into view before advancing.
    pub pager: String,
    pub next_page: String,
    /// Elements removed before clicking "next" because they cover the pager.
    pub overlays: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            review_tab: "li.tab-item[data-anchor='#comment']".to_string(),
            review_list: "#comment".to_string(),
            item: ".comment-item".to_string(),
            reviewer_id_attr: "data-guid".to_string(),
            user_tier: ".user-level".to_string(),
            text: ".comment-con".to_string(),
            star: "div[class^='comment-star star']".to_string(),
            order_info: ".order-info span".to_string(),
            images: ".J-pic-list img".to_string(),
            pager: "div.ui-page".to_string(),
            next_page: "div.ui-page a.ui-pager-next[href='#comment']".to_string(),
            overlays: ".J-global-toolbar, #InitCartUrl-mini".to_string(),
        }
    }
}

/// Aggregation and insight settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Maximum reviews to classify; 0 classifies all of them.
    #[serde(default = "default_review_limit")]
    pub review_limit: usize,

    /// Sample comments kept per aspect.
    #[serde(default = "default_sample_cap")]
    pub sample_cap: usize,

    /// In-region positive rate an aspect must exceed to be reported.
    #[serde(default = "default_affinity_threshold")]
    pub affinity_threshold: f64,

    /// Minimum share of all reviews for a region to be considered.
    #[serde(default = "default_min_region_share")]
    pub min_region_share: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            review_limit: default_review_limit(),
            sample_cap: default_sample_cap(),
            affinity_threshold: default_affinity_threshold(),
            min_region_share: default_min_region_share(),
        }
    }
}

fn default_review_limit() -> usize {
    100
}

fn default_sample_cap() -> usize {
    3
}

fn default_affinity_threshold() -> f64 {
    0.7
}

fn default_min_region_share() -> f64 {
    0.1
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Report format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Number of regions listed in the regional table.
    #[serde(default = "default_top_regions")]
    pub top_regions: usize,

    /// Include sample comments per aspect.
    #[serde(default = "default_true")]
    pub include_samples: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            top_regions: default_top_regions(),
            include_samples: true,
        }
    }
}

fn default_top_regions() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given.
    pub fn merge_with_args(&mut self, args: &Args) {
        // General settings
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(ref path) = args.reviews_out {
            self.general.reviews_out = path.display().to_string();
        }
        if let Some(ref path) = args.rows_out {
            self.general.rows_out = path.display().to_string();
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if args.verbose {
            self.general.verbose = true;
        }

        // Model settings
        if let Some(provider) = args.provider {
            self.model.provider = provider;
        }
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.llm_url {
            self.model.url = url.clone();
        }
        if let Some(ref var) = args.api_key_env {
            self.model.api_key_env = var.clone();
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        // Scraper settings
        if let Some(ref url) = args.webdriver_url {
            self.scraper.webdriver_url = url.clone();
        }
        if let Some(max_pages) = args.max_pages {
            self.scraper.max_pages = max_pages;
        }
        if args.headless {
            self.scraper.headless = true;
        }

        // Analysis and report settings
        if let Some(limit) = args.limit {
            self.analysis.review_limit = limit;
        }
        if let Some(format) = args.format {
            self.report.format = format;
        }
    }

    /// LLM client settings.
    pub fn oracle_settings(&self) -> OracleSettings {
        OracleSettings {
            base_url: self.model.url.clone(),
            model: self.model.name.clone(),
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
            timeout_seconds: self.model.timeout_seconds,
        }
    }

    /// WebDriver session settings.
    pub fn webdriver_settings(&self) -> WebDriverSettings {
        WebDriverSettings {
            url: self.scraper.webdriver_url.clone(),
            browser: self.scraper.browser.clone(),
            headless: self.scraper.headless,
            poll_interval: Duration::from_millis(self.scraper.poll_interval_ms),
            ..WebDriverSettings::default()
        }
    }

    /// Pagination limits and timeouts.
    pub fn pagination_settings(&self) -> PaginationSettings {
        PaginationSettings {
            max_pages: self.scraper.max_pages,
            load_timeout: Duration::from_secs(self.scraper.load_timeout_secs),
            advance_timeout: Duration::from_secs(self.scraper.advance_timeout_secs),
            advance_retries: self.scraper.advance_retries,
            poll_interval: Duration::from_millis(self.scraper.poll_interval_ms),
        }
    }

    /// Insight thresholds.
    pub fn insight_config(&self) -> InsightConfig {
        InsightConfig {
            affinity_threshold: self.analysis.affinity_threshold,
            min_region_share: self.analysis.min_region_share,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.provider, Provider::Ollama);
        assert_eq!(config.scraper.max_pages, 1000);
        assert_eq!(config.scraper.advance_retries, 1);
        assert_eq!(config.analysis.review_limit, 100);
        assert_eq!(config.analysis.sample_cap, 3);
        assert_eq!(config.selectors.item, ".comment-item");
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "custom_report.md"
verbose = true

[model]
provider = "openai"
name = "deepseek-chat"
url = "https://api.deepseek.com/v1"

[scraper]
max_pages = 50

[selectors]
item = ".review"

[analysis]
affinity_threshold = 0.8
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "custom_report.md");
        assert!(config.general.verbose);
        assert_eq!(config.model.provider, Provider::OpenAi);
        assert_eq!(config.model.name, "deepseek-chat");
        assert_eq!(config.model.temperature, 0.7);
        assert_eq!(config.scraper.max_pages, 50);
        assert_eq!(config.scraper.load_timeout_secs, 10);
        assert_eq!(config.selectors.item, ".review");
        assert_eq!(config.selectors.text, ".comment-con");
        assert_eq!(config.insight_config().affinity_threshold, 0.8);
        assert_eq!(config.insight_config().min_region_share, 0.1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[report]\nformat = \"json\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.report.format, OutputFormat::Json);

        std::fs::write(&path, "[report\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_merge_with_args_only_overrides_given_values() {
        let mut config: Config = toml::from_str("[model]\nname = \"from-file\"\n").unwrap();
        let args = Args::try_parse_from([
            "reviewlens",
            "--url",
            "https://item.jd.com/1.html",
            "--max-pages",
            "3",
            "--provider",
            "openai",
        ])
        .unwrap();
        config.merge_with_args(&args);

        // REVIEWLENS_MODEL may be set in the environment.
        if std::env::var("REVIEWLENS_MODEL").is_err() {
            assert_eq!(config.model.name, "from-file");
        }
        assert_eq!(config.model.provider, Provider::OpenAi);
        assert_eq!(config.scraper.max_pages, 3);
        assert_eq!(config.pagination_settings().max_pages, 3);
        assert_eq!(config.analysis.review_limit, 100);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[model]"));
        assert!(toml_str.contains("[scraper]"));
        assert!(toml_str.contains("[selectors]"));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.selectors, SelectorConfig::default());
    }
}
