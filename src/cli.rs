//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Options left unset fall back to the
//! configuration file, then to built-in defaults.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// ReviewLens - aspect-level sentiment reports for retail product reviews
///
/// Walks the paginated reviews of a product page through a WebDriver
/// browser session, classifies every review with an LLM along three
/// aspects (smart features, audio, appearance) and writes a Markdown or
/// JSON report with regional, variant and rating statistics.
///
/// Examples:
///   reviewlens --url https://item.jd.com/100119535525.html
///   reviewlens --url https://item.jd.com/100119535525.html --scrape-only
///   reviewlens --input reviews.json --provider openai --model deepseek-chat
///   reviewlens --input reviews.json --format json -o report.json
///   reviewlens --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Product page URL to scrape reviews from
    #[arg(
        short,
        long,
        value_name = "URL",
        required_unless_present_any = ["input", "init_config"]
    )]
    pub url: Option<String>,

    /// Analyze previously saved reviews (JSON) instead of scraping
    #[arg(short, long, value_name = "FILE", conflicts_with_all = ["url", "scrape_only"])]
    pub input: Option<PathBuf>,

    /// Stop after saving the scraped reviews
    #[arg(long)]
    pub scrape_only: bool,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Where to save the scraped reviews (JSON)
    #[arg(long, value_name = "FILE")]
    pub reviews_out: Option<PathBuf>,

    /// Where to write per-review analysis rows (CSV)
    #[arg(long, value_name = "FILE")]
    pub rows_out: Option<PathBuf>,

    /// LLM model used for classification
    ///
    /// Examples: qwen2.5:7b (Ollama), deepseek-chat (OpenAI-compatible).
    #[arg(short, long, env = "REVIEWLENS_MODEL")]
    pub model: Option<String>,

    /// LLM API flavour
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<Provider>,

    /// LLM API base URL
    #[arg(long, value_name = "URL", env = "OLLAMA_URL")]
    pub llm_url: Option<String>,

    /// Environment variable holding the API key (openai provider only)
    #[arg(long, value_name = "VAR")]
    pub api_key_env: Option<String>,

    /// WebDriver server URL (chromedriver, geckodriver, Selenium)
    #[arg(long, value_name = "URL", env = "WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,

    /// Maximum number of review pages to visit
    #[arg(long, value_name = "COUNT")]
    pub max_pages: Option<usize>,

    /// Maximum number of reviews to classify (0 = all)
    #[arg(short, long, value_name = "COUNT")]
    pub limit: Option<usize>,

    /// Number of concurrent classification requests
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// LLM request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .reviewlens.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .reviewlens.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// LLM API flavour.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Ollama's native chat API (default)
    #[default]
    Ollama,
    /// OpenAI-compatible chat completions (DeepSeek, vLLM, ...)
    #[value(name = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.url {
            if !is_http_url(url) {
                return Err("Product URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref url) = self.llm_url {
            if !is_http_url(url) {
                return Err("LLM URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref url) = self.webdriver_url {
            if !is_http_url(url) {
                return Err("WebDriver URL must start with 'http://' or 'https://'".to_string());
            }
        }

        // Validate temperature range
        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.max_pages == Some(0) {
            return Err("Max pages must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref input) = self.input {
            if !input.is_file() {
                return Err(format!("Input file does not exist: {}", input.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            url: Some("https://item.jd.com/100119535525.html".to_string()),
            input: None,
            scrape_only: false,
            output: None,
            format: None,
            reviews_out: None,
            rows_out: None,
            model: None,
            provider: None,
            llm_url: None,
            api_key_env: None,
            webdriver_url: None,
            headless: false,
            max_pages: None,
            limit: None,
            concurrency: None,
            temperature: None,
            timeout: None,
            config: None,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_validation_accepts_defaults() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.url = Some("item.jd.com/1.html".to_string());
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.webdriver_url = Some("localhost:9515".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_ranges() {
        let mut args = make_args();
        args.temperature = Some(1.5);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.concurrency = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.max_pages = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_missing_input_file() {
        let mut args = make_args();
        args.url = None;
        args.input = Some(PathBuf::from("/definitely/not/here/reviews.json"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_parse_from_command_line() {
        let args = Args::try_parse_from([
            "reviewlens",
            "--input",
            "reviews.json",
            "--provider",
            "openai",
            "--format",
            "json",
            "--limit",
            "20",
        ])
        .unwrap();
        assert_eq!(args.provider, Some(Provider::OpenAi));
        assert_eq!(args.format, Some(OutputFormat::Json));
        assert_eq!(args.limit, Some(20));
        assert!(args.url.is_none());

        assert!(Args::try_parse_from(["reviewlens"]).is_err());
        assert!(Args::try_parse_from([
            "reviewlens",
            "--input",
            "a.json",
            "--scrape-only"
        ])
        .is_err());
    }
}
