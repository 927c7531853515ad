//! ReviewLens - aspect-level sentiment analysis of retail product reviews
//!
//! A CLI tool that walks the paginated reviews of a product page through a
//! WebDriver browser session, classifies each review with an LLM and writes
//! regional, variant and rating statistics plus derived insights.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (connection, config, fatal scrape failure, etc.)

mod analysis;
mod classifier;
mod cli;
mod config;
mod export;
mod models;
mod pipeline;
mod report;
mod scrape;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use classifier::{AspectClassifier, OllamaOracle, OpenAiOracle, Oracle};
use cli::{Args, Provider};
use config::{Config, CONFIG_FILE_NAME};
use models::{AspectId, Report, ReportMetadata};
use pipeline::PipelineSettings;
use scrape::extractor::CompiledSelectors;
use scrape::{ReviewScraper, ScrapeOutcome, WebDriverSession};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("ReviewLens v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .reviewlens.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the model, selectors, timeouts and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings. `RUST_LOG` wins when set.
fn init_logging(args: &Args) {
    let level = args.log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete scrape and analysis workflow. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    let reviews_out = Path::new(&config.general.reviews_out).to_path_buf();

    // Step 1: Collect reviews
    let (reviews, source, scrape) = match (&args.input, &args.url) {
        (Some(input), _) => {
            println!("📂 Loading reviews from {}", input.display());
            let reviews = export::load_reviews(input)?;
            (reviews, input.display().to_string(), None)
        }
        (None, Some(url)) => {
            println!("🌐 Scraping reviews from {}", url);
            println!("   WebDriver: {}", config.scraper.webdriver_url);
            println!("   Max pages: {}", config.scraper.max_pages);
            let outcome = scrape_reviews(url, &config, &reviews_out).await?;
            println!(
                "   Collected {} reviews from {} pages ({})",
                outcome.reviews.len(),
                outcome.pages,
                outcome.stop
            );
            println!("   Saved to {}", reviews_out.display());
            let scrape = Some((outcome.pages, outcome.stop.to_string()));
            (outcome.reviews, url.clone(), scrape)
        }
        (None, None) => return Err(anyhow!("Either --url or --input is required")),
    };

    if args.scrape_only {
        println!("\n✅ Scrape complete. Reviews saved to: {}", reviews_out.display());
        return Ok(0);
    }

    if reviews.is_empty() {
        warn!("No reviews to analyze");
    }

    // Step 2: Classify and aggregate
    let classifier = build_classifier(&config)?;
    println!("\n🤖 Classifying reviews...");
    println!("   Model: {} ({:?})", classifier.model(), config.model.provider);
    println!("   Endpoint: {}", config.model.url);

    let settings = PipelineSettings {
        review_limit: config.analysis.review_limit,
        concurrency: config.general.concurrency,
        sample_cap: config.analysis.sample_cap,
        insights: config.insight_config(),
        show_progress: !args.quiet,
    };
    let analysis = pipeline::analyze_reviews(&reviews, &classifier, &settings).await;

    let rows_out = Path::new(&config.general.rows_out);
    export::write_analysis_csv(rows_out, &analysis.rows)?;

    // Step 3: Build and save the report
    println!("\n📝 Generating report...");

    let metadata = ReportMetadata {
        source,
        analysis_date: Utc::now(),
        model_used: classifier.model().to_string(),
        reviews_collected: reviews.len(),
        reviews_analyzed: analysis.rows.len(),
        pages_scraped: scrape.as_ref().map(|(pages, _)| *pages),
        termination: scrape.map(|(_, stop)| stop),
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };
    let report = Report {
        metadata,
        result: analysis.result,
    };

    let output = Path::new(&config.general.output);
    report::write_report(&report, output, &config.report)?;

    print_summary(&report, rows_out, output);
    Ok(0)
}

/// Scrape all reviews from `url` and save them, even when the run fails.
async fn scrape_reviews(url: &str, config: &Config, reviews_out: &Path) -> Result<ScrapeOutcome> {
    // Fail on bad selectors before a browser is started.
    CompiledSelectors::compile(&config.selectors).context("Invalid selector configuration")?;

    let driver = WebDriverSession::start(&config.webdriver_settings())
        .await
        .with_context(|| {
            format!(
                "Failed to start a browser session at {}",
                config.scraper.webdriver_url
            )
        })?;
    let mut scraper = ReviewScraper::new(
        driver,
        config.selectors.clone(),
        config.pagination_settings(),
    )
    .context("Invalid selector configuration")?;

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current page");
                cancel.cancel();
            }
        })
    };

    let result = scraper.run(url, &cancel).await;
    interrupt.abort();

    if let Err(e) = scraper.into_driver().quit().await {
        warn!("Failed to close the browser session: {}", e);
    }

    match result {
        Ok(outcome) => {
            export::save_reviews(reviews_out, &outcome.reviews)?;
            Ok(outcome)
        }
        Err(e) => {
            let message = e.to_string();
            let partial = e.into_partial();
            if !partial.is_empty() {
                export::save_reviews(reviews_out, &partial)?;
                warn!(
                    "Saved {} partial reviews to {}",
                    partial.len(),
                    reviews_out.display()
                );
            }
            Err(anyhow!("Scraping failed: {}", message))
        }
    }
}

/// Create the classifier for the configured LLM provider.
fn build_classifier(config: &Config) -> Result<AspectClassifier> {
    let settings = config.oracle_settings();
    let oracle: Arc<dyn Oracle> = match config.model.provider {
        Provider::Ollama => Arc::new(OllamaOracle::new(settings)?),
        Provider::OpenAi => Arc::new(
            OpenAiOracle::from_env(settings, &config.model.api_key_env)
                .context("Cannot create the OpenAI-compatible client")?,
        ),
    };
    Ok(AspectClassifier::new(oracle))
}

fn print_summary(report: &Report, rows_out: &Path, output: &Path) {
    let result = &report.result;

    println!("\n📊 Analysis Summary:");
    println!("   Reviews analyzed: {}", result.total_reviews);
    match result.mean_rating() {
        Some(mean) => println!("   Average rating: {:.2}/5", mean),
        None => println!("   Average rating: n/a"),
    }
    for aspect in AspectId::ALL {
        let satisfaction = result
            .aspects
            .get(aspect)
            .satisfaction()
            .map_or_else(|| "n/a".to_string(), |s| format!("{:.1}%", s * 100.0));
        println!(
            "   {}: mentioned in {:.1}% of reviews, satisfaction {}",
            aspect.label(),
            result.mention_rate(aspect) * 100.0,
            satisfaction
        );
    }
    println!("\n💡 Key Insights:");
    for insight in &result.insights {
        println!("   - {}", insight);
    }
    println!("   Duration: {:.1}s", report.metadata.duration_seconds);
    println!("\n✅ Analysis complete! Report saved to: {}", output.display());
    println!("   Per-review rows: {}", rows_out.display());
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

