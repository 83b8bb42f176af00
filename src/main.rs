use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use newsbrief::config::Config;
use newsbrief::feed::HttpFeedSource;
use newsbrief::pipeline;
use newsbrief::summary::OllamaSummarizer;

#[derive(Parser, Debug)]
#[command(
    name = "newsbrief",
    about = "Collect RSS feeds and maintain a summarized news archive"
)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, value_name = "FILE", default_value = "newsbrief.toml")]
    config: PathBuf,

    /// Only collect and print articles; leave archive, cache and summarizer alone
    #[arg(long)]
    collect_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (RUST_LOG controls verbosity)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let source = Arc::new(HttpFeedSource::new().context("Failed to build HTTP client")?);

    if args.collect_only {
        let (articles, report) = pipeline::collect_only(&config, source).await;
        for article in &articles {
            println!(
                "{}  [{}] {}\n    {}",
                article.published_at.format("%Y-%m-%d %H:%M"),
                article.source,
                article.title,
                article.link
            );
        }
        println!(
            "\n{} articles from {} of {} sources",
            articles.len(),
            report.sources_succeeded(),
            report.sources_total
        );
        for failure in &report.failed {
            println!("  skipped {}: {}", failure.name, failure.error);
        }
        return Ok(());
    }

    let summarizer = OllamaSummarizer::new(
        &config.summarizer.host,
        config.summarizer.model.clone(),
        config.summarizer_timeout(),
    )
    .context("Failed to build summarizer client")?;

    let report = pipeline::run(&config, source, &summarizer).await;
    print!("{report}");
    println!("Saved to: {}", config.archive_path.display());

    Ok(())
}
