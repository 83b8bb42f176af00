//! One complete pass: load state, collect, merge, persist, report.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::archive::{Archive, IncrementalArchive, MergeStats};
use crate::config::Config;
use crate::feed::{CollectReport, Collector, FeedSource};
use crate::summary::{SummaryCache, Summarizer};
use crate::types::Article;

/// A store that could not be written at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Statistics for one run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub collect: CollectReport,
    pub merge: MergeStats,
    /// Cache entries removed because they outlived the TTL.
    pub cache_evicted: usize,
    /// Articles in the archive as written.
    pub archive_len: usize,
    pub persist_failures: Vec<PersistFailure>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Sources: {} ok, {} skipped",
            self.collect.sources_succeeded(),
            self.collect.failed.len()
        )?;
        for failure in &self.collect.failed {
            writeln!(f, "  - {}: {}", failure.name, failure.error)?;
        }
        writeln!(
            f,
            "Articles: {} new, {} carried over, {} in archive",
            self.merge.new_articles, self.merge.carried_over, self.archive_len
        )?;
        writeln!(
            f,
            "Summaries: {} generated, {} from cache, {} failed",
            self.merge.summarized, self.merge.cache_hits, self.merge.failed
        )?;
        for failure in &self.persist_failures {
            writeln!(f, "Not saved: {} ({})", failure.path.display(), failure.error)?;
        }
        Ok(())
    }
}

/// Builds the collector described by `config`.
pub fn collector(config: &Config, source: Arc<dyn FeedSource>) -> Collector {
    Collector::new(source, config.max_concurrent_fetches).with_limit(config.collect_limit())
}

/// Collects articles without touching the archive, cache or summarizer.
pub async fn collect_only(
    config: &Config,
    source: Arc<dyn FeedSource>,
) -> (Vec<Article>, CollectReport) {
    collector(config, source).collect(&config.sources).await
}

/// Runs the full pipeline once.
///
/// Nothing here is fatal: unreadable state starts empty, failed sources are
/// skipped, failed summaries fall back, and failed writes are reported.
pub async fn run(
    config: &Config,
    source: Arc<dyn FeedSource>,
    summarizer: &dyn Summarizer,
) -> RunReport {
    let mut cache = SummaryCache::load(&config.cache_path, config.cache_ttl());
    let cache_evicted = cache.evict_expired();
    if cache_evicted > 0 {
        tracing::info!(evicted = cache_evicted, "Evicted expired summaries");
    }

    let existing = Archive::load(&config.archive_path);
    tracing::info!(existing = existing.len(), "Loaded archive");

    let (collected, collect) = collector(config, source).collect(&config.sources).await;

    let merger = IncrementalArchive::new(config.archive_cap, config.summarize_delay());
    let (archive, merge) = merger
        .merge(existing, collected, summarizer, &mut cache)
        .await;

    let mut persist_failures = Vec::new();
    let archive_targets = std::iter::once(&config.archive_path).chain(&config.mirror_paths);
    for path in archive_targets {
        if let Err(e) = archive.save(path) {
            tracing::error!(path = %path.display(), error = %e, "Failed to write archive");
            persist_failures.push(PersistFailure {
                path: path.clone(),
                error: e.to_string(),
            });
        }
    }
    if let Err(e) = cache.save(&config.cache_path) {
        tracing::error!(path = %config.cache_path.display(), error = %e, "Failed to write summary cache");
        persist_failures.push(PersistFailure {
            path: config.cache_path.clone(),
            error: e.to_string(),
        });
    }

    let report = RunReport {
        collect,
        merge,
        cache_evicted,
        archive_len: archive.len(),
        persist_failures,
    };

    tracing::info!(
        sources_ok = report.collect.sources_succeeded(),
        sources_skipped = report.collect.failed.len(),
        new = report.merge.new_articles,
        carried_over = report.merge.carried_over,
        summarized = report.merge.summarized,
        summary_failures = report.merge.failed,
        archive = report.archive_len,
        persist_failures = report.persist_failures.len(),
        "Run complete"
    );

    report
}
