use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

use super::encoding;
use super::fetcher::{FeedSource, FetchError};
use super::parser::{self, RawItem};
use crate::types::{parse_published, Article, Language};

// ============================================================================
// Source configuration
// ============================================================================

/// One configured feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceConfig {
    /// Name used in logs and reports.
    pub name: String,
    pub url: String,
    /// Display name stored on articles. Defaults to `name`.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub language: Language,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>, language: Language) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            source: None,
            language,
        }
    }

    pub fn display_name(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.name)
    }
}

// ============================================================================
// Report
// ============================================================================

/// A source that was skipped this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub name: String,
    pub error: String,
}

/// Per-run collection statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectReport {
    pub sources_total: usize,
    pub failed: Vec<SourceFailure>,
    /// Items extracted across all successful sources, before dedup.
    pub items_parsed: usize,
    /// Items dropped because an earlier item had the same link.
    pub duplicates: usize,
    /// Items dropped by the collect limit after sorting.
    pub dropped_by_limit: usize,
}

impl CollectReport {
    pub fn sources_succeeded(&self) -> usize {
        self.sources_total - self.failed.len()
    }
}

// ============================================================================
// Collector
// ============================================================================

/// Pulls every configured source and produces one deduplicated, newest-first
/// article list.
///
/// Sources are fetched concurrently, up to `max_concurrent` at a time. Each
/// source fills its own result slot; slots are merged in configuration order
/// once all fetches finish, so "first seen" always means "listed earlier".
pub struct Collector {
    source: Arc<dyn FeedSource>,
    max_concurrent: usize,
    limit: Option<usize>,
}

impl Collector {
    pub fn new(source: Arc<dyn FeedSource>, max_concurrent: usize) -> Self {
        Self {
            source,
            max_concurrent: max_concurrent.max(1),
            limit: None,
        }
    }

    /// Keeps at most `limit` articles after sorting. `None` keeps everything.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub async fn collect(&self, sources: &[SourceConfig]) -> (Vec<Article>, CollectReport) {
        self.collect_at(sources, Utc::now()).await
    }

    /// Like [`collect`](Self::collect), with `now` standing in for the
    /// publication time of items that carry no parseable date.
    pub async fn collect_at(
        &self,
        sources: &[SourceConfig],
        now: DateTime<Utc>,
    ) -> (Vec<Article>, CollectReport) {
        let mut slots: Vec<(usize, Result<Vec<Article>, FetchError>)> =
            stream::iter(sources.iter().enumerate())
                .map(|(index, config)| async move { (index, self.collect_one(config, now).await) })
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;
        slots.sort_by_key(|(index, _)| *index);

        let mut report = CollectReport {
            sources_total: sources.len(),
            ..CollectReport::default()
        };
        let mut seen = HashSet::new();
        let mut articles = Vec::new();

        for (index, outcome) in slots {
            let config = &sources[index];
            match outcome {
                Ok(items) => {
                    report.items_parsed += items.len();
                    for article in items {
                        if seen.insert(article.link.clone()) {
                            articles.push(article);
                        } else {
                            report.duplicates += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(source = %config.name, url = %config.url, error = %e, "Skipping source");
                    report.failed.push(SourceFailure {
                        name: config.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        // Stable: equal timestamps keep first-seen order.
        articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        if let Some(limit) = self.limit {
            if articles.len() > limit {
                report.dropped_by_limit = articles.len() - limit;
                articles.truncate(limit);
            }
        }

        tracing::info!(
            sources = report.sources_total,
            failed = report.failed.len(),
            parsed = report.items_parsed,
            duplicates = report.duplicates,
            kept = articles.len(),
            "Collection finished"
        );

        (articles, report)
    }

    async fn collect_one(
        &self,
        config: &SourceConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<Article>, FetchError> {
        let fetched = self.source.fetch(&config.url, config.language).await?;

        let resolved = encoding::resolve(
            &fetched.bytes,
            config.language,
            fetched.content_type.as_deref(),
        );
        tracing::debug!(
            source = %config.name,
            encoding = %resolved.label,
            fallback = resolved.fallback,
            "Decoded feed"
        );

        let items = parser::parse(&resolved.text, config.language);
        if items.is_empty() {
            tracing::warn!(source = %config.name, "Feed contained no usable items");
        } else {
            tracing::debug!(source = %config.name, items = items.len(), "Parsed feed");
        }

        Ok(items
            .into_iter()
            .map(|item| build_article(item, config, now))
            .collect())
    }
}

fn build_article(item: RawItem, config: &SourceConfig, now: DateTime<Utc>) -> Article {
    let published_at = item
        .published
        .as_deref()
        .and_then(parse_published)
        .unwrap_or(now);
    Article {
        link: item.link,
        title: item.title,
        description: item.description,
        published_at,
        source: config.display_name().to_string(),
        language: config.language,
    }
}
