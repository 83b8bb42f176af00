//! The persisted, summarized article archive and its incremental merge.
//!
//! Each run adds newly collected articles to the archive from the previous
//! run. Articles already archived are carried over untouched; only unseen
//! links reach the summarizer, and then only when the [`SummaryCache`] has no
//! fresh payload for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::summary::{SummaryCache, Summarizer};
use crate::types::{parse_published, Article, ArchivedArticle, SummaryPayload};
use crate::util::{read_file, truncate_chars, write_atomic, PersistError};

/// Characters of description used as the fallback summary.
const FALLBACK_SUMMARY_CHARS: usize = 200;

// ============================================================================
// Archive
// ============================================================================

/// Summarized articles, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Archive {
    pub generated_at: DateTime<Utc>,
    pub articles: Vec<ArchivedArticle>,
}

/// On-disk shape, read loosely: a bad header field must not cost the
/// articles.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredArchive {
    #[serde(default)]
    generated_at: Value,
    #[serde(default)]
    articles: Value,
}

impl Archive {
    /// Loads the archive, starting from an empty one if the file is missing
    /// or unreadable.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(archive) => archive,
            Err(e) if e.is_not_found() => {
                tracing::info!(path = %path.display(), "No archive yet, starting empty");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Archive unusable, starting empty");
                Self::default()
            }
        }
    }

    /// Loads the archive, failing only if the file cannot be read or is not
    /// a JSON object.
    ///
    /// An unparseable `generatedAt` reads as the epoch and a missing or
    /// non-array `articles` as no articles. Entries are cleaned up on the way
    /// in:
    /// - entries that do not deserialize are skipped
    /// - entries carrying U+FFFD in any text field are dropped
    /// - repeated links keep their first occurrence
    pub fn try_load(path: &Path) -> Result<Self, PersistError> {
        let bytes = read_file(path)?;
        let stored: StoredArchive =
            serde_json::from_slice(&bytes).map_err(|e| PersistError::json(path, e))?;

        let generated_at = stored
            .generated_at
            .as_str()
            .and_then(parse_published)
            .unwrap_or_default();
        let entries = match stored.articles {
            Value::Array(entries) => entries,
            Value::Null => Vec::new(),
            _ => {
                tracing::warn!(path = %path.display(), "Archive articles is not a list, ignoring");
                Vec::new()
            }
        };

        let total = entries.len();
        let mut malformed = 0usize;
        let mut corrupted = 0usize;
        let mut duplicates = 0usize;
        let mut seen = HashSet::new();
        let mut articles = Vec::with_capacity(total);

        for value in entries {
            let record: ArchivedArticle = match serde_json::from_value(value) {
                Ok(record) => record,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed archive entry");
                    malformed += 1;
                    continue;
                }
            };
            if record.is_corrupted() {
                corrupted += 1;
                continue;
            }
            if !seen.insert(record.article.link.clone()) {
                duplicates += 1;
                continue;
            }
            articles.push(record);
        }

        if malformed + corrupted + duplicates > 0 {
            tracing::warn!(
                path = %path.display(),
                malformed = malformed,
                corrupted = corrupted,
                duplicates = duplicates,
                "Dropped archive entries on load"
            );
        }
        tracing::debug!(path = %path.display(), total = total, kept = articles.len(), "Loaded archive");

        Ok(Self {
            generated_at,
            articles,
        })
    }

    /// Writes the archive as pretty-printed UTF-8 JSON (no BOM), replacing
    /// the file atomically.
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| PersistError::json(path, e))?;
        write_atomic(path, &json)
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

// ============================================================================
// Merge
// ============================================================================

/// Counters for one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Collected articles whose link was not yet archived.
    pub new_articles: usize,
    /// Archived articles kept as they were (before the cap).
    pub carried_over: usize,
    /// New articles whose payload came from the cache.
    pub cache_hits: usize,
    /// Successful summarizer calls.
    pub summarized: usize,
    /// Failed summarizer calls; each such article got the fallback payload.
    pub failed: usize,
    /// Articles cut by the archive cap.
    pub dropped_by_cap: usize,
}

/// Merges collected articles into an existing archive.
#[derive(Debug, Clone)]
pub struct IncrementalArchive {
    cap: usize,
    delay: Duration,
}

impl IncrementalArchive {
    /// `cap` bounds the archive length; `delay` is the pause between
    /// consecutive summarizer calls.
    pub fn new(cap: usize, delay: Duration) -> Self {
        Self { cap, delay }
    }

    pub async fn merge(
        &self,
        existing: Archive,
        collected: Vec<Article>,
        summarizer: &dyn Summarizer,
        cache: &mut SummaryCache,
    ) -> (Archive, MergeStats) {
        self.merge_at(existing, collected, summarizer, cache, Utc::now())
            .await
    }

    /// Like [`merge`](Self::merge) with an explicit clock, used for cache
    /// freshness, cache timestamps and `generated_at`.
    pub async fn merge_at(
        &self,
        existing: Archive,
        collected: Vec<Article>,
        summarizer: &dyn Summarizer,
        cache: &mut SummaryCache,
        now: DateTime<Utc>,
    ) -> (Archive, MergeStats) {
        let mut stats = MergeStats::default();
        let mut seen = HashSet::new();
        let mut merged = Vec::with_capacity(existing.articles.len() + collected.len());

        for record in existing.articles {
            if seen.insert(record.article.link.clone()) {
                merged.push(record);
            }
        }
        stats.carried_over = merged.len();

        let mut calls = 0usize;
        for article in collected {
            if !seen.insert(article.link.clone()) {
                continue;
            }
            stats.new_articles += 1;

            if let Some(payload) = cache.get_at(&article.link, now) {
                tracing::debug!(link = %article.link, "Summary cache hit");
                stats.cache_hits += 1;
                let payload = payload.clone().with_point_cap();
                merged.push(ArchivedArticle { article, payload });
                continue;
            }

            if calls > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            calls += 1;

            let payload = match summarizer.summarize(&article).await {
                Ok(payload) => {
                    let payload = payload.with_point_cap();
                    stats.summarized += 1;
                    cache.put_at(article.link.clone(), payload.clone(), now);
                    payload
                }
                Err(e) => {
                    tracing::warn!(link = %article.link, title = %article.title, error = %e, "Summarization failed, using fallback");
                    stats.failed += 1;
                    fallback_payload(&article)
                }
            };
            merged.push(ArchivedArticle { article, payload });
        }

        // Stable: equal timestamps keep archived entries ahead of new ones.
        merged.sort_by(|a, b| b.article.published_at.cmp(&a.article.published_at));
        if merged.len() > self.cap {
            stats.dropped_by_cap = merged.len() - self.cap;
            merged.truncate(self.cap);
        }

        tracing::info!(
            new = stats.new_articles,
            carried_over = stats.carried_over,
            cache_hits = stats.cache_hits,
            summarized = stats.summarized,
            failed = stats.failed,
            dropped = stats.dropped_by_cap,
            "Archive merged"
        );

        (
            Archive {
                generated_at: now,
                articles: merged,
            },
            stats,
        )
    }
}

/// Payload used when the summarizer fails: the start of the description (or
/// the title when there is no description), no points, no insight.
pub fn fallback_payload(article: &Article) -> SummaryPayload {
    let summary = if article.description.is_empty() {
        article.title.clone()
    } else {
        truncate_chars(&article.description, FALLBACK_SUMMARY_CHARS).to_string()
    };
    SummaryPayload {
        summary,
        points: Vec::new(),
        insight: String::new(),
    }
}
