use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

use crate::types::SummaryPayload;
use crate::util::{read_file, write_atomic, PersistError};

/// Field a cache entry's payload is stored under on disk.
///
/// Older cache files used `summary`; current ones use `data`. Entries keep
/// the field they were read with so a rewrite never changes an entry's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadField {
    Data,
    Summary,
}

impl PayloadField {
    fn key(self) -> &'static str {
        match self {
            PayloadField::Data => "data",
            PayloadField::Summary => "summary",
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: SummaryPayload,
    stored_at: DateTime<Utc>,
    field: PayloadField,
}

/// On-disk shape of one entry.
#[derive(Deserialize)]
struct StoredEntry {
    #[serde(default)]
    data: Option<StoredPayload>,
    #[serde(default)]
    summary: Option<StoredPayload>,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredPayload {
    Full(SummaryPayload),
    /// Very old entries cached only the summary text.
    Text(String),
}

impl From<StoredPayload> for SummaryPayload {
    fn from(stored: StoredPayload) -> Self {
        match stored {
            StoredPayload::Full(payload) => payload,
            StoredPayload::Text(summary) => SummaryPayload {
                summary,
                ..SummaryPayload::default()
            },
        }
    }
}

/// TTL-bounded map from article link to its summary.
///
/// Reads never evict: an expired entry is simply invisible to [`get`](Self::get)
/// until [`evict_expired`](Self::evict_expired) removes it. An entry is expired
/// once `now - stored_at >= ttl`.
#[derive(Debug, Clone)]
pub struct SummaryCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl SummaryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, link: &str) -> Option<&SummaryPayload> {
        self.get_at(link, Utc::now())
    }

    pub fn get_at(&self, link: &str, now: DateTime<Utc>) -> Option<&SummaryPayload> {
        self.entries
            .get(link)
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| &entry.payload)
    }

    pub fn put(&mut self, link: impl Into<String>, payload: SummaryPayload) {
        self.put_at(link, payload, Utc::now());
    }

    pub fn put_at(&mut self, link: impl Into<String>, payload: SummaryPayload, now: DateTime<Utc>) {
        self.entries.insert(
            link.into(),
            CacheEntry {
                payload,
                stored_at: now,
                field: PayloadField::Data,
            },
        );
    }

    /// Removes every expired entry and returns how many were removed.
    pub fn evict_expired(&mut self) -> usize {
        self.evict_expired_at(Utc::now())
    }

    pub fn evict_expired_at(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| now - entry.stored_at < ttl);
        before - self.entries.len()
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.stored_at >= self.ttl
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Loads a cache file, treating any problem as an empty cache.
    ///
    /// A missing file is the normal first-run case and is not logged above
    /// debug level; unreadable or invalid files are logged and discarded.
    pub fn load(path: &Path, ttl: Duration) -> Self {
        match Self::try_load(path, ttl) {
            Ok(cache) => cache,
            Err(e) if e.is_not_found() => {
                tracing::debug!(path = %path.display(), "No summary cache yet, starting empty");
                Self::new(ttl)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Summary cache unusable, starting empty");
                Self::new(ttl)
            }
        }
    }

    /// Loads a cache file, failing if the file is missing or not a JSON object.
    ///
    /// Individual malformed entries are skipped, not treated as errors.
    pub fn try_load(path: &Path, ttl: Duration) -> Result<Self, PersistError> {
        let bytes = read_file(path)?;
        let raw: Map<String, Value> =
            serde_json::from_slice(&bytes).map_err(|e| PersistError::json(path, e))?;

        let mut cache = Self::new(ttl);
        let mut skipped = 0usize;
        for (link, value) in raw {
            match parse_entry(value) {
                Some(entry) => {
                    cache.entries.insert(link, entry);
                }
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!(path = %path.display(), skipped = skipped, "Skipped malformed summary cache entries");
        }
        tracing::debug!(path = %path.display(), entries = cache.len(), "Loaded summary cache");
        Ok(cache)
    }

    /// Writes the cache as pretty JSON, replacing the file atomically.
    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        let mut out = Map::new();
        for (link, entry) in &self.entries {
            let payload =
                serde_json::to_value(&entry.payload).map_err(|e| PersistError::json(path, e))?;
            let mut object = Map::new();
            object.insert(entry.field.key().to_string(), payload);
            object.insert(
                "timestamp".to_string(),
                Value::String(entry.stored_at.to_rfc3339()),
            );
            out.insert(link.clone(), Value::Object(object));
        }

        let json = serde_json::to_vec_pretty(&Value::Object(out))
            .map_err(|e| PersistError::json(path, e))?;
        write_atomic(path, &json)
    }
}

/// Reads one entry, preferring `data` over the legacy `summary` field.
fn parse_entry(value: Value) -> Option<CacheEntry> {
    let stored: StoredEntry = serde_json::from_value(value).ok()?;
    let (payload, field) = match (stored.data, stored.summary) {
        (Some(data), _) => (data, PayloadField::Data),
        (None, Some(summary)) => (summary, PayloadField::Summary),
        (None, None) => return None,
    };
    Some(CacheEntry {
        payload: payload.into(),
        stored_at: stored.timestamp,
        field,
    })
}
