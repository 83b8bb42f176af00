use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ============================================================================
// Language
// ============================================================================

/// Language declared for a feed source.
///
/// Drives charset candidate selection (Korean feeds get `euc-kr`/`cp949`
/// candidates and Hangul scoring) and the summarizer prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ko,
    #[default]
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Ko => "ko",
            Language::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Article
// ============================================================================

/// A cleaned article collected from a feed.
///
/// `link` is the identity key: collected and archived sets never hold two
/// articles with the same link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub link: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(deserialize_with = "deserialize_published")]
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub language: Language,
}

/// Summary attached to an article, produced by a [`crate::summary::Summarizer`]
/// or by the fallback path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPayload {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub points: Vec<String>,
    #[serde(default)]
    pub insight: String,
}

impl SummaryPayload {
    /// Maximum number of key points kept per payload.
    pub const MAX_POINTS: usize = 3;

    /// Drops key points beyond [`Self::MAX_POINTS`].
    pub fn with_point_cap(mut self) -> Self {
        self.points.truncate(Self::MAX_POINTS);
        self
    }

    /// Returns true if any text field carries a decode-failure marker.
    pub fn has_replacement_char(&self) -> bool {
        let marker = crate::util::REPLACEMENT_CHAR;
        self.summary.contains(marker)
            || self.insight.contains(marker)
            || self.points.iter().any(|p| p.contains(marker))
    }
}

/// One archive record: the article and its summary, flattened into a single
/// JSON object on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedArticle {
    #[serde(flatten)]
    pub article: Article,
    #[serde(flatten)]
    pub payload: SummaryPayload,
}

impl ArchivedArticle {
    /// Returns true if any text field carries a decode-failure marker.
    ///
    /// Such records were produced from a wrong charset guess and cannot be
    /// repaired after the fact.
    pub fn is_corrupted(&self) -> bool {
        let marker = crate::util::REPLACEMENT_CHAR;
        self.article.title.contains(marker)
            || self.article.description.contains(marker)
            || self.payload.has_replacement_char()
    }
}

// ============================================================================
// Date parsing
// ============================================================================

type DateStrategy = fn(&str) -> Option<DateTime<Utc>>;

/// Date shapes seen in feeds, tried in order.
const DATE_STRATEGIES: &[DateStrategy] = &[
    parse_rfc2822,
    parse_rfc3339,
    parse_offset_datetime,
    parse_naive_datetime,
    parse_date_only,
];

fn parse_rfc2822(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn parse_offset_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

// No offset given: read as UTC.
fn parse_naive_datetime(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|d| d.and_utc())
}

fn parse_date_only(s: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

/// Parses a feed publication date, trying each known format in turn.
///
/// Returns `None` if no format matches; callers substitute collection time.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    DATE_STRATEGIES.iter().find_map(|parse| parse(trimmed))
}

/// Accepts RFC 3339 as written by this crate and the raw feed date strings
/// stored by older archive files.
fn deserialize_published<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_published(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized date: {raw}")))
}
