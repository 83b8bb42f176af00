//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use newsbrief::feed::{FeedSource, FetchError, FetchedFeed};
use newsbrief::summary::{SummarizeError, Summarizer};
use newsbrief::types::{Article, Language, SummaryPayload};

/// Serves fixed bodies by URL; unknown URLs fail like a dead host would.
#[derive(Default)]
pub struct StaticSource {
    feeds: HashMap<String, FetchedFeed>,
}

impl StaticSource {
    pub fn with_feed(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.feeds.insert(
            url.to_string(),
            FetchedFeed {
                bytes: body.into(),
                content_type: Some("application/rss+xml".to_string()),
            },
        );
        self
    }

    pub fn with_typed_feed(mut self, url: &str, body: Vec<u8>, content_type: &str) -> Self {
        self.feeds.insert(
            url.to_string(),
            FetchedFeed {
                bytes: body,
                content_type: Some(content_type.to_string()),
            },
        );
        self
    }
}

#[async_trait]
impl FeedSource for StaticSource {
    async fn fetch(&self, url: &str, _language: Language) -> Result<FetchedFeed, FetchError> {
        self.feeds
            .get(url)
            .cloned()
            .ok_or(FetchError::HttpStatus(503))
    }
}

/// Records every call; fails for the links it is told to fail.
#[derive(Default)]
pub struct ScriptedSummarizer {
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSummarizer {
    pub fn failing_for(links: &[&str]) -> Self {
        Self {
            failing: links.iter().map(|l| l.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(&self, article: &Article) -> Result<SummaryPayload, SummarizeError> {
        self.calls.lock().unwrap().push(article.link.clone());
        if self.failing.contains(&article.link) {
            return Err(SummarizeError::MalformedResponse("scripted failure".to_string()));
        }
        Ok(summary_for(&article.link))
    }
}

/// The payload [`ScriptedSummarizer`] returns for `link`.
pub fn summary_for(link: &str) -> SummaryPayload {
    SummaryPayload {
        summary: format!("summary of {link}"),
        points: vec!["first".to_string(), "second".to_string()],
        insight: "insight".to_string(),
    }
}

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, 9, 0, 0).unwrap()
}

pub fn article(link: &str, d: u32) -> Article {
    Article {
        link: link.to_string(),
        title: format!("Title for {link}"),
        description: format!("Description for {link}"),
        published_at: day(d),
        source: "Test Source".to_string(),
        language: Language::En,
    }
}

/// An RSS document with one `<item>` per `(title, link, pubDate)`.
pub fn rss(items: &[(&str, &str, &str)]) -> String {
    let body: String = items
        .iter()
        .map(|(title, link, date)| {
            format!(
                "<item><title>{title}</title><link>{link}</link><pubDate>{date}</pubDate>\
                 <description>About {title}</description></item>"
            )
        })
        .collect();
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?><rss version=\"2.0\"><channel>{body}</channel></rss>")
}
