//! Article summarization: the [`Summarizer`] seam, its Ollama implementation
//! and the TTL cache that keeps repeat runs from paying for the same article.

mod cache;
mod ollama;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Article, SummaryPayload};

pub use cache::SummaryCache;
pub use ollama::{build_prompt, extract_json, OllamaSummarizer};

/// Any failure to produce a summary. Callers treat every variant the same way:
/// the article gets a fallback payload.
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Summarizer timed out after {0}s")]
    Timeout(u64),
    #[error("Malformed summarizer response: {0}")]
    MalformedResponse(String),
}

/// Produces a [`SummaryPayload`] for an article.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, article: &Article) -> Result<SummaryPayload, SummarizeError>;
}
