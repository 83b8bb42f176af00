//! Feed ingestion: fetching, charset resolution, item extraction and collection.
//!
//! # Architecture
//!
//! - [`fetcher`] - the [`FeedSource`] seam and its HTTP implementation
//! - [`encoding`] - picks the most plausible decoding of raw feed bytes
//! - [`parser`] - structural `<item>` scanning with title recovery
//! - [`collector`] - runs the above across all sources and merges the results
//!
//! # Example
//!
//! ```ignore
//! use newsbrief::feed::{Collector, HttpFeedSource};
//!
//! let collector = Collector::new(Arc::new(HttpFeedSource::new()?), 8);
//! let (articles, report) = collector.collect(&config.sources).await;
//! ```

mod collector;
mod encoding;
mod fetcher;
mod parser;

pub use collector::{CollectReport, Collector, SourceConfig, SourceFailure};
pub use encoding::{
    charset_from_content_type, charset_from_declaration, resolve as resolve_encoding, Resolved,
};
pub use fetcher::{FeedSource, FetchError, FetchedFeed, HttpFeedSource};
pub use parser::{parse as parse_items, RawItem};
