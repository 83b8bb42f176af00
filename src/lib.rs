//! Incremental news digest.
//!
//! Collects RSS feeds whose charsets are often missing or wrong, cleans them
//! into [`types::Article`]s, and folds them into a capped, summarized
//! [`archive::Archive`] without ever summarizing the same link twice.

pub mod archive;
pub mod config;
pub mod feed;
pub mod pipeline;
pub mod summary;
pub mod types;
pub mod util;
