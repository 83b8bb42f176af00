//! Text and persistence utilities shared across the pipeline.
//!
//! - **Sanitizing**: [`clean`] turns feed markup into plain display text
//! - **Truncation**: [`truncate_chars`] cuts on character boundaries, never
//!   splitting a multi-byte code point
//! - **Persistence**: [`write_atomic`] replaces JSON stores via temp file + rename
//!
//! # Examples
//!
//! ```
//! use newsbrief::util::{clean, truncate_chars};
//!
//! let text = clean("<p>Samsung &amp; LG</p>");
//! assert_eq!(text, "Samsung & LG");
//! assert_eq!(truncate_chars(&text, 7), "Samsung");
//! ```

mod persist;
mod text;

pub use persist::{read_file, write_atomic, PersistError};
pub use text::{clean, truncate_chars};

/// Unicode replacement character, emitted by lossy decoders for invalid input.
pub const REPLACEMENT_CHAR: char = '\u{FFFD}';
