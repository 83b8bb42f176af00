//! Charset resolution for feed bodies.
//!
//! Feed servers routinely omit or mis-declare their charset, and a wrong
//! guess silently corrupts every downstream string. Instead of trusting
//! metadata, [`resolve`] decodes the body with every plausible candidate and
//! scores the results.

use encoding_rs::{Encoding, EUC_KR, REPLACEMENT, UTF_8};

use crate::types::Language;
use crate::util::REPLACEMENT_CHAR;

/// Number of leading bytes scanned for an `encoding="..."` declaration.
const DECLARATION_SCAN_LEN: usize = 200;

/// Extra candidates appended for Korean sources, in priority order.
const KOREAN_CANDIDATES: &[&str] = &["euc-kr", "cp949"];

/// Labels used by Korean servers that the WHATWG label table lacks.
/// All of them name the EUC-KR superset (Unified Hangul Code).
const EUC_KR_ALIASES: &[&str] = &["cp949", "ms949", "uhc", "x-windows-949"];

/// Outcome of charset resolution.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Decoded text with any matching byte-order mark removed.
    pub text: String,
    /// Candidate label that won (lowercase, as listed in the candidate order).
    pub label: String,
    /// Encoding actually used to decode.
    pub encoding: &'static Encoding,
    /// True when no candidate could be used and the bytes were read as lossy UTF-8.
    pub fallback: bool,
}

/// A decoded candidate with its plausibility scores.
#[derive(Debug)]
struct Scored {
    label: String,
    encoding: &'static Encoding,
    text: String,
    hangul: usize,
    replacements: usize,
}

/// Decodes a feed body, choosing the most plausible charset.
///
/// Candidates, in priority order:
/// 1. `charset=` from the HTTP `Content-Type` header
/// 2. `encoding="..."` from the document's XML declaration
/// 3. `utf-8`
/// 4. for Korean sources, `euc-kr` and `cp949`
///
/// Candidates whose label is unknown are dropped. For Korean sources the
/// candidate with the most Hangul syllables wins, ties going to the one with
/// fewer replacement characters, then to the higher priority. For every other
/// language the first usable candidate wins.
///
/// # Examples
///
/// ```
/// use newsbrief::feed::resolve_encoding;
/// use newsbrief::types::Language;
///
/// let (bytes, _, _) = encoding_rs::EUC_KR.encode("<title>속보</title>");
/// let resolved = resolve_encoding(&bytes, Language::Ko, Some("text/xml; charset=utf-8"));
/// assert_eq!(resolved.label, "euc-kr");
/// assert_eq!(resolved.text, "<title>속보</title>");
/// ```
pub fn resolve(bytes: &[u8], language: Language, content_type: Option<&str>) -> Resolved {
    let candidates = candidate_labels(bytes, language, content_type);
    let mut scored: Vec<Scored> = Vec::with_capacity(candidates.len());

    for label in candidates {
        let Some(encoding) = lookup(&label) else {
            tracing::debug!(label = %label, "Skipping unsupported charset candidate");
            continue;
        };
        // Same decoder under another label: identical scores, lower priority.
        if scored.iter().any(|s| s.encoding == encoding) {
            continue;
        }
        let (text, _had_errors) = encoding.decode_with_bom_removal(bytes);
        let text = text.into_owned();
        scored.push(Scored {
            hangul: count_hangul(&text),
            replacements: count_replacements(&text),
            label,
            encoding,
            text,
        });
    }

    let chosen = match language {
        Language::Ko => pick_most_hangul(scored),
        _ => scored.into_iter().next(),
    };

    match chosen {
        Some(best) => {
            tracing::debug!(
                label = %best.label,
                encoding = best.encoding.name(),
                hangul = best.hangul,
                replacements = best.replacements,
                "Resolved feed charset"
            );
            Resolved {
                text: best.text,
                label: best.label,
                encoding: best.encoding,
                fallback: false,
            }
        }
        None => {
            tracing::warn!("No charset candidate usable, decoding as lossy UTF-8");
            let (text, _) = UTF_8.decode_with_bom_removal(bytes);
            Resolved {
                text: text.into_owned(),
                label: "utf-8".to_string(),
                encoding: UTF_8,
                fallback: true,
            }
        }
    }
}

fn pick_most_hangul(scored: Vec<Scored>) -> Option<Scored> {
    let mut best: Option<Scored> = None;
    for candidate in scored {
        let better = match &best {
            None => true,
            Some(current) => {
                candidate.hangul > current.hangul
                    || (candidate.hangul == current.hangul
                        && candidate.replacements < current.replacements)
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}

/// Builds the ordered, de-duplicated candidate list.
fn candidate_labels(bytes: &[u8], language: Language, content_type: Option<&str>) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let mut push = |label: String| {
        if !candidates.contains(&label) {
            candidates.push(label);
        }
    };

    if let Some(label) = content_type.and_then(charset_from_content_type) {
        push(label);
    }
    if let Some(label) = charset_from_declaration(bytes) {
        push(label);
    }
    push("utf-8".to_string());
    if language == Language::Ko {
        for label in KOREAN_CANDIDATES {
            push((*label).to_string());
        }
    }
    candidates
}

fn lookup(label: &str) -> Option<&'static Encoding> {
    let encoding = if EUC_KR_ALIASES.contains(&label) {
        Some(EUC_KR)
    } else {
        Encoding::for_label(label.as_bytes())
    };
    // The "replacement" encoding maps whole documents to a single U+FFFD.
    encoding.filter(|e| *e != REPLACEMENT)
}

fn normalize_label(raw: &str) -> Option<String> {
    let label = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_ascii_lowercase();
    (!label.is_empty()).then_some(label)
}

/// Extracts the `charset` parameter from a `Content-Type` header value.
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    let lower = content_type.to_ascii_lowercase();
    let start = lower.find("charset=")? + "charset=".len();
    let value = content_type[start..].split(';').next()?;
    normalize_label(value)
}

/// Finds `encoding="..."` (or single-quoted) in the first bytes of a document.
pub fn charset_from_declaration(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(DECLARATION_SCAN_LEN)];
    // Declarations are ASCII in every charset we care about.
    let head: String = head
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { ' ' })
        .collect();
    let lower = head.to_ascii_lowercase();

    let mut from = 0;
    while let Some(pos) = lower[from..].find("encoding") {
        let after = from + pos + "encoding".len();
        if let Some(label) = quoted_value_after_equals(&head[after..]) {
            return normalize_label(label);
        }
        from = after;
    }
    None
}

/// Parses `\s*=\s*("value"|'value')` at the start of `s`.
fn quoted_value_after_equals(s: &str) -> Option<&str> {
    let rest = s.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let body = &rest[1..];
    let end = body.find(quote)?;
    Some(&body[..end])
}

/// Counts precomposed Hangul syllables (U+AC00..=U+D7A3).
fn count_hangul(text: &str) -> usize {
    text.chars()
        .filter(|c| ('\u{AC00}'..='\u{D7A3}').contains(c))
        .count()
}

fn count_replacements(text: &str) -> usize {
    text.chars().filter(|c| *c == REPLACEMENT_CHAR).count()
}
