//! Tolerant RSS item extraction.
//!
//! Real-world feeds are frequently malformed (unescaped ampersands, truncated
//! bodies, HTML pasted into elements), so items are located by scanning for
//! `<item>` blocks and their child tags rather than by a validating XML parser.
//! A broken item or a truncated tail costs only the affected items.

use crate::types::Language;
use crate::util::{clean, truncate_chars};

/// Title used when no recovery strategy yields anything.
pub fn placeholder_title(language: Language) -> &'static str {
    match language {
        Language::Ko => "제목 없음",
        Language::En => "Untitled",
    }
}

/// Title values some feeds emit instead of leaving the element empty.
const SENTINEL_TITLES: &[&str] = &["No title", "Untitled", "제목 없음"];

const TITLE_TAGS: &[&str] = &["title", "dc:title", "media:title"];
const LINK_TAGS: &[&str] = &["link", "guid"];
const DATE_TAGS: &[&str] = &["pubDate", "dc:date", "published"];
const DESCRIPTION_TAGS: &[&str] = &["description", "content:encoded", "content"];

/// Characters of description text used as a recovered title.
const TITLE_FROM_DESCRIPTION_CHARS: usize = 100;
/// Description must be longer than this (in characters) to serve as a title.
const MIN_DESCRIPTION_FOR_TITLE: usize = 10;
/// Characters of URL slug used as a recovered title.
const TITLE_FROM_URL_CHARS: usize = 80;

/// An item extracted from a feed document.
///
/// `title`, `link` and `description` are sanitized with [`clean`];
/// `published` is the raw date text, left for the caller to interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub link: String,
    pub published: Option<String>,
    pub description: String,
}

/// Extracts every `<item>` with a resolvable link from decoded feed text.
///
/// Items without a `<link>` or `<guid>` are dropped: the link is the article's
/// identity and cannot be synthesized.
///
/// # Examples
///
/// ```
/// use newsbrief::feed::parse_items;
/// use newsbrief::types::Language;
///
/// let xml = r#"<rss><channel>
///   <item><title><![CDATA[Hello]]></title><link>https://example.com/1</link></item>
///   <item><title>No link here</title></item>
/// </channel></rss>"#;
///
/// let items = parse_items(xml, Language::En);
/// assert_eq!(items.len(), 1);
/// assert_eq!(items[0].title, "Hello");
/// ```
///
/// `language` only picks the placeholder title for items where nothing
/// better can be recovered.
pub fn parse(text: &str, language: Language) -> Vec<RawItem> {
    item_blocks(text)
        .filter_map(|block| parse_item(block, language))
        .collect()
}

fn parse_item(block: &str, language: Language) -> Option<RawItem> {
    let link = first_tag(block, LINK_TAGS).map(|l| clean(&l))?;
    if link.is_empty() {
        return None;
    }
    let description = first_tag(block, DESCRIPTION_TAGS)
        .map(|d| clean(&d))
        .unwrap_or_default();
    let title = first_tag(block, TITLE_TAGS)
        .map(|t| clean(&t))
        .unwrap_or_default();
    let title = recover_title(title, &description, &link, language);
    let published = first_tag(block, DATE_TAGS);

    Some(RawItem {
        title,
        link,
        published,
        description,
    })
}

// ============================================================================
// Title recovery
// ============================================================================

type TitleStrategy = fn(&str, &str) -> Option<String>;

/// Fallbacks for a missing title, tried in order: (description, link).
const TITLE_STRATEGIES: &[TitleStrategy] = &[title_from_description, title_from_link];

fn recover_title(title: String, description: &str, link: &str, language: Language) -> String {
    if !title.is_empty() && !SENTINEL_TITLES.contains(&title.as_str()) {
        return title;
    }
    TITLE_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(description, link))
        .unwrap_or_else(|| placeholder_title(language).to_string())
}

fn title_from_description(description: &str, _link: &str) -> Option<String> {
    if description.chars().count() <= MIN_DESCRIPTION_FOR_TITLE {
        return None;
    }
    let title = clean(truncate_chars(description, TITLE_FROM_DESCRIPTION_CHARS));
    (!title.is_empty()).then_some(title)
}

/// Derives a title from the last path segment, e.g.
/// `/news/ai-chip_shortage` becomes `ai chip shortage`.
fn title_from_link(_description: &str, link: &str) -> Option<String> {
    let url = url::Url::parse(link).ok()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment).ok()?;
    let spaced = decoded.replace(['-', '_'], " ");
    let title = clean(truncate_chars(&spaced, TITLE_FROM_URL_CHARS));
    (!title.is_empty()).then_some(title)
}

// ============================================================================
// Structural scanning
// ============================================================================

/// Iterates over the inner text of every `<item>...</item>` block.
fn item_blocks(text: &str) -> impl Iterator<Item = &str> {
    let mut from = 0;
    std::iter::from_fn(move || {
        let (_, body_start) = find_open_tag(text, "item", from)?;
        let close = find_ci(text, "</item>", body_start)?;
        from = close + "</item>".len();
        Some(&text[body_start..close])
    })
}

/// Returns the content of the first tag in `names` that has a non-empty value.
fn first_tag(block: &str, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| extract_tag(block, name))
}

/// Extracts the trimmed text content of `<name ...>...</name>`.
///
/// A `<![CDATA[...]]>` wrapper around the whole content is removed. Empty
/// content yields `None` so callers fall through to the next candidate tag.
fn extract_tag(block: &str, name: &str) -> Option<String> {
    let closing = format!("</{name}>");
    let mut from = 0;
    loop {
        let (tag_start, content_start) = find_open_tag(block, name, from)?;
        if block[tag_start..content_start].ends_with("/>") {
            // Self-closing (e.g. Atom-style <link href="..."/>): no content.
            from = content_start;
            continue;
        }
        let end = find_ci(block, &closing, content_start)?;
        let content = block[content_start..end].trim();
        let content = unwrap_cdata(content).trim();
        return (!content.is_empty()).then(|| content.to_string());
    }
}

fn unwrap_cdata(content: &str) -> &str {
    content
        .strip_prefix("<![CDATA[")
        .and_then(|inner| inner.strip_suffix("]]>"))
        .unwrap_or(content)
}

/// Finds `<name` followed by a name boundary, starting at byte `from`.
///
/// Returns the byte offset of `<` and the offset just past the closing `>`.
fn find_open_tag(text: &str, name: &str, from: usize) -> Option<(usize, usize)> {
    let needle = format!("<{name}");
    let mut search = from;
    loop {
        let start = find_ci(text, &needle, search)?;
        let after = start + needle.len();
        let boundary = text[after..].chars().next();
        match boundary {
            Some('>') | Some('/') => {}
            Some(c) if c.is_whitespace() => {}
            _ => {
                search = after;
                continue;
            }
        }
        let close = text[after..].find('>')?;
        return Some((start, after + close + 1));
    }
}

/// ASCII case-insensitive substring search. `needle` must be ASCII, so every
/// match position is a char boundary in `haystack`.
fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || from >= hay.len() {
        return None;
    }
    hay[from..]
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
        .map(|pos| from + pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(inner: &str) -> String {
        format!("<rss><channel><title>Feed</title><item>{inner}</item></channel></rss>")
    }

    #[test]
    fn test_plain_and_cdata_fields() {
        let xml = item(
            "<title><![CDATA[AI &amp; Chips]]></title>\
             <link>https://example.com/a</link>\
             <pubDate>Mon, 15 Jan 2024 09:30:00 +0900</pubDate>\
             <description><![CDATA[<p>Body <b>text</b></p>]]></description>",
        );
        let items = parse(&xml, Language::En);
        assert_eq!(
            items,
            vec![RawItem {
                title: "AI & Chips".into(),
                link: "https://example.com/a".into(),
                published: Some("Mon, 15 Jan 2024 09:30:00 +0900".into()),
                description: "Body text".into(),
            }]
        );
    }

    #[test]
    fn test_multiple_items_in_order() {
        let xml = "<rss><channel>\
            <item><title>One</title><link>https://e.com/1</link></item>\
            <item><title>Two</title><link>https://e.com/2</link></item>\
            <ITEM><title>Three</title><link>https://e.com/3</link></ITEM>\
            </channel></rss>";
        let titles: Vec<_> = parse(xml, Language::En).into_iter().map(|i| i.title).collect();
        assert_eq!(titles, vec!["One", "Two", "Three"]);
    }

    #[test]
    fn test_item_with_attributes() {
        let xml = item("<title>T</title><link>https://e.com/x</link>")
            .replace("<item>", "<item rdf:about=\"https://e.com/x\">");
        assert_eq!(parse(&xml, Language::En).len(), 1);
    }

    #[test]
    fn test_guid_fallback_for_link() {
        let xml = item("<title>T</title><guid isPermaLink=\"true\">https://e.com/g</guid>");
        assert_eq!(parse(&xml, Language::En)[0].link, "https://e.com/g");
    }

    #[test]
    fn test_self_closing_link_skipped() {
        let xml = item("<title>T</title><link href=\"https://e.com/atom\"/><guid>https://e.com/g</guid>");
        assert_eq!(parse(&xml, Language::En)[0].link, "https://e.com/g");
    }

    #[test]
    fn test_item_without_link_discarded() {
        let xml = item("<title>Orphan</title><description>No identity</description>");
        assert!(parse(&xml, Language::En).is_empty());

        let xml = item("<title>Empty</title><link>  </link>");
        assert!(parse(&xml, Language::En).is_empty());
    }

    #[test]
    fn test_description_fallbacks() {
        let xml = item("<title>T</title><link>https://e.com/1</link><content:encoded>Encoded body</content:encoded>");
        assert_eq!(parse(&xml, Language::En)[0].description, "Encoded body");

        let xml = item("<title>T</title><link>https://e.com/1</link><content type=\"html\">Generic body</content>");
        assert_eq!(parse(&xml, Language::En)[0].description, "Generic body");
    }

    #[test]
    fn test_content_tag_does_not_match_content_encoded() {
        assert_eq!(extract_tag("<content:encoded>x</content:encoded>", "content"), None);
    }

    #[test]
    fn test_date_fallbacks() {
        let xml = item("<title>T</title><link>https://e.com/1</link><dc:date>2024-01-01T00:00:00Z</dc:date>");
        assert_eq!(parse(&xml, Language::En)[0].published.as_deref(), Some("2024-01-01T00:00:00Z"));

        let xml = item("<title>T</title><link>https://e.com/1</link>");
        assert_eq!(parse(&xml, Language::En)[0].published, None);
    }

    #[test]
    fn test_alternate_title_tags() {
        let xml = item("<dc:title>Dublin Core</dc:title><link>https://e.com/1</link>");
        assert_eq!(parse(&xml, Language::En)[0].title, "Dublin Core");
    }

    #[test]
    fn test_title_recovered_from_description() {
        let long = "가".repeat(150);
        let xml = item(&format!(
            "<title></title><link>https://e.com/1</link><description>{long}</description>"
        ));
        let parsed = &parse(&xml, Language::En)[0];
        assert_eq!(parsed.title.chars().count(), 100);
        assert_eq!(parsed.description.chars().count(), 150);
    }

    #[test]
    fn test_sentinel_title_replaced() {
        let xml = item(
            "<title>No title</title><link>https://e.com/1</link>\
             <description>A description long enough to use</description>",
        );
        assert_eq!(parse(&xml, Language::En)[0].title, "A description long enough to use");
    }

    #[test]
    fn test_title_recovered_from_url_slug() {
        let xml = item(
            "<title> </title><link>https://e.com/news/%EC%86%8D%EB%B3%B4-ai_chip-shortage?id=3</link>\
             <description>short</description>",
        );
        assert_eq!(parse(&xml, Language::En)[0].title, "속보 ai chip shortage");
    }

    #[test]
    fn test_url_slug_truncated() {
        let slug = "a".repeat(120);
        let xml = item(&format!("<link>https://e.com/{slug}</link>"));
        assert_eq!(parse(&xml, Language::En)[0].title.len(), 80);
    }

    #[test]
    fn test_title_placeholder_when_nothing_recoverable() {
        let xml = item("<link>https://e.com/</link>");
        assert_eq!(parse(&xml, Language::En)[0].title, "Untitled");

        let xml = item("<link>not a url</link>");
        assert_eq!(parse(&xml, Language::En)[0].title, "Untitled");
    }

    #[test]
    fn test_placeholder_follows_source_language() {
        let xml = item("<title>No title</title><link>https://e.com/</link>");
        assert_eq!(parse(&xml, Language::Ko)[0].title, "제목 없음");
        assert_eq!(parse(&xml, Language::En)[0].title, "Untitled");
    }

    #[test]
    fn test_truncated_document_keeps_complete_items() {
        let xml = "<rss><channel>\
            <item><title>Complete</title><link>https://e.com/1</link></item>\
            <item><title>Cut off</title><link>https://e.com/2</li";
        let items = parse(xml, Language::En);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Complete");
    }

    #[test]
    fn test_channel_title_not_confused_with_items() {
        let xml = "<rss><channel><title>Channel</title><itemCount>2</itemCount></channel></rss>";
        assert!(parse(xml, Language::En).is_empty());
    }
}
