const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

/// Named entities decoded by [`clean`]. Anything not listed stays literal.
const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("lt", "<"),
    ("gt", ">"),
    ("amp", "&"),
    ("quot", "\""),
    ("apos", "'"),
    ("nbsp", " "),
    ("copy", "©"),
    ("reg", "®"),
    ("trade", "™"),
    ("hellip", "..."),
    ("mdash", "—"),
    ("ndash", "–"),
    ("lsquo", "‘"),
    ("rsquo", "’"),
    ("ldquo", "“"),
    ("rdquo", "”"),
    ("middot", "·"),
];

/// Longest entity body we try to match after `&` (hex refs included).
const MAX_ENTITY_LEN: usize = 10;

/// Converts feed markup into plain display text.
///
/// Steps, in order: unwrap `<![CDATA[...]]>` sections, strip tags, decode
/// numeric character references, decode the named entities in
/// [`NAMED_ENTITIES`], collapse whitespace runs to a single space and trim.
///
/// Decoding can expose new markup (`&lt;b&gt;` becomes `<b>`), so the pass is
/// repeated until the text stops changing. That makes the function idempotent:
/// `clean(&clean(s)) == clean(s)`. Every pass that changes the text either
/// shortens it or turns whitespace into plain spaces, so the loop terminates.
///
/// The function is total. Malformed input (unterminated tags, invalid code
/// points, unknown entities) is passed through as literal text.
///
/// # Examples
///
/// ```
/// use newsbrief::util::clean;
///
/// assert_eq!(clean("<p>Hello &amp; <b>welcome</b></p>"), "Hello & welcome");
/// assert_eq!(clean("<![CDATA[ 속보:  AI ]]>"), "속보: AI");
/// assert_eq!(clean("It&#8217;s &#x41;"), "It’s A");
/// ```
pub fn clean(raw: &str) -> String {
    let mut current = sanitize_pass(raw);
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn sanitize_pass(input: &str) -> String {
    let unwrapped = unwrap_cdata(input);
    let stripped = strip_tags(&unwrapped);
    let decoded = decode_entities(&stripped);
    collapse_whitespace(&decoded)
}

fn unwrap_cdata(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find(CDATA_OPEN) {
        let body_start = start + CDATA_OPEN.len();
        match rest[body_start..].find(CDATA_CLOSE) {
            Some(len) => {
                out.push_str(&rest[..start]);
                out.push_str(&rest[body_start..body_start + len]);
                rest = &rest[body_start + len + CDATA_CLOSE.len()..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}

fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find('<') {
        match rest[open..].find('>') {
            Some(close) => {
                out.push_str(&rest[..open]);
                rest = &rest[open + close + 1..];
            }
            // Unterminated: nothing after this point can be a tag.
            None => break,
        }
    }
    out.push_str(rest);
    out
}

fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        match decode_entity_at(tail) {
            Some((decoded, consumed)) => {
                out.push_str(&decoded);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decodes the entity at the start of `tail` (the text just after `&`).
///
/// Returns the replacement and the number of bytes consumed from `tail`,
/// including the terminating `;`.
fn decode_entity_at(tail: &str) -> Option<(String, usize)> {
    let window_end = tail
        .char_indices()
        .nth(MAX_ENTITY_LEN + 1)
        .map_or(tail.len(), |(i, _)| i);
    let semi = tail[..window_end].find(';')?;
    let body = &tail[..semi];

    let decoded = if let Some(num) = body.strip_prefix('#') {
        decode_numeric(num)?
    } else {
        NAMED_ENTITIES
            .iter()
            .find(|(name, _)| *name == body)
            .map(|(_, value)| (*value).to_string())?
    };
    Some((decoded, semi + 1))
}

fn decode_numeric(num: &str) -> Option<String> {
    let code = match num.strip_prefix(['x', 'X']) {
        Some(hex) if !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()) => {
            u32::from_str_radix(hex, 16).ok()?
        }
        Some(_) => return None,
        None if !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()) => {
            num.parse::<u32>().ok()?
        }
        None => return None,
    };
    if code == 0 {
        return None;
    }
    char::from_u32(code).map(String::from)
}

fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for word in input.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// Returns the first `max_chars` characters of `s` (by `char`, not byte).
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_strips_tags_and_collapses_whitespace() {
        assert_eq!(
            clean("<div>\n  <p>First   line</p>\n\t<p>Second</p></div>"),
            "First line Second"
        );
    }

    #[test]
    fn test_unwraps_cdata() {
        assert_eq!(clean("<![CDATA[Breaking <b>news</b>]]>"), "Breaking news");
        assert_eq!(clean("before <![CDATA[inside]]> after"), "before inside after");
    }

    #[test]
    fn test_numeric_references() {
        assert_eq!(clean("&#8217;quoted&#8217;"), "’quoted’");
        assert_eq!(clean("&#x27;hex&#X27;"), "'hex'");
        assert_eq!(clean("&#xAC00;"), "가");
    }

    #[test]
    fn test_invalid_numeric_references_stay_literal() {
        assert_eq!(clean("&#xD800;"), "&#xD800;");
        assert_eq!(clean("&#0;"), "&#0;");
        assert_eq!(clean("&#99999999999;"), "&#99999999999;");
        assert_eq!(clean("&#x;"), "&#x;");
    }

    #[test]
    fn test_named_entities() {
        assert_eq!(
            clean("Tom &amp; Jerry&nbsp;&copy; 2024 &hellip;"),
            "Tom & Jerry © 2024 ..."
        );
        assert_eq!(clean("&unknown; stays"), "&unknown; stays");
    }

    #[test]
    fn test_escaped_markup_is_stripped() {
        // Decoding exposes a tag, which the next pass removes.
        assert_eq!(clean("&lt;b&gt;bold&lt;/b&gt; text"), "bold text");
    }

    #[test]
    fn test_double_escaped_entity_settles() {
        let once = clean("AT&amp;amp;T");
        assert_eq!(once, "AT&T");
        assert_eq!(clean(&once), once);
    }

    #[test]
    fn test_deeply_nested_escaping_fully_decoded() {
        let raw = format!("&{}lt;b&gt;bold&{}lt;/b&gt;", "amp;".repeat(40), "amp;".repeat(40));
        let once = clean(&raw);
        assert_eq!(once, "bold");
        assert_eq!(clean(&once), once);

        let amp = format!("AT&{}T", "amp;".repeat(100));
        assert_eq!(clean(&amp), "AT&T");
    }

    #[test]
    fn test_unterminated_tag_kept() {
        assert_eq!(clean("a < b"), "a < b");
        assert_eq!(clean("<![CDATA[open"), "<![CDATA[open");
    }

    #[test]
    fn test_empty_and_whitespace() {
        assert_eq!(clean(""), "");
        assert_eq!(clean(" \n\t "), "");
    }

    #[test]
    fn test_korean_text_preserved() {
        assert_eq!(clean("<p>인공지능 &middot; 반도체</p>"), "인공지능 · 반도체");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("한국어뉴스", 2), "한국");
        assert_eq!(truncate_chars("", 5), "");
    }

    proptest! {
        #[test]
        fn clean_is_idempotent(s in ".{0,200}") {
            let once = clean(&s);
            prop_assert_eq!(clean(&once), once);
        }

        #[test]
        fn clean_is_idempotent_on_markup_soup(s in "[<>&#;!\\[\\]CDATAamplgtxX0-9a-f \n]{0,80}") {
            let once = clean(&s);
            prop_assert_eq!(clean(&once), once);
        }

        #[test]
        fn clean_is_idempotent_on_nested_escapes(
            depth in 0usize..120,
            entity in "(lt|gt|amp|nbsp|#60|#x3E|quot)",
            tail in "[a-z<>&; ]{0,20}",
        ) {
            let s = format!("&{}{entity};{tail}", "amp;".repeat(depth));
            let once = clean(&s);
            prop_assert_eq!(clean(&once), once);
        }
    }
}
