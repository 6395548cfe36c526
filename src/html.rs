//! Regex-only HTML primitives.
//!
//! No DOM is built here or anywhere downstream of it — malformed nesting is
//! tolerated, not validated. Pages that under-extract through this path are
//! expected to be caught by the SPA detector and retried through the browser
//! renderer instead.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;

pub(crate) static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());

/// Replaces the five named entities and `&nbsp;` with their literals in one
/// pass. No further decoding is attempted, so an entity produced by decoding
/// another entity is left alone.
pub fn decode_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }
    let replaced = input
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    Cow::Owned(replaced)
}

/// Replaces any `<...>` with a single space, collapses whitespace runs, and
/// trims the result.
pub fn strip_tags(input: &str) -> String {
    let without_tags = TAG_RE.replace_all(input, " ");
    without_tags.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Scans an attribute-list string for quoted `name="value"` / `name='value'`
/// pairs, returning a mapping with lowercased keys. Unquoted values are not
/// recognized.
pub fn parse_attributes(input: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    for caps in ATTR_RE.captures_iter(input) {
        let key = caps[1].to_ascii_lowercase();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        attrs.insert(key, value.to_string());
    }
    attrs
}

/// Normalizes whitespace, returning the original borrow when no allocation
/// is needed.
pub fn normalize_whitespace(input: &str) -> Cow<'_, str> {
    let needs_normalization =
        input.chars().any(|c| c.is_whitespace() && c != ' ') || input.contains("  ");

    if !needs_normalization {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(input.split_whitespace().collect::<Vec<_>>().join(" "))
    }
}

/// Strips tags, decodes entities exactly once, and normalizes whitespace, in
/// that order — the composition every field extractor in `lite.rs` uses to
/// turn a captured HTML fragment into display text.
pub fn clean_fragment(fragment: &str) -> String {
    let stripped = strip_tags(fragment);
    let decoded = decode_entities(&stripped);
    normalize_whitespace(&decoded).into_owned()
}

/// Truncates `s` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_entities_single_pass() {
        assert_eq!(decode_entities("a &amp;amp; b"), "a &amp; b");
        assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
    }

    #[test]
    fn decode_entities_borrows_when_no_entities() {
        assert!(matches!(decode_entities("plain text"), Cow::Borrowed(_)));
    }

    #[test]
    fn strip_tags_collapses_whitespace() {
        assert_eq!(strip_tags("<p>Hello   <b>world</b>!</p>"), "Hello world !");
    }

    #[test]
    fn parse_attributes_lowercases_keys_quoted_only() {
        let attrs = parse_attributes(r#"Name="Widget" ID='x1' data-x=unquoted"#);
        assert_eq!(attrs.get("name").unwrap(), "Widget");
        assert_eq!(attrs.get("id").unwrap(), "x1");
        assert!(!attrs.contains_key("data-x"));
    }

    #[test]
    fn truncate_chars_respects_char_boundaries() {
        let s = "héllo wörld";
        let truncated = truncate_chars(s, 5);
        assert_eq!(truncated.chars().count(), 5);
    }
}
