//! Text helpers shared by the extraction heuristics.
//!
//! All slicing goes through the char-boundary helpers here; markup is
//! arbitrary UTF-8 and byte windows must never split a code point.

use once_cell::sync::Lazy;
use regex::Regex;

pub(crate) static TAG_RE: Lazy<Regex> = Lazy::new(|| build_regex(r"(?s)<[^>]*>"));

static SCRIPT_STYLE_RE: Lazy<Regex> =
    Lazy::new(|| build_regex(r"(?is)<script\b.*?</script>|<style\b.*?</style>"));

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| build_regex(r"\s+"));

/// "Sponsored" in the languages the search front-end is commonly served in.
pub(crate) static SPONSORED_MARKER: Lazy<Regex> = Lazy::new(|| {
    build_regex(r"(?i)sponsored|gesponsert|patrocinado|sponsoris[ée]|sponsorizzato|gesponsord")
});

/// Ad-serving link evidence: click-tracking hosts and text-ad attributes.
pub(crate) static AD_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    build_regex(r#"(?i)googleadservices\.com|/aclk\?|data-rw="|data-pcu="|data-text-ad"#)
});

pub(crate) static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    build_regex(
        r#"(?is)<h[1-6]\b[^>]*>(.*?)</h[1-6]>|<(?:div|span|a)\b[^>]*role="heading"[^>]*>(.*?)</(?:div|span|a)>"#,
    )
});

pub(crate) static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    build_regex(r"(?:\+?1[\s.-]?)?\(?\b\d{3}\)?[\s.-]\d{3}[\s.-]\d{4}\b")
});

pub(crate) const MIN_TITLE_CHARS: usize = 3;
pub(crate) const MAX_TITLE_CHARS: usize = 200;

/// Largest char boundary `<= index`.
pub fn floor_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Smallest char boundary `>= index`.
pub fn ceil_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// At most `max_bytes` of `text`, cut on a char boundary.
pub fn clip(text: &str, max_bytes: usize) -> &str {
    &text[..floor_boundary(text, max_bytes)]
}

/// `text[start..end]` widened or narrowed to char boundaries.
pub fn window(text: &str, start: usize, end: usize) -> &str {
    let start = floor_boundary(text, start);
    let end = ceil_boundary(text, end.max(start));
    &text[start..end]
}

/// Collapse runs of whitespace and trim.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}

/// Visible text of a markup fragment with entities decoded.
pub fn strip_tags(fragment: &str) -> String {
    let without_code = SCRIPT_STYLE_RE.replace_all(fragment, " ");
    let without_tags = TAG_RE.replace_all(&without_code, " ");
    let decoded = html_escape::decode_html_entities(&without_tags);
    collapse_whitespace(&decoded)
}

/// Lower-cased alphanumerics separated by single spaces; used as a
/// deduplication key.
pub fn normalize_key(text: &str) -> String {
    text.chars()
        .map(|ch| {
            if ch.is_alphanumeric() {
                ch.to_lowercase().next().unwrap_or(ch)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn plausible_title(text: &str) -> bool {
    let len = text.chars().count();
    (MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&len) && text.chars().any(char::is_alphabetic)
}

/// Cleaned text of every heading-like element, in document order.
pub fn headings(fragment: &str) -> impl Iterator<Item = (usize, String)> + '_ {
    HEADING_RE.captures_iter(fragment).filter_map(|caps| {
        let whole = caps.get(0)?;
        let inner = caps.get(1).or_else(|| caps.get(2))?;
        let text = strip_tags(inner.as_str());
        plausible_title(&text).then_some((whole.start(), text))
    })
}

/// First heading-like element (`<hN>` or `role="heading"`).
pub fn first_heading(fragment: &str) -> Option<String> {
    headings(fragment).next().map(|(_, text)| text)
}

/// Last heading-like element.
pub fn last_heading(fragment: &str) -> Option<String> {
    headings(fragment).last().map(|(_, text)| text)
}

pub fn find_phone(fragment: &str) -> Option<String> {
    let text = strip_tags(fragment);
    PHONE_RE.find(&text).map(|m| m.as_str().trim().to_string())
}

pub(crate) fn build_regex(pattern: &str) -> Regex {
    Regex::new(pattern)
        .unwrap_or_else(|err| panic!("invalid extraction regex `{}`: {}", pattern, err))
}
