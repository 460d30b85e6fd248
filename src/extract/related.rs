//! Related searches and the organic-result estimate.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::text::{build_regex, collapse_whitespace};

pub const MAX_RELATED_SEARCHES: usize = 20;
pub const MIN_RELATED_CHARS: usize = 3;
pub const MAX_RELATED_CHARS: usize = 100;

static SEARCH_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    build_regex(r##"(?i)href="(?:https?://(?:www\.)?google\.[a-z.]+)?/search\?([^"#]+)"##)
});

/// Query parameters that mark vertical switches or pagination rather than
/// a related query.
const NON_RELATED_PARAMS: &[&str] = &["tbm", "start", "udm", "tbs", "lr"];

static ORGANIC_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| build_regex(r#"class="(?:g|g [^"]*|MjjYud)""#));

/// `q=` values of internal search links, decoded and de-duplicated
/// case-insensitively in discovery order.
pub fn extract_related_searches(html: &str) -> Vec<String> {
    let mut related = Vec::new();
    let mut seen = HashSet::new();

    for caps in SEARCH_LINK_RE.captures_iter(html) {
        if related.len() >= MAX_RELATED_SEARCHES {
            break;
        }
        let Some(raw_query) = caps.get(1) else {
            continue;
        };
        let query = html_escape::decode_html_entities(raw_query.as_str());
        let params: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        if params
            .iter()
            .any(|(key, _)| NON_RELATED_PARAMS.contains(&key.as_str()))
        {
            continue;
        }
        let Some(phrase) = params
            .iter()
            .find(|(key, _)| key == "q")
            .map(|(_, value)| collapse_whitespace(value))
        else {
            continue;
        };

        let len = phrase.chars().count();
        if !(MIN_RELATED_CHARS..=MAX_RELATED_CHARS).contains(&len) {
            continue;
        }
        if seen.insert(phrase.to_lowercase()) {
            related.push(phrase);
        }
    }

    related
}

/// Coarse count of organic result containers. An estimate only.
pub fn estimate_organic_count(html: &str) -> usize {
    ORGANIC_MARKER_RE.find_iter(html).count()
}
