//! Text (search) ads.
//!
//! The page is split on every "sponsored" label. A segment only counts as an
//! ad when it carries ad-serving link evidence and a heading-like title.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::text::{
    AD_LINK_RE, SPONSORED_MARKER, build_regex, clip, collapse_whitespace, find_phone,
    first_heading, normalize_key, strip_tags,
};
use super::types::{Placement, SearchAd};

/// Segments after the first N markers are ignored.
pub const MAX_SPONSORED_SEGMENTS: usize = 15;
/// Bytes of each segment that are inspected.
pub const SEGMENT_WINDOW: usize = 5000;
/// Ads above the organic results.
pub const TOP_SLOTS: usize = 4;

const MIN_DESCRIPTION_CHARS: usize = 60;

static CITE_RE: Lazy<Regex> = Lazy::new(|| build_regex(r"(?is)<cite\b[^>]*>(.*?)</cite>"));

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    build_regex(
        r"(?i)\b(?:https?://)?((?:www\.)?[a-z0-9][a-z0-9-]*(?:\.[a-z0-9-]+)*\.[a-z]{2,24})(?:/[^\s<>]*)?",
    )
});

static TEXT_SPAN_RE: Lazy<Regex> =
    Lazy::new(|| build_regex(r"(?is)<(?:div|span|p)\b[^>]*>([^<]{40,600})<"));

const SERVING_DOMAINS: &[&str] = &["google.", "googleadservices.", "gstatic.", "doubleclick."];

pub fn extract_search_ads(html: &str) -> Vec<SearchAd> {
    let mut ads: Vec<SearchAd> = Vec::new();
    let mut seen = HashSet::new();

    for segment in SPONSORED_MARKER
        .split(html)
        .skip(1)
        .take(MAX_SPONSORED_SEGMENTS)
    {
        let segment = clip(segment, SEGMENT_WINDOW);
        if !AD_LINK_RE.is_match(segment) {
            continue;
        }
        let Some(title) = first_heading(segment) else {
            continue;
        };
        if !seen.insert(normalize_key(&title)) {
            continue;
        }

        let placement = if ads.len() < TOP_SLOTS {
            Placement::Top
        } else {
            Placement::Bottom
        };
        ads.push(SearchAd {
            position: ads.len() + 1,
            placement,
            description: description(segment, &title),
            url: display_url(segment),
            phone: find_phone(segment),
            title,
        });
    }

    ads
}

/// Bare domain shown under the ad title. `<cite>` wins when present.
fn display_url(segment: &str) -> Option<String> {
    if let Some(cite) = CITE_RE.captures(segment).and_then(|caps| caps.get(1))
        && let Some(domain) = first_advertiser_domain(&strip_tags(cite.as_str()))
    {
        return Some(domain);
    }
    first_advertiser_domain(&strip_tags(segment))
}

fn first_advertiser_domain(text: &str) -> Option<String> {
    DOMAIN_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
        .find(|domain| {
            let bare = domain.trim_start_matches("www.");
            !SERVING_DOMAINS.iter().any(|serving| bare.starts_with(serving))
        })
}

fn description(segment: &str, title: &str) -> Option<String> {
    let title_key = normalize_key(title);
    TEXT_SPAN_RE
        .captures_iter(segment)
        .filter_map(|caps| caps.get(1))
        .map(|m| collapse_whitespace(&html_escape::decode_html_entities(m.as_str())))
        .find(|text| {
            text.chars().count() >= MIN_DESCRIPTION_CHARS && normalize_key(text) != title_key
        })
}
