//! Local pack listings (map results).
//!
//! Runs only when map/location markers are present. The scan starts at the
//! local-pack container when one is marked, otherwise a little before the
//! first location marker. The region is cut into listings at each heading;
//! a listing needs a rating or phone number nearby to be kept. Only listings
//! whose own window carries a "sponsored" label are ads.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::text::{
    AD_LINK_RE, PHONE_RE, SPONSORED_MARKER, build_regex, clip, headings, normalize_key,
    strip_tags, window,
};
use super::types::{LocalAd, Placement, SearchAd};

pub const MAX_LOCAL_LISTINGS: usize = 20;
/// Bytes before the first location marker included in the scan when no
/// container is marked.
pub const REGION_LOOKBACK: usize = 3000;
/// Bytes after the region start that are scanned.
pub const REGION_SPAN: usize = 30_000;
/// Bytes of one listing that are inspected.
pub const LISTING_WINDOW: usize = 1500;
/// Bytes before a listing heading that still belong to it (the wrapping link).
pub const LISTING_LEAD: usize = 300;

static LOCAL_MARKERS_RE: Lazy<Regex> = Lazy::new(|| {
    build_regex(
        r#"(?i)local-pack|data-local-attribute|google\.[a-z.]+/maps|/maps/(?:place|dir)|data-cid="|>\s*Directions\s*<"#,
    )
});

static CONTAINER_RE: Lazy<Regex> =
    Lazy::new(|| build_regex(r"(?i)local-pack|data-local-attribute"));

static RATING_RE: Lazy<Regex> =
    Lazy::new(|| build_regex(r"(?:^|[\s>(])([1-5][.,]\d)(?:$|[\s<)★])"));

static REVIEWS_RE: Lazy<Regex> =
    Lazy::new(|| build_regex(r"\(\s*(\d{1,3}(?:[.,]\d{1,3})*\s*[kK]?)\s*\)"));

static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    build_regex(
        r"\b\d{1,6}\s+(?:[A-Z0-9][\w.'-]*\s+){0,4}(?:St|Street|Ave|Avenue|Rd|Road|Blvd|Boulevard|Dr|Drive|Ln|Lane|Way|Ct|Court|Pl|Place|Hwy|Highway|Pkwy|Parkway)\b\.?",
    )
});

pub fn has_local_pack(html: &str) -> bool {
    LOCAL_MARKERS_RE.is_match(html)
}

/// Byte offset where the local scan begins.
fn region_start(html: &str) -> Option<usize> {
    if let Some(container) = CONTAINER_RE.find(html) {
        let tag_open = html[..container.start()].rfind('<');
        return Some(tag_open.unwrap_or(container.start()));
    }
    LOCAL_MARKERS_RE
        .find(html)
        .map(|marker| marker.start().saturating_sub(REGION_LOOKBACK))
}

/// Returns `(sponsored, unsponsored)` listings.
///
/// Headings already taken as text-ad titles are never listings, and neither
/// is a heading wrapped in ad-serving links with no map evidence nearby.
pub fn extract_local(html: &str, search_ads: &[SearchAd]) -> (Vec<LocalAd>, Vec<LocalAd>) {
    let Some(region_start) = region_start(html) else {
        return (Vec::new(), Vec::new());
    };
    let region = window(html, region_start, region_start + REGION_SPAN);

    let starts: Vec<(usize, String)> = headings(region).collect();
    let mut sponsored = Vec::new();
    let mut organic = Vec::new();
    let mut seen: HashSet<String> = search_ads
        .iter()
        .map(|ad| normalize_key(&ad.title))
        .collect();

    for (idx, (start, title)) in starts.iter().enumerate() {
        if sponsored.len() + organic.len() >= MAX_LOCAL_LISTINGS {
            break;
        }
        let end = starts
            .get(idx + 1)
            .map(|(next, _)| *next)
            .unwrap_or(region.len());
        let listing = clip(window(region, *start, end), LISTING_WINDOW);
        let context = window(region, start.saturating_sub(LISTING_LEAD), *start + listing.len());
        if AD_LINK_RE.is_match(context) && !LOCAL_MARKERS_RE.is_match(context) {
            continue;
        }
        let text = strip_tags(listing);

        let rating = RATING_RE
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().replace(',', ".").parse::<f32>().ok());
        let phone = PHONE_RE.find(&text).map(|m| m.as_str().trim().to_string());
        if rating.is_none() && phone.is_none() {
            continue;
        }
        if !seen.insert(normalize_key(title)) {
            continue;
        }

        let is_sponsored = SPONSORED_MARKER.is_match(listing);
        let bucket: &mut Vec<LocalAd> = if is_sponsored {
            &mut sponsored
        } else {
            &mut organic
        };
        bucket.push(LocalAd {
            position: bucket.len() + 1,
            placement: Placement::LocalPack,
            title: title.clone(),
            address: ADDRESS_RE.find(&text).map(|m| m.as_str().trim().to_string()),
            phone,
            rating,
            review_count: REVIEWS_RE
                .captures(&text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| parse_count(m.as_str())),
            sponsored: is_sponsored,
        });
    }

    (sponsored, organic)
}

/// `"1,204"` → 1204, `"1.2K"` → 1200.
fn parse_count(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Some(thousands) = raw.strip_suffix(['k', 'K']) {
        let value: f32 = thousands.trim().replace(',', ".").parse().ok()?;
        return Some((value * 1000.0).round() as u32);
    }
    raw.replace([',', '.'], "").parse().ok()
}
