//! Ad-transparency archive pages.
//!
//! The archive is mostly rendered client-side; whatever advertiser names
//! and creative references are present in the served markup or its inline
//! JSON are collected. A JS-only shell simply yields nothing.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::text::{build_regex, collapse_whitespace};

pub const MAX_ADVERTISERS: usize = 50;

static ADVERTISER_RE: Lazy<Regex> = Lazy::new(|| {
    build_regex(
        r#"(?i)"advertiser_?name"\s*:\s*"([^"]{2,120})"|class="[^"]*advertiser-name[^"]*"[^>]*>\s*([^<]{2,120})<"#,
    )
});

static CREATIVE_RE: Lazy<Regex> = Lazy::new(|| {
    build_regex(r#"(?i)<creative-preview\b|"creative_?id"\s*:|data-creative-id=""#)
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransparencyFindings {
    pub advertisers: Vec<String>,
    pub creative_count: usize,
}

pub fn extract_transparency(html: &str) -> TransparencyFindings {
    let mut advertisers = Vec::new();
    let mut seen = HashSet::new();
    for caps in ADVERTISER_RE.captures_iter(html) {
        if advertisers.len() >= MAX_ADVERTISERS {
            break;
        }
        let Some(raw) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let name = collapse_whitespace(&html_escape::decode_html_entities(raw.as_str()));
        if !name.is_empty() && seen.insert(name.to_lowercase()) {
            advertisers.push(name);
        }
    }

    TransparencyFindings {
        advertisers,
        creative_count: CREATIVE_RE.find_iter(html).count(),
    }
}
