//! Shopping (product listing) ads.
//!
//! Only runs when the page shows a shopping layout, or when prices and
//! product vocabulary co-occur. Each price anchors a window that is searched
//! for the nearest title before it and a merchant/image around it.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::text::{
    SPONSORED_MARKER, build_regex, collapse_whitespace, last_heading, normalize_key,
    plausible_title, window,
};
use super::types::{Placement, ShoppingAd};

pub const MAX_SHOPPING_ADS: usize = 20;
/// Bytes before a price searched for its title and image.
pub const TITLE_WINDOW: usize = 600;
/// Bytes after a price searched for the merchant.
pub const MERCHANT_WINDOW: usize = 300;

static SHOPPING_MARKERS_RE: Lazy<Regex> = Lazy::new(|| {
    build_regex(r"(?i)commercial-unit|pla-unit|pla-hovercard|shopping-ads|data-shopping|cu-container|sh-np__")
});

pub(crate) static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| build_regex(r"[$€£¥₹]\s?\d{1,3}(?:[,.]\d{3})*(?:[.,]\d{1,2})?"));

static PRODUCT_TOKENS_RE: Lazy<Regex> = Lazy::new(|| {
    build_regex(
        r"(?i)\b(?:in stock|free shipping|free delivery|add to cart|buy now|on sale|shop now|deals?|price|sale)\b",
    )
});

static TITLE_ATTR_RE: Lazy<Regex> =
    Lazy::new(|| build_regex(r#"(?i)(?:aria-label|title|alt)="([^"]{8,150})""#));

static TEXT_NODE_RE: Lazy<Regex> = Lazy::new(|| build_regex(r">([^<>]{2,150})<"));

static IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| build_regex(r#"(?i)<img\b[^>]*\bsrc="(https?://[^"]+)""#));

pub fn has_shopping_layout(html: &str) -> bool {
    SHOPPING_MARKERS_RE.is_match(html)
        || (PRICE_RE.is_match(html) && PRODUCT_TOKENS_RE.is_match(html))
}

pub fn extract_shopping_ads(html: &str) -> Vec<ShoppingAd> {
    if !has_shopping_layout(html) {
        return Vec::new();
    }

    let mut ads: Vec<ShoppingAd> = Vec::new();
    let mut seen = HashSet::new();

    for price in PRICE_RE.find_iter(html) {
        if ads.len() >= MAX_SHOPPING_ADS {
            break;
        }
        let before = window(html, price.start().saturating_sub(TITLE_WINDOW), price.start());
        let after = window(html, price.end(), price.end() + MERCHANT_WINDOW);

        let Some(title) = nearest_title(before) else {
            continue;
        };
        if !seen.insert(normalize_key(&title)) {
            continue;
        }

        ads.push(ShoppingAd {
            position: ads.len() + 1,
            placement: Placement::Shopping,
            merchant: merchant(after, &title),
            image: IMAGE_RE
                .captures_iter(before)
                .last()
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string()),
            price: collapse_whitespace(price.as_str()),
            title,
        });
    }

    ads
}

/// Closest plausible product title preceding a price.
fn nearest_title(before: &str) -> Option<String> {
    if let Some(title) = last_heading(before).filter(|title| usable_title(title)) {
        return Some(title);
    }
    if let Some(title) = TITLE_ATTR_RE
        .captures_iter(before)
        .filter_map(|caps| caps.get(1))
        .map(|m| clean(m.as_str()))
        .filter(|title| usable_title(title))
        .last()
    {
        return Some(title);
    }
    TEXT_NODE_RE
        .captures_iter(before)
        .filter_map(|caps| caps.get(1))
        .map(|m| clean(m.as_str()))
        .filter(|text| text.chars().count() >= 8 && usable_title(text))
        .last()
}

fn merchant(after: &str, title: &str) -> Option<String> {
    let title_key = normalize_key(title);
    TEXT_NODE_RE
        .captures_iter(after)
        .filter_map(|caps| caps.get(1))
        .map(|m| clean(m.as_str()))
        .find(|text| {
            let len = text.chars().count();
            (2..=40).contains(&len)
                && text.chars().next().is_some_and(char::is_uppercase)
                && !PRICE_RE.is_match(text)
                && !PRODUCT_TOKENS_RE.is_match(text)
                && !text.chars().any(|ch| ch.is_ascii_digit())
                && normalize_key(text) != title_key
        })
}

fn usable_title(text: &str) -> bool {
    plausible_title(text) && !PRICE_RE.is_match(text) && !SPONSORED_MARKER.is_match(text)
}

fn clean(raw: &str) -> String {
    collapse_whitespace(&html_escape::decode_html_entities(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(title: &str, price: &str, merchant: &str) -> String {
        format!(
            r#"<div class="pla-unit"><img src="https://encrypted-tbn0.gstatic.com/shopping?q={merchant}">
            <div role="heading"><span>{title}</span></div>
            <span class="e10twf">{price}</span><span class="LbUacb">{merchant}</span>
            <span>Free shipping</span></div>"#
        )
    }

    #[test]
    fn extracts_products_from_pla_units() {
        let html = format!(
            "<div class=\"commercial-unit\">{}{}{}</div>",
            product("TP-Link Archer AX55 Router", "$89.99", "Best Buy"),
            product("Netgear Nighthawk RAX50", "$179.00", "Walmart"),
            product("TP-Link Archer AX55 Router", "$92.50", "Target"),
        );
        let ads = extract_shopping_ads(&html);
        assert_eq!(ads.len(), 2);
        assert_eq!(ads[0].title, "TP-Link Archer AX55 Router");
        assert_eq!(ads[0].price, "$89.99");
        assert_eq!(ads[0].merchant.as_deref(), Some("Best Buy"));
        assert!(ads[0].image.as_deref().unwrap().contains("Best Buy"));
        assert_eq!(ads[1].title, "Netgear Nighthawk RAX50");
        assert_eq!(ads[1].position, 2);
        assert!(ads.iter().all(|ad| ad.placement == Placement::Shopping));
    }

    #[test]
    fn prices_without_product_context_do_not_trigger() {
        let html = "<p>The company reported revenue of $4,200,000 last year.</p>";
        assert!(!has_shopping_layout(html));
        assert!(extract_shopping_ads(html).is_empty());
    }

    #[test]
    fn currency_and_product_tokens_trigger_without_markers() {
        let html = r#"<div><h4>Mesh WiFi System 3-Pack</h4><b>€149,99</b><span>Amazon</span> in stock</div>"#;
        let ads = extract_shopping_ads(html);
        assert_eq!(ads.len(), 1);
        assert_eq!(ads[0].price, "€149,99");
        assert_eq!(ads[0].merchant.as_deref(), Some("Amazon"));
    }
}
