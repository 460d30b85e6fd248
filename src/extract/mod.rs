//! Best-effort extraction of ads and auxiliary signals from result pages.
//!
//! Regex/window heuristics over raw markup, with no DOM. Callers go through
//! [`PageExtractor`], so a stricter parser can replace [`HeuristicExtractor`]
//! without touching them. Extraction never fails: a missing signal is an
//! empty list.

pub mod local;
pub mod related;
pub mod search;
pub mod shopping;
pub mod text;
pub mod transparency;
pub mod types;

pub use transparency::{TransparencyFindings, extract_transparency};
pub use types::{AdRecord, ExtractedPage, LocalAd, Placement, SearchAd, ShoppingAd};

/// Turns page markup into an [`ExtractedPage`].
pub trait PageExtractor: Send + Sync {
    fn extract(&self, html: &str) -> ExtractedPage;
}

/// Default regex/window heuristics.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicExtractor;

impl PageExtractor for HeuristicExtractor {
    fn extract(&self, html: &str) -> ExtractedPage {
        extract(html)
    }
}

pub fn extract(html: &str) -> ExtractedPage {
    let search_ads = search::extract_search_ads(html);
    let (local_ads, local_results) = local::extract_local(html, &search_ads);
    let page = ExtractedPage {
        search_ads,
        shopping_ads: shopping::extract_shopping_ads(html),
        local_ads,
        local_results,
        related_searches: related::extract_related_searches(html),
        organic_count: related::estimate_organic_count(html),
    };
    log::debug!(
        "extracted {} search / {} shopping / {} local ads, {} related, ~{} organic",
        page.search_ads.len(),
        page.shopping_ads.len(),
        page.local_ads.len(),
        page.related_searches.len(),
        page.organic_count
    );
    page
}
