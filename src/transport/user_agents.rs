//! Desktop browser identities for outbound page requests.
//!
//! A fixed pool of current desktop user agents; one is drawn at random per
//! call and paired with the navigation headers a real browser would send.

use rand::seq::SliceRandom;
use rand::thread_rng;

pub const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.2420.81",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

const ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Random entry of [`DESKTOP_USER_AGENTS`].
pub fn random_desktop_user_agent() -> &'static str {
    DESKTOP_USER_AGENTS
        .choose(&mut thread_rng())
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

/// `Accept-Language` value for a language/region pair, e.g. `en-US,en;q=0.9`.
pub fn accept_language(language: &str, region: &str) -> String {
    let language = language.trim().to_ascii_lowercase();
    let region = region.trim().to_ascii_uppercase();
    if language.is_empty() {
        return "en-US,en;q=0.9".into();
    }
    if region.is_empty() {
        return format!("{language};q=0.9");
    }
    format!("{language}-{region},{language};q=0.9")
}

/// Browser-like navigation headers in the order browsers send them.
/// `Host` is written by the request builder.
pub fn navigation_headers(user_agent: &str, accept_language: &str) -> Vec<(String, String)> {
    [
        ("User-Agent", user_agent),
        ("Accept", ACCEPT),
        ("Accept-Language", accept_language),
        ("Accept-Encoding", "identity"),
        ("Upgrade-Insecure-Requests", "1"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-User", "?1"),
        ("Connection", "close"),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}
