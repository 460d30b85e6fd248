//! # adscraper-rs
//!
//! Ad-intelligence retrieval through rotating residential proxies.
//!
//! Search result pages and the ad-transparency archive are fetched over a
//! hand-driven CONNECT → TLS → HTTP/1.1 tunnel with a fresh proxy session per
//! call, screened for block and CAPTCHA pages, and mined for search,
//! shopping, and local-pack ads with best-effort heuristics. A companion
//! keyword module fans a seed term out over an autocomplete endpoint and
//! scores the results.
//!
//! ## Example
//!
//! ```no_run
//! use adscraper_rs::{AdScraper, ProxyConfig, ProxyProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let proxy = ProxyConfig::new(ProxyProvider::BrightData, "brd.superproxy.io", 22225, "user", "pass")
//!         .with_country("us");
//!     let scraper = AdScraper::builder().with_proxy(proxy).build()?;
//!     for result in scraper.scrape_many(["fiber internet", "cable internet"]).await {
//!         println!("{}", serde_json::to_string_pretty(&result.report())?);
//!     }
//!     Ok(())
//! }
//! ```

mod adscraper;

pub mod detectors;
pub mod extract;
pub mod keywords;
pub mod modules;
pub mod transport;

pub use crate::adscraper::{
    AdScraper,
    AdScraperBuilder,
    AdScraperConfig,
    AdScraperError,
    AdScraperResult,
    ErrorCode,
    ProxyCheck,
    ScrapeReport,
    ScrapeResult,
    ScrapeStatus,
    TransparencyResult,
};

pub use crate::detectors::{Classification, ClassifiedResponse, ResponseClassifier};

pub use crate::extract::{
    AdRecord,
    ExtractedPage,
    HeuristicExtractor,
    LocalAd,
    PageExtractor,
    Placement,
    SearchAd,
    ShoppingAd,
};

pub use crate::keywords::{
    AutocompleteExpander,
    DifficultyLabel,
    ExpanderConfig,
    HttpSuggestionClient,
    Intent,
    KeywordCandidate,
    KeywordMetricsEstimator,
    ScoredKeyword,
    SuggestError,
    SuggestionSource,
    score_all,
};

pub use crate::modules::{
    DelayConfig,
    EventDispatcher,
    EventHandler,
    FormattedCredentials,
    LoggingHandler,
    PolitenessDelay,
    ProxyConfig,
    ProxyProvider,
    ScrapeEvent,
};

pub use crate::transport::{
    PageFetcher,
    TunnelClient,
    TunnelError,
    TunnelResponse,
    TunnelStage,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
