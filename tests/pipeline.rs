//! End-to-end checks of the public API with canned pages in place of the
//! proxy tunnel. The live smoke test needs real proxy credentials and is
//! ignored by default.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use adscraper_rs::{
    AdScraper, ClassifiedResponse, DelayConfig, ErrorCode, EventHandler, PageFetcher,
    ProxyConfig, ProxyProvider, ResponseClassifier, ScrapeEvent, TunnelError, TunnelResponse,
    TunnelStage, score_all,
};
use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use url::Url;

const SERP: &str = r#"<!doctype html><html><body>
<div id="tads">
  <div class="uEierd"><span>Sponsored</span>
    <a href="https://www.googleadservices.com/pagead/aclk?sa=L&ai=one"><h3>Fiber Internet Plans From $49/mo</h3></a>
    <cite>www.fastfiber.com</cite>
    <div>Symmetrical gigabit speeds, no data caps and free professional installation in your area.</div>
  </div>
  <div class="uEierd"><span>Sponsored</span>
    <a href="https://www.googleadservices.com/pagead/aclk?sa=L&ai=two"><h3>Switch To Metro Fiber Today</h3></a>
    <cite>metrofiber.net</cite>
    <span>Call (555) 201-7788</span>
  </div>
</div>
<div class="MjjYud"><div class="g"><h3>What is fiber internet?</h3></div></div>
<div class="MjjYud"><div class="g"><h3>Fiber vs cable</h3></div></div>
<div id="bres">
  <a href="/search?q=fiber+internet&amp;sa=X">fiber internet</a>
  <a href="/search?q=best+fiber+internet+providers&amp;sa=X">best fiber internet providers</a>
  <a href="/search?q=fiber+internet+near+me&amp;sa=X">fiber internet near me</a>
</div>
</body></html>"#;

struct CannedFetcher {
    outcomes: Mutex<Vec<Result<(u16, &'static str), TunnelError>>>,
}

impl CannedFetcher {
    fn new(outcomes: Vec<Result<(u16, &'static str), TunnelError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes),
        })
    }
}

#[async_trait]
impl PageFetcher for CannedFetcher {
    async fn fetch(
        &self,
        _url: &Url,
        _proxy: &ProxyConfig,
        _timeout: Duration,
    ) -> Result<ClassifiedResponse, TunnelError> {
        let (status, body) = self.outcomes.lock().unwrap().remove(0)?;
        Ok(ResponseClassifier::new().classify_response(TunnelResponse {
            status_code: status,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
            elapsed_ms: 40,
            session_id: "canned".into(),
        }))
    }
}

#[derive(Default)]
struct EventLog(Mutex<Vec<&'static str>>);

impl EventHandler for EventLog {
    fn handle(&self, event: &ScrapeEvent) {
        let name = match event {
            ScrapeEvent::PreRequest(_) => "pre",
            ScrapeEvent::PostResponse(_) => "post",
            ScrapeEvent::Blocked(_) => "blocked",
            ScrapeEvent::Error(_) => "error",
            ScrapeEvent::Delay(_) => "delay",
        };
        self.0.lock().unwrap().push(name);
    }
}

fn proxy() -> ProxyConfig {
    ProxyConfig::new(ProxyProvider::Oxylabs, "pr.oxylabs.io", 7777, "acme", "secret")
        .with_country("us")
}

#[tokio::test]
async fn batch_reports_each_keyword_independently() {
    let fetcher = CannedFetcher::new(vec![
        Ok((200, SERP)),
        Ok((429, "Too Many Requests")),
        Err(TunnelError::ProxyAuthFailed { status: 407 }),
        Ok((200, "<html><body>/sorry/index?continue=x</body></html>")),
    ]);
    let events = Arc::new(EventLog::default());
    let scraper = AdScraper::builder()
        .with_proxy(proxy())
        .with_politeness(DelayConfig::none())
        .with_fetcher(fetcher)
        .with_event_handler(events.clone())
        .build()
        .expect("scraper");

    let results = scraper
        .scrape_many(["fiber internet", "cable internet", "dsl internet", "5g home internet"])
        .await;
    assert_eq!(results.len(), 4);

    let first = &results[0];
    assert!(first.is_success());
    assert_eq!(first.total_ads(), 2);
    assert_eq!(first.page.search_ads[0].url.as_deref(), Some("www.fastfiber.com"));
    assert_eq!(first.page.search_ads[1].phone.as_deref(), Some("(555) 201-7788"));
    assert_eq!(
        first.page.related_searches,
        vec!["best fiber internet providers", "fiber internet near me"]
    );
    assert_eq!(first.page.organic_count, 4);

    assert_eq!(results[1].error_code(), Some(ErrorCode::Blocked));
    assert_eq!(results[2].error_code(), Some(ErrorCode::ProxyAuthFailed));
    assert_eq!(results[3].error_code(), Some(ErrorCode::Captcha));

    let log = events.0.lock().unwrap().clone();
    assert_eq!(log.iter().filter(|name| **name == "delay").count(), 3);
    assert_eq!(log.iter().filter(|name| **name == "blocked").count(), 2);
    assert_eq!(log.iter().filter(|name| **name == "error").count(), 1);
}

#[tokio::test]
async fn report_serializes_output_contract() {
    let fetcher = CannedFetcher::new(vec![Err(TunnelError::Timeout {
        stage: TunnelStage::ReadingResponse,
        elapsed_ms: 30_000,
    })]);
    let scraper = AdScraper::builder()
        .with_proxy(proxy())
        .with_fetcher(fetcher)
        .build()
        .expect("scraper");

    let report = scraper.scrape("fiber internet").await.report();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["error"], "TIMEOUT");
    assert_eq!(json["totalAds"], 0);
    assert!(json["ads"].as_array().unwrap().is_empty());
    assert!(json["message"].as_str().unwrap().contains("reading-response"));
}

#[test]
fn discovered_keywords_rank_by_opportunity() {
    let ranked = score_all(["fiber internet", "cheap fiber internet deals", "how to install fiber internet at home"]);
    assert_eq!(ranked[0].text(), "how to install fiber internet at home");
    assert_eq!(ranked[1].text(), "cheap fiber internet deals");
    assert_eq!(ranked[2].text(), "fiber internet");
}

/// Requires `ADSCRAPER_PROXY` as JSON, e.g.
/// `{"provider":"bright-data","host":"brd.superproxy.io","port":22225,"username":"u","password":"p"}`.
#[tokio::test]
#[ignore]
async fn live_proxy_smoke_test() {
    let raw = std::env::var("ADSCRAPER_PROXY").expect("ADSCRAPER_PROXY not set");
    let proxy: ProxyConfig = serde_json::from_str(&raw).expect("proxy json");
    let scraper = AdScraper::builder()
        .with_proxy(proxy)
        .build()
        .expect("scraper");

    let check = scraper.check_proxy().await.expect("proxy check");
    assert!(!check.ip.is_empty());

    let result = scraper.scrape("fiber internet").await;
    println!("{}", serde_json::to_string_pretty(&result.report()).unwrap());
}
