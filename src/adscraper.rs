//! High level scrape orchestration.
//!
//! Wires together proxy credentials, the CONNECT tunnel, response
//! classification, and ad extraction, and sequences multi-keyword batches
//! with a politeness delay. Per-keyword failures are data, not errors: they
//! land in [`ScrapeResult::status`] with a discrete [`ErrorCode`].

use std::borrow::Cow;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;
use url::Url;

use crate::detectors::{Classification, ClassifiedResponse};
use crate::extract::text::build_regex;
use crate::extract::{
	AdRecord, ExtractedPage, HeuristicExtractor, LocalAd, PageExtractor, SearchAd, ShoppingAd,
	extract_transparency,
};
use crate::modules::events::{
	BlockedEvent, DelayEvent, ErrorEvent, EventDispatcher, EventHandler, LoggingHandler,
	PostResponseEvent, PreRequestEvent, ScrapeEvent,
};
use crate::modules::proxy::ProxyConfig;
use crate::modules::timing::{DelayConfig, PolitenessDelay};
use crate::transport::{PageFetcher, TunnelClient, TunnelError};

pub const DEFAULT_SEARCH_URL: &str = "https://www.google.com/search";
pub const DEFAULT_TRANSPARENCY_URL: &str = "https://adstransparency.google.com/";
pub const DEFAULT_IP_CHECK_URL: &str = "https://api.ipify.org/?format=json";

static IP_RE: Lazy<Regex> = Lazy::new(|| {
	build_regex(r"\b(?:\d{1,3}\.){3}\d{1,3}\b|(?:[0-9A-Fa-f]{1,4})?(?::[0-9A-Fa-f]{0,4}){2,7}")
});

/// Result alias used across the orchestration layer.
pub type AdScraperResult<T> = Result<T, AdScraperError>;

/// Errors surfaced by the orchestrator itself. Failures of a single scrape
/// are reported through [`ScrapeStatus`] instead.
#[derive(Debug, Error)]
pub enum AdScraperError {
	#[error("url parse error: {0}")]
	Url(#[from] url::ParseError),
	#[error("transport initialisation failed: {0}")]
	Transport(#[from] TunnelError),
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),
	#[error("{code}: {message}")]
	Request { code: ErrorCode, message: String },
	#[error("unexpected response: {0}")]
	UnexpectedResponse(String),
}

/// Discrete, caller-actionable failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
	NoProxy,
	ProxyAuthFailed,
	Blocked,
	Captcha,
	Http(u16),
	TransportError,
	Timeout,
}

impl ErrorCode {
	pub fn as_str(&self) -> Cow<'static, str> {
		match self {
			ErrorCode::NoProxy => Cow::Borrowed("NO_PROXY"),
			ErrorCode::ProxyAuthFailed => Cow::Borrowed("PROXY_AUTH_FAILED"),
			ErrorCode::Blocked => Cow::Borrowed("BLOCKED"),
			ErrorCode::Captcha => Cow::Borrowed("CAPTCHA"),
			ErrorCode::Http(code) => Cow::Owned(format!("HTTP_{code}")),
			ErrorCode::TransportError => Cow::Borrowed("TRANSPORT_ERROR"),
			ErrorCode::Timeout => Cow::Borrowed("TIMEOUT"),
		}
	}

	/// Codes worth a fresh call with a new session identity.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			ErrorCode::Blocked | ErrorCode::Captcha | ErrorCode::Timeout | ErrorCode::TransportError
		)
	}

	/// `None` for pages that may be extracted.
	pub fn from_classification(classification: Classification) -> Option<Self> {
		match classification {
			Classification::Ok => None,
			Classification::Blocked => Some(ErrorCode::Blocked),
			Classification::Captcha => Some(ErrorCode::Captcha),
			Classification::HttpError(code) => Some(ErrorCode::Http(code)),
		}
	}
}

impl From<&TunnelError> for ErrorCode {
	fn from(err: &TunnelError) -> Self {
		match err {
			TunnelError::NoProxy => ErrorCode::NoProxy,
			TunnelError::ProxyAuthFailed { .. } => ErrorCode::ProxyAuthFailed,
			TunnelError::Timeout { .. } => ErrorCode::Timeout,
			TunnelError::Transport { .. }
			| TunnelError::InvalidTarget(_)
			| TunnelError::TlsConfig(_) => ErrorCode::TransportError,
		}
	}
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.as_str())
	}
}

impl Serialize for ErrorCode {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

/// Outcome of one tunneled call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeStatus {
	Success,
	Failed { code: ErrorCode, message: String },
}

impl ScrapeStatus {
	fn failed(code: ErrorCode, message: impl Into<String>) -> Self {
		ScrapeStatus::Failed {
			code,
			message: message.into(),
		}
	}

	pub fn is_success(&self) -> bool {
		matches!(self, ScrapeStatus::Success)
	}

	pub fn error_code(&self) -> Option<ErrorCode> {
		match self {
			ScrapeStatus::Success => None,
			ScrapeStatus::Failed { code, .. } => Some(*code),
		}
	}

	pub fn message(&self) -> Option<&str> {
		match self {
			ScrapeStatus::Success => None,
			ScrapeStatus::Failed { message, .. } => Some(message),
		}
	}
}

/// Serialized as `status` (`"success"` / `"error"`), `error`, `message`.
impl Serialize for ScrapeStatus {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut state = serializer.serialize_struct("ScrapeStatus", 3)?;
		let label = if self.is_success() { "success" } else { "error" };
		state.serialize_field("status", label)?;
		state.serialize_field("error", &self.error_code())?;
		state.serialize_field("message", &self.message())?;
		state.end()
	}
}

/// Everything learned about one keyword.
#[derive(Debug, Clone)]
pub struct ScrapeResult {
	pub keyword: String,
	pub status: ScrapeStatus,
	pub http_status: Option<u16>,
	pub session_id: Option<String>,
	pub page: ExtractedPage,
	pub elapsed_ms: u64,
	pub timestamp: DateTime<Utc>,
}

impl ScrapeResult {
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	pub fn error_code(&self) -> Option<ErrorCode> {
		self.status.error_code()
	}

	/// Search + shopping + sponsored local listings.
	pub fn total_ads(&self) -> usize {
		self.page.total_ads()
	}

	pub fn report(&self) -> ScrapeReport {
		ScrapeReport {
			keyword: self.keyword.clone(),
			status: self.status.clone(),
			total_ads: self.total_ads(),
			search_ads_count: self.page.search_ads.len(),
			shopping_ads_count: self.page.shopping_ads.len(),
			local_ads_count: self.page.local_ads.len(),
			ads: self.page.ad_records(),
			search_ads: self.page.search_ads.clone(),
			shopping_ads: self.page.shopping_ads.clone(),
			local_ads: self.page.local_ads.clone(),
			local_results: self.page.local_results.clone(),
			related_searches: self.page.related_searches.clone(),
			organic_count: self.page.organic_count,
			http_status: self.http_status,
			session_id: self.session_id.clone(),
			elapsed_ms: self.elapsed_ms,
			timestamp: self.timestamp,
		}
	}
}

/// JSON shape handed to presentation code.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeReport {
	pub keyword: String,
	#[serde(flatten)]
	pub status: ScrapeStatus,
	pub total_ads: usize,
	pub search_ads_count: usize,
	pub shopping_ads_count: usize,
	pub local_ads_count: usize,
	pub ads: Vec<AdRecord>,
	pub search_ads: Vec<SearchAd>,
	pub shopping_ads: Vec<ShoppingAd>,
	pub local_ads: Vec<LocalAd>,
	pub local_results: Vec<LocalAd>,
	pub related_searches: Vec<String>,
	pub organic_count: usize,
	pub http_status: Option<u16>,
	pub session_id: Option<String>,
	pub elapsed_ms: u64,
	pub timestamp: DateTime<Utc>,
}

impl From<&ScrapeResult> for ScrapeReport {
	fn from(result: &ScrapeResult) -> Self {
		result.report()
	}
}

/// Egress identity observed through the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyCheck {
	pub ip: String,
	pub elapsed_ms: u64,
	pub session_id: String,
}

/// Ad-transparency archive lookup for one advertiser domain.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransparencyResult {
	pub domain: String,
	pub region: String,
	#[serde(flatten)]
	pub status: ScrapeStatus,
	pub advertisers: Vec<String>,
	pub creative_count: usize,
	pub elapsed_ms: u64,
	pub timestamp: DateTime<Utc>,
}

/// Scraper configuration used by the builder.
#[derive(Debug, Clone)]
pub struct AdScraperConfig {
	pub proxy: Option<ProxyConfig>,
	pub language: String,
	pub region: String,
	pub results_per_page: u32,
	pub request_timeout: Duration,
	pub politeness: DelayConfig,
	pub max_batch: usize,
	pub search_base_url: String,
	pub transparency_base_url: String,
	pub ip_check_url: String,
}

impl Default for AdScraperConfig {
	fn default() -> Self {
		Self {
			proxy: None,
			language: "en".into(),
			region: "us".into(),
			results_per_page: 10,
			request_timeout: Duration::from_secs(30),
			politeness: DelayConfig::default(),
			max_batch: 10,
			search_base_url: DEFAULT_SEARCH_URL.into(),
			transparency_base_url: DEFAULT_TRANSPARENCY_URL.into(),
			ip_check_url: DEFAULT_IP_CHECK_URL.into(),
		}
	}
}

/// Fluent builder for [`AdScraper`].
pub struct AdScraperBuilder {
	config: AdScraperConfig,
	fetcher: Option<Arc<dyn PageFetcher>>,
	extractor: Option<Arc<dyn PageExtractor>>,
	handlers: Vec<Arc<dyn EventHandler>>,
}

impl AdScraperBuilder {
	pub fn new() -> Self {
		Self {
			config: AdScraperConfig::default(),
			fetcher: None,
			extractor: None,
			handlers: Vec::new(),
		}
	}

	pub fn with_config(mut self, config: AdScraperConfig) -> Self {
		self.config = config;
		self
	}

	pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
		self.config.proxy = Some(proxy);
		self
	}

	pub fn with_language(mut self, language: impl Into<String>) -> Self {
		self.config.language = language.into();
		self
	}

	pub fn with_region(mut self, region: impl Into<String>) -> Self {
		self.config.region = region.into();
		self
	}

	pub fn with_results_per_page(mut self, results: u32) -> Self {
		self.config.results_per_page = results.clamp(1, 100);
		self
	}

	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout = timeout;
		self
	}

	pub fn with_politeness(mut self, politeness: DelayConfig) -> Self {
		self.config.politeness = politeness;
		self
	}

	pub fn with_max_batch(mut self, max_batch: usize) -> Self {
		self.config.max_batch = max_batch.max(1);
		self
	}

	pub fn with_search_base_url(mut self, url: impl Into<String>) -> Self {
		self.config.search_base_url = url.into();
		self
	}

	pub fn with_transparency_base_url(mut self, url: impl Into<String>) -> Self {
		self.config.transparency_base_url = url.into();
		self
	}

	pub fn with_ip_check_url(mut self, url: impl Into<String>) -> Self {
		self.config.ip_check_url = url.into();
		self
	}

	/// Replace the tunnel client (tests, alternative transports).
	pub fn with_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
		self.fetcher = Some(fetcher);
		self
	}

	pub fn with_extractor(mut self, extractor: Arc<dyn PageExtractor>) -> Self {
		self.extractor = Some(extractor);
		self
	}

	pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	pub fn build(self) -> AdScraperResult<AdScraper> {
		AdScraper::from_builder(self)
	}
}

impl Default for AdScraperBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Parsed endpoints, validated once at build time.
#[derive(Debug, Clone)]
struct Endpoints {
	search: Url,
	transparency: Url,
	ip_check: Url,
}

impl Endpoints {
	fn parse(config: &AdScraperConfig) -> AdScraperResult<Self> {
		Ok(Self {
			search: https_url(&config.search_base_url)?,
			transparency: https_url(&config.transparency_base_url)?,
			ip_check: https_url(&config.ip_check_url)?,
		})
	}
}

fn https_url(raw: &str) -> AdScraperResult<Url> {
	let url = Url::parse(raw)?;
	if url.scheme() != "https" {
		return Err(AdScraperError::InvalidConfig(format!(
			"{raw} must be an https url"
		)));
	}
	Ok(url)
}

/// Ad-intelligence client. Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct AdScraper {
	config: AdScraperConfig,
	endpoints: Endpoints,
	fetcher: Arc<dyn PageFetcher>,
	extractor: Arc<dyn PageExtractor>,
	events: EventDispatcher,
	politeness: PolitenessDelay,
}

impl fmt::Debug for AdScraper {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AdScraper")
			.field("config", &self.config)
			.field("events", &self.events)
			.finish_non_exhaustive()
	}
}

impl AdScraper {
	/// Scraper with default settings and no proxy.
	pub fn new() -> AdScraperResult<Self> {
		Self::builder().build()
	}

	pub fn builder() -> AdScraperBuilder {
		AdScraperBuilder::new()
	}

	fn from_builder(builder: AdScraperBuilder) -> AdScraperResult<Self> {
		let AdScraperBuilder {
			config,
			fetcher,
			extractor,
			handlers,
		} = builder;

		if let Some(proxy) = &config.proxy
			&& (proxy.host.trim().is_empty() || proxy.port == 0)
		{
			return Err(AdScraperError::InvalidConfig(format!(
				"proxy endpoint '{}' is incomplete",
				proxy.endpoint()
			)));
		}
		let endpoints = Endpoints::parse(&config)?;

		let fetcher: Arc<dyn PageFetcher> = match fetcher {
			Some(fetcher) => fetcher,
			None => Arc::new(TunnelClient::new()?.with_locale(&config.language, &config.region)),
		};
		let extractor: Arc<dyn PageExtractor> = match extractor {
			Some(extractor) => extractor,
			None => Arc::new(HeuristicExtractor),
		};

		let mut events = EventDispatcher::new();
		events.register_handler(Arc::new(LoggingHandler));
		for handler in handlers {
			events.register_handler(handler);
		}

		Ok(Self {
			politeness: PolitenessDelay::new(config.politeness),
			config,
			endpoints,
			fetcher,
			extractor,
			events,
		})
	}

	pub fn config(&self) -> &AdScraperConfig {
		&self.config
	}

	/// `{search}?q=..&hl=..&gl=..&num=..`, form-encoded.
	pub fn search_url(&self, keyword: &str) -> Url {
		let mut url = self.endpoints.search.clone();
		url.query_pairs_mut()
			.append_pair("q", keyword.trim())
			.append_pair("hl", &self.config.language)
			.append_pair("gl", &self.config.region)
			.append_pair("num", &self.config.results_per_page.to_string());
		url
	}

	pub fn transparency_url(&self, domain: &str, region: &str) -> Url {
		let mut url = self.endpoints.transparency.clone();
		url.query_pairs_mut()
			.append_pair("region", region)
			.append_pair("domain", domain);
		url
	}

	/// Scrape one keyword. Never fails; see [`ScrapeResult::status`].
	pub async fn scrape(&self, keyword: &str) -> ScrapeResult {
		let keyword = keyword.trim();
		let started = Instant::now();
		let url = self.search_url(keyword);

		let mut result = ScrapeResult {
			keyword: keyword.to_string(),
			status: ScrapeStatus::Success,
			http_status: None,
			session_id: None,
			page: ExtractedPage::default(),
			elapsed_ms: 0,
			timestamp: Utc::now(),
		};

		match self.fetch(Some(keyword), &url).await {
			Err(err) => {
				result.status = ScrapeStatus::failed(ErrorCode::from(&err), err.to_string());
			}
			Ok(classified) => {
				result.http_status = Some(classified.status_code());
				result.session_id = Some(classified.response.session_id.clone());
				match ErrorCode::from_classification(classified.classification) {
					Some(code) => {
						result.status = ScrapeStatus::failed(
							code,
							format!(
								"{} answered {}",
								url.host_str().unwrap_or_default(),
								classified.status_code()
							),
						);
					}
					None => {
						let mut page = self.extractor.extract(&classified.body());
						let own = keyword.to_lowercase();
						page.related_searches
							.retain(|query| query.trim().to_lowercase() != own);
						log::info!(
							"'{}': {} ads ({} search, {} shopping, {} local), {} related",
							keyword,
							page.total_ads(),
							page.search_ads.len(),
							page.shopping_ads.len(),
							page.local_ads.len(),
							page.related_searches.len()
						);
						result.page = page;
					}
				}
			}
		}

		result.elapsed_ms = started.elapsed().as_millis() as u64;
		result
	}

	/// Scrape up to `max_batch` keywords one after another, pausing between
	/// requests. Each keyword gets its own result slot and its own proxy
	/// session; one failure never stops the batch.
	pub async fn scrape_many<I, S>(&self, keywords: I) -> Vec<ScrapeResult>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut keywords: Vec<String> = keywords
			.into_iter()
			.map(|keyword| keyword.as_ref().trim().to_string())
			.collect();
		if keywords.len() > self.config.max_batch {
			log::warn!(
				"batch of {} keywords capped to {}",
				keywords.len(),
				self.config.max_batch
			);
			keywords.truncate(self.config.max_batch);
		}

		let mut results = Vec::with_capacity(keywords.len());
		for (index, keyword) in keywords.iter().enumerate() {
			if index > 0 {
				let delay = self.politeness.wait().await;
				self.events.dispatch(ScrapeEvent::Delay(DelayEvent {
					next_keyword: keyword.clone(),
					delay,
					timestamp: Utc::now(),
				}));
			}
			results.push(self.scrape(keyword).await);
		}

		let failed = results.iter().filter(|result| !result.is_success()).count();
		log::info!("batch finished: {} ok, {} failed", results.len() - failed, failed);
		results
	}

	/// Look up an advertiser domain in the ad-transparency archive.
	pub async fn lookup_transparency(&self, domain: &str, region: &str) -> TransparencyResult {
		let domain = normalize_domain(domain);
		let region = if region.trim().is_empty() {
			self.config.region.to_ascii_uppercase()
		} else {
			region.trim().to_ascii_uppercase()
		};
		let started = Instant::now();
		let url = self.transparency_url(&domain, &region);

		let mut result = TransparencyResult {
			domain,
			region,
			status: ScrapeStatus::Success,
			advertisers: Vec::new(),
			creative_count: 0,
			elapsed_ms: 0,
			timestamp: Utc::now(),
		};

		match self.fetch(None, &url).await {
			Err(err) => {
				result.status = ScrapeStatus::failed(ErrorCode::from(&err), err.to_string());
			}
			Ok(classified) => match ErrorCode::from_classification(classified.classification) {
				Some(code) => {
					result.status = ScrapeStatus::failed(
						code,
						format!("transparency archive answered {}", classified.status_code()),
					);
				}
				None => {
					let findings = extract_transparency(&classified.body());
					result.advertisers = findings.advertisers;
					result.creative_count = findings.creative_count;
				}
			},
		}

		result.elapsed_ms = started.elapsed().as_millis() as u64;
		result
	}

	/// Fetch the configured "echo my IP" endpoint through the proxy.
	pub async fn check_proxy(&self) -> AdScraperResult<ProxyCheck> {
		let url = self.endpoints.ip_check.clone();
		let classified = self.fetch(None, &url).await.map_err(|err| AdScraperError::Request {
			code: ErrorCode::from(&err),
			message: err.to_string(),
		})?;
		if let Some(code) = ErrorCode::from_classification(classified.classification) {
			return Err(AdScraperError::Request {
				code,
				message: format!("ip check answered {}", classified.status_code()),
			});
		}

		let body = classified.body();
		let ip = parse_egress_ip(&body).ok_or_else(|| {
			AdScraperError::UnexpectedResponse(format!(
				"no ip address in {} byte body",
				body.len()
			))
		})?;
		log::info!(
			"proxy egress {} (session {}, {}ms)",
			ip,
			classified.response.session_id,
			classified.elapsed_ms()
		);
		Ok(ProxyCheck {
			ip,
			elapsed_ms: classified.elapsed_ms(),
			session_id: classified.response.session_id,
		})
	}

	/// One tunneled request with event reporting around it.
	async fn fetch(
		&self,
		keyword: Option<&str>,
		url: &Url,
	) -> Result<ClassifiedResponse, TunnelError> {
		let keyword = keyword.map(str::to_string);
		let outcome = match self.config.proxy.as_ref() {
			None => Err(TunnelError::NoProxy),
			Some(proxy) => {
				self.events.dispatch(ScrapeEvent::PreRequest(PreRequestEvent {
					keyword: keyword.clone(),
					url: url.clone(),
					provider: proxy.provider.to_string(),
					timestamp: Utc::now(),
				}));
				self.fetcher
					.fetch(url, proxy, self.config.request_timeout)
					.await
			}
		};

		match &outcome {
			Ok(classified) => {
				self.events.dispatch(ScrapeEvent::PostResponse(PostResponseEvent {
					url: url.clone(),
					status: classified.status_code(),
					session_id: classified.response.session_id.clone(),
					latency: Duration::from_millis(classified.elapsed_ms()),
					timestamp: Utc::now(),
				}));
				if let Some(code) = ErrorCode::from_classification(classified.classification) {
					self.events.dispatch(ScrapeEvent::Blocked(BlockedEvent {
						keyword,
						code: code.to_string(),
						status: classified.status_code(),
						session_id: classified.response.session_id.clone(),
						timestamp: Utc::now(),
					}));
				}
			}
			Err(err) => {
				self.events.dispatch(ScrapeEvent::Error(ErrorEvent {
					keyword,
					code: ErrorCode::from(err).to_string(),
					error: err.to_string(),
					timestamp: Utc::now(),
				}));
			}
		}
		outcome
	}
}

/// `https://www.Example.com/path` → `example.com`.
fn normalize_domain(raw: &str) -> String {
	let trimmed = raw.trim();
	let without_scheme = trimmed
		.split_once("://")
		.map(|(_, rest)| rest)
		.unwrap_or(trimmed);
	let host = without_scheme
		.split(['/', '?', '#'])
		.next()
		.unwrap_or_default()
		.to_ascii_lowercase();
	host.trim_start_matches("www.").to_string()
}

/// `{"ip": "..."}` or, failing that, the first address-looking token.
fn parse_egress_ip(body: &str) -> Option<String> {
	if let Ok(value) = serde_json::from_str::<serde_json::Value>(body.trim())
		&& let Some(ip) = value.get("ip").and_then(|ip| ip.as_str())
		&& ip.parse::<IpAddr>().is_ok()
	{
		return Some(ip.to_string());
	}
	IP_RE
		.find_iter(body)
		.map(|m| m.as_str())
		.find(|candidate| candidate.parse::<IpAddr>().is_ok())
		.map(str::to_string)
}
