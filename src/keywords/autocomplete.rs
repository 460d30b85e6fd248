//! Breadth-first keyword discovery against a public autocomplete endpoint.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

pub const DEFAULT_SUGGEST_ENDPOINT: &str = "https://suggestqueries.google.com/complete/search";

const INTENT_PREFIXES: &[&str] = &["how to ", "best ", "what is ", "why ", "cheap "];
const INTENT_SUFFIXES: &[&str] = &[" vs", " near me", " for beginners", " reviews", " cost"];

/// One discovered term. `source_rank` is its 1-based position in the
/// suggestion list where it was first seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordCandidate {
    pub text: String,
    pub source_rank: usize,
}

impl KeywordCandidate {
    pub fn new(text: impl Into<String>, source_rank: usize) -> Self {
        Self {
            text: text.into(),
            source_rank,
        }
    }
}

impl From<&str> for KeywordCandidate {
    fn from(text: &str) -> Self {
        Self::new(text, 0)
    }
}

impl From<String> for KeywordCandidate {
    fn from(text: String) -> Self {
        Self::new(text, 0)
    }
}

#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("suggestion request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("suggestion endpoint returned status {0}")]
    Status(u16),
    #[error("unexpected suggestion payload: {0}")]
    Malformed(String),
    #[error("invalid suggestion endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
}

/// Anything that turns a partial query into completions.
#[async_trait]
pub trait SuggestionSource: Send + Sync {
    async fn suggest(&self, query: &str) -> Result<Vec<String>, SuggestError>;
}

#[derive(Debug, Clone)]
pub struct ExpanderConfig {
    pub language: String,
    pub country: String,
    pub branch_delay: Duration,
    pub max_branches: usize,
    pub max_results: usize,
    pub request_timeout: Duration,
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        Self {
            language: "en".into(),
            country: "us".into(),
            branch_delay: Duration::from_millis(150),
            max_branches: 40,
            max_results: 300,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Suggestion endpoint speaking the `client=firefox` JSON dialect:
/// `["query", ["suggestion", ...], ...]`.
#[derive(Debug, Clone)]
pub struct HttpSuggestionClient {
    client: reqwest::Client,
    endpoint: Url,
    language: String,
    country: String,
}

impl HttpSuggestionClient {
    pub fn new(config: &ExpanderConfig) -> Result<Self, SuggestError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: Url::parse(DEFAULT_SUGGEST_ENDPOINT)?,
            language: config.language.clone(),
            country: config.country.clone(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, SuggestError> {
        self.endpoint = Url::parse(endpoint)?;
        Ok(self)
    }

    pub fn request_url(&self, query: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client", "firefox")
            .append_pair("ie", "utf-8")
            .append_pair("oe", "utf-8")
            .append_pair("q", query)
            .append_pair("hl", &self.language)
            .append_pair("gl", &self.country);
        url
    }
}

/// Second element of the suggestion array, strings only.
pub fn parse_suggestions(payload: &Value) -> Result<Vec<String>, SuggestError> {
    let list = payload
        .as_array()
        .and_then(|items| items.get(1))
        .and_then(Value::as_array)
        .ok_or_else(|| SuggestError::Malformed(truncate(&payload.to_string(), 120)))?;
    Ok(list
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[async_trait]
impl SuggestionSource for HttpSuggestionClient {
    async fn suggest(&self, query: &str) -> Result<Vec<String>, SuggestError> {
        let response = self.client.get(self.request_url(query)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SuggestError::Status(status.as_u16()));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|err| SuggestError::Malformed(err.to_string()))?;
        parse_suggestions(&payload)
    }
}

/// Every query the expander issues for `seed`, in order: the seed itself,
/// intent prefixes, intent suffixes, then the alphabet with `seed x`
/// followed by `x seed` for each letter, so a branch cap trims both sides
/// evenly.
pub fn branch_queries(seed: &str) -> Vec<String> {
    let seed = seed.trim();
    if seed.is_empty() {
        return Vec::new();
    }
    let mut queries = vec![seed.to_string()];
    queries.extend(INTENT_PREFIXES.iter().map(|prefix| format!("{prefix}{seed}")));
    queries.extend(INTENT_SUFFIXES.iter().map(|suffix| format!("{seed}{suffix}")));
    for letter in 'a'..='z' {
        queries.push(format!("{seed} {letter}"));
        queries.push(format!("{letter} {seed}"));
    }
    queries
}

pub struct AutocompleteExpander {
    source: Arc<dyn SuggestionSource>,
    config: ExpanderConfig,
}

impl std::fmt::Debug for AutocompleteExpander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutocompleteExpander")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AutocompleteExpander {
    pub fn new(source: Arc<dyn SuggestionSource>, config: ExpanderConfig) -> Self {
        Self { source, config }
    }

    /// Expander backed by the public HTTP endpoint.
    pub fn http(config: ExpanderConfig) -> Result<Self, SuggestError> {
        let client = HttpSuggestionClient::new(&config)?;
        Ok(Self::new(Arc::new(client), config))
    }

    pub fn config(&self) -> &ExpanderConfig {
        &self.config
    }

    /// Fan `seed` out over every branch and merge the completions.
    ///
    /// Branches run one after another with `branch_delay` between calls. A
    /// failing branch is logged and skipped. Entries are unique ignoring
    /// case and keep discovery order.
    pub async fn expand(&self, seed: &str) -> Vec<KeywordCandidate> {
        let mut queries = branch_queries(seed);
        queries.truncate(self.config.max_branches);

        let mut seen: HashSet<String> = HashSet::new();
        let mut candidates = Vec::new();

        'branches: for (index, query) in queries.iter().enumerate() {
            if index > 0 && !self.config.branch_delay.is_zero() {
                tokio::time::sleep(self.config.branch_delay).await;
            }

            let suggestions = match self.source.suggest(query).await {
                Ok(suggestions) => suggestions,
                Err(err) => {
                    log::warn!("autocomplete branch '{query}' failed: {err}");
                    continue;
                }
            };

            for (rank, suggestion) in suggestions.into_iter().enumerate() {
                let text = suggestion.trim();
                if text.is_empty() {
                    continue;
                }
                if !seen.insert(text.to_lowercase()) {
                    continue;
                }
                candidates.push(KeywordCandidate::new(text, rank + 1));
                if candidates.len() >= self.config.max_results {
                    break 'branches;
                }
            }
        }

        log::info!(
            "expanded '{}' into {} keywords over {} branches",
            seed.trim(),
            candidates.len(),
            queries.len()
        );
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedSource {
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSource {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SuggestionSource for ScriptedSource {
        async fn suggest(&self, query: &str) -> Result<Vec<String>, SuggestError> {
            self.calls.lock().unwrap().push(query.to_string());
            if query.ends_with(" q") {
                return Err(SuggestError::Status(503));
            }
            Ok(vec![
                query.to_string(),
                "Fiber Internet".to_string(),
                "fiber internet".to_string(),
                format!("{} PLANS", query.to_uppercase()),
                "  ".to_string(),
            ])
        }
    }

    fn quick_config() -> ExpanderConfig {
        ExpanderConfig {
            branch_delay: Duration::ZERO,
            max_branches: 100,
            ..ExpanderConfig::default()
        }
    }

    #[test]
    fn branches_cover_prefixes_suffixes_and_alphabet() {
        let queries = branch_queries("  fiber internet ");
        assert_eq!(queries.len(), 1 + 5 + 5 + 26 + 26);
        assert_eq!(queries[0], "fiber internet");
        assert!(queries.contains(&"how to fiber internet".to_string()));
        assert!(queries.contains(&"fiber internet near me".to_string()));
        assert!(queries.contains(&"fiber internet z".to_string()));
        assert!(queries.contains(&"a fiber internet".to_string()));
        assert!(branch_queries("   ").is_empty());
    }

    #[tokio::test]
    async fn default_cap_trims_alphabet_evenly_on_both_sides() {
        let source = Arc::new(ScriptedSource::new());
        let config = ExpanderConfig {
            branch_delay: Duration::ZERO,
            ..ExpanderConfig::default()
        };
        let expander = AutocompleteExpander::new(source.clone(), config);
        expander.expand("vpn").await;

        let calls = source.calls.lock().unwrap();
        assert_eq!(calls.len(), 40);
        assert!(calls.contains(&"vpn n".to_string()));
        assert!(calls.contains(&"n vpn".to_string()));
        let trailing = calls.iter().filter(|q| q.starts_with("vpn ") && q.len() == 5).count();
        let leading = calls.iter().filter(|q| q.ends_with(" vpn") && q.len() == 5).count();
        assert!(trailing.abs_diff(leading) <= 1, "{trailing} vs {leading}");
    }

    #[tokio::test]
    async fn merged_results_are_unique_ignoring_case() {
        let source = Arc::new(ScriptedSource::new());
        let expander = AutocompleteExpander::new(source.clone(), quick_config());
        let keywords = expander.expand("fiber internet").await;

        let mut lowered: Vec<String> = keywords.iter().map(|k| k.text.to_lowercase()).collect();
        let total = lowered.len();
        lowered.sort();
        lowered.dedup();
        assert_eq!(lowered.len(), total);
        assert_eq!(keywords[0].text, "fiber internet");
        assert_eq!(keywords[0].source_rank, 1);
        assert!(!keywords.iter().any(|k| k.text.to_lowercase() == "fiber internet q"));
        assert_eq!(source.calls.lock().unwrap().len(), 63);
    }

    #[tokio::test]
    async fn expansion_is_idempotent() {
        let expander = AutocompleteExpander::new(Arc::new(ScriptedSource::new()), quick_config());
        let first = expander.expand("solar panels").await;
        let second = expander.expand("solar panels").await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn respects_branch_and_result_caps() {
        let source = Arc::new(ScriptedSource::new());
        let config = ExpanderConfig {
            max_branches: 3,
            ..quick_config()
        };
        let expander = AutocompleteExpander::new(source.clone(), config);
        expander.expand("vpn").await;
        assert_eq!(source.calls.lock().unwrap().len(), 3);

        let config = ExpanderConfig {
            max_results: 2,
            ..quick_config()
        };
        let expander = AutocompleteExpander::new(Arc::new(ScriptedSource::new()), config);
        assert_eq!(expander.expand("vpn").await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_branches() {
        let config = ExpanderConfig {
            max_branches: 4,
            branch_delay: Duration::from_millis(150),
            ..ExpanderConfig::default()
        };
        let expander = AutocompleteExpander::new(Arc::new(ScriptedSource::new()), config);
        let started = tokio::time::Instant::now();
        expander.expand("vpn").await;
        assert!(started.elapsed() >= Duration::from_millis(450));
    }

    #[test]
    fn parses_second_array_element() {
        let payload = serde_json::json!(["vpn", ["vpn free", "vpn for pc", 7], [], {"x": 1}]);
        assert_eq!(
            parse_suggestions(&payload).unwrap(),
            vec!["vpn free".to_string(), "vpn for pc".to_string()]
        );
        assert!(matches!(
            parse_suggestions(&serde_json::json!({"q": "vpn"})),
            Err(SuggestError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn http_client_reads_suggestion_endpoint() {
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/complete/search"))
            .and(query_param("client", "firefox"))
            .and(query_param("q", "fiber internet"))
            .and(query_param("hl", "de"))
            .and(query_param("gl", "at"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                "fiber internet",
                ["fiber internet deals", "fiber internet speed"]
            ])))
            .mount(&server)
            .await;

        let config = ExpanderConfig {
            language: "de".into(),
            country: "at".into(),
            ..ExpanderConfig::default()
        };
        let client = HttpSuggestionClient::new(&config)
            .unwrap()
            .with_endpoint(&format!("{}/complete/search", server.uri()))
            .unwrap();
        let suggestions = client.suggest("fiber internet").await.unwrap();
        assert_eq!(suggestions, vec!["fiber internet deals", "fiber internet speed"]);
    }

    #[tokio::test]
    async fn http_client_surfaces_error_status() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = HttpSuggestionClient::new(&ExpanderConfig::default())
            .unwrap()
            .with_endpoint(&server.uri())
            .unwrap();
        assert!(matches!(
            client.suggest("vpn").await,
            Err(SuggestError::Status(429))
        ));
    }
}
