//! Residential proxy configuration and provider-specific credential shaping.
//!
//! Each outbound call gets a fresh session token so the upstream provider
//! pins that call to its own exit node. Providers encode the session (and
//! optional country) differently; the encodings live in a lookup table keyed
//! by [`ProxyProvider`], so supporting a new provider is a table entry.

use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use once_cell::sync::Lazy;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

const SESSION_RANDOM_LEN: usize = 8;

/// Residential proxy vendors with known credential conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProxyProvider {
    BrightData,
    Oxylabs,
    Smartproxy,
    Iproyal,
    Custom,
}

impl ProxyProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProvider::BrightData => "bright-data",
            ProxyProvider::Oxylabs => "oxylabs",
            ProxyProvider::Smartproxy => "smartproxy",
            ProxyProvider::Iproyal => "iproyal",
            ProxyProvider::Custom => "custom",
        }
    }
}

impl fmt::Display for ProxyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-owned proxy endpoint plus account credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub provider: ProxyProvider,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub country: Option<String>,
}

impl ProxyConfig {
    pub fn new(
        provider: ProxyProvider,
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            country: None,
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        let country = country.into();
        self.country = (!country.trim().is_empty()).then(|| country.trim().to_string());
        self
    }

    /// `host:port` of the proxy itself.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Password is omitted from debug output.
impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("provider", &self.provider)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("country", &self.country)
            .finish_non_exhaustive()
    }
}

/// Credentials ready to be presented to the proxy for a single call.
#[derive(Clone, PartialEq, Eq)]
pub struct FormattedCredentials {
    pub username: String,
    pub password: String,
    pub session_id: String,
}

impl FormattedCredentials {
    /// Value for the `Proxy-Authorization` header.
    pub fn basic_auth(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw.as_bytes())
        )
    }
}

impl fmt::Debug for FormattedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormattedCredentials")
            .field("username", &self.username)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
enum CountryCase {
    Lower,
    Upper,
}

/// How one provider folds session and country into the credentials.
///
/// Templates understand `{user}`, `{pass}`, `{country}` and `{session}`.
/// `{country}` expands to `country_segment` (itself using `{cc}`) when the
/// config carries a country, and to nothing otherwise.
#[derive(Debug, Clone, Copy)]
struct CredentialRule {
    username: &'static str,
    password: &'static str,
    country_segment: &'static str,
    country_case: CountryCase,
}

static CREDENTIAL_RULES: Lazy<HashMap<ProxyProvider, CredentialRule>> = Lazy::new(|| {
    HashMap::from([
        (
            ProxyProvider::BrightData,
            CredentialRule {
                username: "{user}{country}-session-{session}",
                password: "{pass}",
                country_segment: "-country-{cc}",
                country_case: CountryCase::Lower,
            },
        ),
        (
            ProxyProvider::Oxylabs,
            CredentialRule {
                username: "customer-{user}{country}-sessid-{session}",
                password: "{pass}",
                country_segment: "-cc-{cc}",
                country_case: CountryCase::Upper,
            },
        ),
        (
            ProxyProvider::Smartproxy,
            CredentialRule {
                username: "user-{user}{country}-session-{session}",
                password: "{pass}",
                country_segment: "-country-{cc}",
                country_case: CountryCase::Lower,
            },
        ),
        (
            ProxyProvider::Iproyal,
            CredentialRule {
                username: "{user}",
                password: "{pass}{country}_session-{session}_lifetime-10m",
                country_segment: "_country-{cc}",
                country_case: CountryCase::Lower,
            },
        ),
    ])
});

/// Random, time-seeded session token: base36 millis followed by random
/// alphanumerics. Distinct on every call.
pub fn generate_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", to_base36(millis), random.to_ascii_lowercase())
}

fn to_base36(mut value: u128) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Format credentials for `config` pinned to `session_id`.
///
/// Providers without a rule (`custom`) pass credentials through unchanged.
pub fn format_credentials(config: &ProxyConfig, session_id: &str) -> FormattedCredentials {
    let Some(rule) = CREDENTIAL_RULES.get(&config.provider) else {
        return FormattedCredentials {
            username: config.username.clone(),
            password: config.password.clone(),
            session_id: session_id.to_string(),
        };
    };

    let country = config
        .country
        .as_deref()
        .map(str::trim)
        .filter(|cc| !cc.is_empty())
        .map(|cc| {
            let cc = match rule.country_case {
                CountryCase::Lower => cc.to_ascii_lowercase(),
                CountryCase::Upper => cc.to_ascii_uppercase(),
            };
            rule.country_segment.replace("{cc}", &cc)
        })
        .unwrap_or_default();

    let render = |template: &str| {
        template
            .replace("{user}", &config.username)
            .replace("{pass}", &config.password)
            .replace("{country}", &country)
            .replace("{session}", session_id)
    };

    FormattedCredentials {
        username: render(rule.username),
        password: render(rule.password),
        session_id: session_id.to_string(),
    }
}

/// Format credentials with a freshly generated session token.
pub fn fresh_credentials(config: &ProxyConfig) -> FormattedCredentials {
    format_credentials(config, &generate_session_id())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: ProxyProvider) -> ProxyConfig {
        ProxyConfig::new(provider, "proxy.example.net", 22225, "acme", "s3cret").with_country("US")
    }

    #[test]
    fn bright_data_augments_username() {
        let creds = format_credentials(&config(ProxyProvider::BrightData), "abc123");
        assert_eq!(creds.username, "acme-country-us-session-abc123");
        assert_eq!(creds.password, "s3cret");
    }

    #[test]
    fn oxylabs_uses_customer_prefix_and_upper_country() {
        let creds = format_credentials(&config(ProxyProvider::Oxylabs), "abc123");
        assert_eq!(creds.username, "customer-acme-cc-US-sessid-abc123");
        assert_eq!(creds.password, "s3cret");
    }

    #[test]
    fn smartproxy_uses_user_prefix() {
        let creds = format_credentials(&config(ProxyProvider::Smartproxy), "abc123");
        assert_eq!(creds.username, "user-acme-country-us-session-abc123");
    }

    #[test]
    fn iproyal_appends_to_password() {
        let creds = format_credentials(&config(ProxyProvider::Iproyal), "abc123");
        assert_eq!(creds.username, "acme");
        assert_eq!(creds.password, "s3cret_country-us_session-abc123_lifetime-10m");
    }

    #[test]
    fn custom_passes_through() {
        let creds = format_credentials(&config(ProxyProvider::Custom), "abc123");
        assert_eq!(creds.username, "acme");
        assert_eq!(creds.password, "s3cret");
        assert_eq!(creds.session_id, "abc123");
    }

    #[test]
    fn country_segment_omitted_without_country() {
        let cfg = ProxyConfig::new(ProxyProvider::BrightData, "h", 1, "acme", "pw");
        let creds = format_credentials(&cfg, "xyz");
        assert_eq!(creds.username, "acme-session-xyz");
    }

    #[test]
    fn fresh_credentials_use_distinct_sessions() {
        let cfg = config(ProxyProvider::BrightData);
        let first = fresh_credentials(&cfg);
        let second = fresh_credentials(&cfg);
        assert_ne!(first.session_id, second.session_id);
        assert_ne!(first.username, second.username);
        assert!(first.username.starts_with("acme-country-us-session-"));
    }

    #[test]
    fn basic_auth_encodes_user_and_password() {
        let creds = format_credentials(&config(ProxyProvider::Custom), "s");
        // base64("acme:s3cret")
        assert_eq!(creds.basic_auth(), "Basic YWNtZTpzM2NyZXQ=");
    }

    #[test]
    fn provider_tags_deserialize() {
        let cfg: ProxyConfig = serde_json::from_str(
            r#"{"provider":"bright-data","host":"h","port":1,"username":"u","password":"p"}"#,
        )
        .unwrap();
        assert_eq!(cfg.provider, ProxyProvider::BrightData);
        assert!(cfg.country.is_none());
    }
}
