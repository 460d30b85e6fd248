//! Anti-bot response classification.
//!
//! Every fetched page is tagged before extraction runs. CAPTCHA interstitials
//! are recognised from body signatures regardless of status; 403/429 are
//! treated as hard blocks; any other non-200 is reported as an HTTP error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::transport::TunnelResponse;

/// Outcome of inspecting a response that did arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "status")]
pub enum Classification {
    Ok,
    Blocked,
    Captcha,
    HttpError(u16),
}

impl Classification {
    pub fn is_ok(&self) -> bool {
        matches!(self, Classification::Ok)
    }
}

/// Signature used to spot CAPTCHA / unusual-traffic interstitials.
#[derive(Debug, Clone)]
struct CaptchaPattern {
    id: &'static str,
    regex: Regex,
}

impl CaptchaPattern {
    fn new(id: &'static str, raw: &str) -> Self {
        Self {
            id,
            regex: build_regex(raw),
        }
    }
}

static CAPTCHA_PATTERNS: Lazy<Vec<CaptchaPattern>> = Lazy::new(|| {
    vec![
        CaptchaPattern::new("unusual_traffic", r"unusual\s+traffic"),
        CaptchaPattern::new("sorry_page", r"/sorry/index"),
        CaptchaPattern::new("recaptcha", r"g-recaptcha|recaptcha/api"),
        CaptchaPattern::new("captcha", r"captcha"),
        CaptchaPattern::new("not_a_robot", r"(?:not|aren't)\s+a\s+robot"),
    ]
});

/// Stateless classifier over status code and body.
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    patterns: Vec<CaptchaPattern>,
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseClassifier {
    pub fn new() -> Self {
        Self {
            patterns: CAPTCHA_PATTERNS.clone(),
        }
    }

    pub fn classify(&self, status: u16, body: &str) -> Classification {
        if let Some(id) = self.captcha_marker(body) {
            log::debug!("captcha marker `{id}` found (status {status})");
            return Classification::Captcha;
        }
        match status {
            200 => Classification::Ok,
            403 | 429 => Classification::Blocked,
            other => Classification::HttpError(other),
        }
    }

    /// Id of the first CAPTCHA signature present in `body`.
    pub fn captcha_marker(&self, body: &str) -> Option<&'static str> {
        self.patterns
            .iter()
            .find(|pattern| pattern.regex.is_match(body))
            .map(|pattern| pattern.id)
    }

    pub fn classify_response(&self, response: TunnelResponse) -> ClassifiedResponse {
        let classification = self.classify(response.status_code, &response.text());
        ClassifiedResponse {
            classification,
            response,
        }
    }
}

/// A tunnel response tagged with its [`Classification`].
#[derive(Debug, Clone)]
pub struct ClassifiedResponse {
    pub classification: Classification,
    pub response: TunnelResponse,
}

impl ClassifiedResponse {
    pub fn status_code(&self) -> u16 {
        self.response.status_code
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.response.elapsed_ms
    }

    pub fn body(&self) -> String {
        self.response.text()
    }

    pub fn is_ok(&self) -> bool {
        self.classification.is_ok()
    }
}

fn build_regex(pattern: &str) -> Regex {
    regex::RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|err| panic!("invalid captcha detection regex `{}`: {}", pattern, err))
}
