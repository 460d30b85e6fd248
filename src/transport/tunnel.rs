//! CONNECT → TLS → HTTP/1.1 over a residential proxy.
//!
//! One call opens one TCP connection, presents a fresh proxy session, and
//! tears everything down after the response. Connections are never pooled:
//! a reused tunnel would reuse its exit and fingerprint.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use url::Url;

use super::http1::{
    ResponseParseError, build_connect_request, build_get_request, parse_head_status,
    parse_response, read_head, read_to_close,
};
use super::tls::{relaxed_connector, server_name};
use super::user_agents::{accept_language, navigation_headers, random_desktop_user_agent};
use crate::detectors::{ClassifiedResponse, ResponseClassifier};
use crate::modules::proxy::{FormattedCredentials, ProxyConfig, fresh_credentials};

/// Progress of a single tunnel call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunnelStage {
    Connecting,
    TunnelEstablished,
    TlsNegotiated,
    RequestSent,
    ReadingResponse,
    Complete,
    Failed,
}

impl fmt::Display for TunnelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TunnelStage::Connecting => "connecting",
            TunnelStage::TunnelEstablished => "tunnel-established",
            TunnelStage::TlsNegotiated => "tls-negotiated",
            TunnelStage::RequestSent => "request-sent",
            TunnelStage::ReadingResponse => "reading-response",
            TunnelStage::Complete => "complete",
            TunnelStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Failures that prevent a response from being obtained at all.
///
/// `stage` names the state the call was trying to reach.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("no proxy configured")]
    NoProxy,
    #[error("proxy rejected CONNECT with status {status}")]
    ProxyAuthFailed { status: u16 },
    #[error("transport failure before {stage}: {message}")]
    Transport { stage: TunnelStage, message: String },
    #[error("timed out after {elapsed_ms}ms before {stage}")]
    Timeout { stage: TunnelStage, elapsed_ms: u64 },
    #[error("unsupported target url: {0}")]
    InvalidTarget(String),
    #[error("tls configuration error: {0}")]
    TlsConfig(#[from] rustls::Error),
}

impl TunnelError {
    fn transport(stage: TunnelStage, message: impl fmt::Display) -> Self {
        TunnelError::Transport {
            stage,
            message: message.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TunnelError::Timeout { .. })
    }
}

/// Raw result of one tunnel call.
#[derive(Debug, Clone)]
pub struct TunnelResponse {
    pub status_code: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub elapsed_ms: u64,
    pub session_id: String,
}

impl TunnelResponse {
    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Source of classified pages. [`TunnelClient`] is the production
/// implementation; tests substitute canned responses.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &Url,
        proxy: &ProxyConfig,
        timeout: Duration,
    ) -> Result<ClassifiedResponse, TunnelError>;
}

/// Tracks the current [`TunnelStage`] against a single call deadline.
#[derive(Debug)]
pub struct TunnelSession {
    stage: TunnelStage,
    started: Instant,
    deadline: tokio::time::Instant,
}

impl TunnelSession {
    pub fn new(timeout: Duration) -> Self {
        Self {
            stage: TunnelStage::Connecting,
            started: Instant::now(),
            deadline: tokio::time::Instant::now() + timeout,
        }
    }

    pub fn stage(&self) -> TunnelStage {
        self.stage
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Run `step` under the remaining deadline and move to `next` on success.
    /// Any failure parks the session in [`TunnelStage::Failed`].
    pub async fn advance<T, F>(&mut self, next: TunnelStage, step: F) -> Result<T, TunnelError>
    where
        F: Future<Output = Result<T, TunnelError>>,
    {
        match tokio::time::timeout_at(self.deadline, step).await {
            Ok(Ok(value)) => {
                log::trace!("tunnel {} -> {}", self.stage, next);
                self.stage = next;
                Ok(value)
            }
            Ok(Err(err)) => {
                log::debug!("tunnel failed in {} before {}: {}", self.stage, next, err);
                self.stage = TunnelStage::Failed;
                Err(err)
            }
            Err(_) => {
                self.stage = TunnelStage::Failed;
                Err(TunnelError::Timeout {
                    stage: next,
                    elapsed_ms: self.elapsed_ms(),
                })
            }
        }
    }

    pub fn enter(&mut self, next: TunnelStage) {
        log::trace!("tunnel {} -> {}", self.stage, next);
        self.stage = next;
    }
}

/// Send `CONNECT authority` over `stream` and require a 200 reply.
pub async fn establish_tunnel<S>(
    stream: &mut S,
    authority: &str,
    credentials: &FormattedCredentials,
    user_agent: &str,
) -> Result<(), TunnelError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let stage = TunnelStage::TunnelEstablished;
    let request = build_connect_request(authority, &credentials.basic_auth(), user_agent);
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|err| TunnelError::transport(stage, err))?;
    stream
        .flush()
        .await
        .map_err(|err| TunnelError::transport(stage, err))?;

    let head = read_head(stream)
        .await
        .map_err(|err| TunnelError::transport(stage, err))?;
    if head.is_empty() {
        return Err(TunnelError::transport(stage, "proxy closed the connection"));
    }
    let status = parse_head_status(&head).map_err(|err| TunnelError::transport(stage, err))?;
    if status != 200 {
        return Err(TunnelError::ProxyAuthFailed { status });
    }
    Ok(())
}

/// Write a serialized request.
pub async fn send_request<S>(stream: &mut S, request: &[u8]) -> Result<(), TunnelError>
where
    S: AsyncWrite + Unpin,
{
    let stage = TunnelStage::RequestSent;
    stream
        .write_all(request)
        .await
        .map_err(|err| TunnelError::transport(stage, err))?;
    stream
        .flush()
        .await
        .map_err(|err| TunnelError::transport(stage, err))
}

/// Read until close and parse the HTTP/1.1 response.
pub async fn receive_response<S>(
    stream: &mut S,
) -> Result<super::http1::RawResponse, TunnelError>
where
    S: AsyncRead + Unpin,
{
    let stage = TunnelStage::Complete;
    let raw = read_to_close(stream)
        .await
        .map_err(|err| TunnelError::transport(stage, err))?;
    parse_response(&raw).map_err(|err: ResponseParseError| TunnelError::transport(stage, err))
}

/// Hand-driven HTTPS client that reaches targets through a CONNECT proxy.
#[derive(Clone)]
pub struct TunnelClient {
    connector: TlsConnector,
    classifier: ResponseClassifier,
    accept_language: String,
}

impl fmt::Debug for TunnelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelClient")
            .field("accept_language", &self.accept_language)
            .finish_non_exhaustive()
    }
}

impl TunnelClient {
    pub fn new() -> Result<Self, TunnelError> {
        Ok(Self {
            connector: relaxed_connector()?,
            classifier: ResponseClassifier::new(),
            accept_language: accept_language("en", "us"),
        })
    }

    /// Use `Accept-Language` derived from a language/region pair.
    pub fn with_locale(mut self, language: &str, region: &str) -> Self {
        self.accept_language = accept_language(language, region);
        self
    }

    /// Fetch `url` through `proxy` and classify the result.
    pub async fn fetch_through_proxy(
        &self,
        url: &Url,
        proxy: &ProxyConfig,
        timeout: Duration,
    ) -> Result<ClassifiedResponse, TunnelError> {
        let response = self.fetch_raw(url, proxy, timeout).await?;
        Ok(self.classifier.classify_response(response))
    }

    /// Fetch `url` through `proxy` without classifying.
    pub async fn fetch_raw(
        &self,
        url: &Url,
        proxy: &ProxyConfig,
        timeout: Duration,
    ) -> Result<TunnelResponse, TunnelError> {
        if url.scheme() != "https" {
            return Err(TunnelError::InvalidTarget(url.to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| TunnelError::InvalidTarget(url.to_string()))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(443);
        let authority = format!("{host}:{port}");
        let sni = server_name(&host).ok_or_else(|| TunnelError::InvalidTarget(host.clone()))?;

        let credentials = fresh_credentials(proxy);
        let user_agent = random_desktop_user_agent();
        let mut session = TunnelSession::new(timeout);
        log::debug!(
            "tunnel {} via {} ({}, session {})",
            authority,
            proxy.endpoint(),
            proxy.provider,
            credentials.session_id
        );

        let endpoint = proxy.endpoint();
        let tcp = session
            .advance(TunnelStage::TunnelEstablished, async {
                let mut tcp = TcpStream::connect(&endpoint)
                    .await
                    .map_err(|err| TunnelError::transport(TunnelStage::Connecting, err))?;
                let _ = tcp.set_nodelay(true);
                establish_tunnel(&mut tcp, &authority, &credentials, user_agent).await?;
                Ok(tcp)
            })
            .await?;

        let connector = self.connector.clone();
        let mut tls = session
            .advance(TunnelStage::TlsNegotiated, async {
                connector
                    .connect(sni, tcp)
                    .await
                    .map_err(|err| TunnelError::transport(TunnelStage::TlsNegotiated, err))
            })
            .await?;

        let request = build_get_request(url, &navigation_headers(user_agent, &self.accept_language));
        session
            .advance(TunnelStage::RequestSent, send_request(&mut tls, request.as_bytes()))
            .await?;

        session.enter(TunnelStage::ReadingResponse);
        let raw = session
            .advance(TunnelStage::Complete, receive_response(&mut tls))
            .await?;

        let elapsed_ms = session.elapsed_ms();
        log::debug!("{} -> {} in {}ms", url, raw.status, elapsed_ms);
        Ok(TunnelResponse {
            status_code: raw.status,
            headers: raw.headers,
            body: raw.body,
            elapsed_ms,
            session_id: credentials.session_id,
        })
    }
}

#[async_trait]
impl PageFetcher for TunnelClient {
    async fn fetch(
        &self,
        url: &Url,
        proxy: &ProxyConfig,
        timeout: Duration,
    ) -> Result<ClassifiedResponse, TunnelError> {
        self.fetch_through_proxy(url, proxy, timeout).await
    }
}
