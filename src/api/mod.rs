pub mod basic;
pub mod client_id;
pub mod fallback;
pub mod mock;
pub mod pooled;
pub mod session;
pub mod throttle;

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde_json::Value;

/// Status codes the provider uses to reject an anonymous credential.
pub const AUTH_ERROR_CODES: [u16; 3] = [401, 403, 429];

/// Transport trait: the minimal "perform a request, hand back status, headers
/// and body" contract shared by the full-featured and the fallback client.
/// Implementations: pooled::PooledTransport, basic::BasicTransport,
/// throttle::GatedTransport (decorator) and mock::MockTransport.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<HttpResponse, TransportError>;

    /// Return the transport's name (for logging and diagnostics)
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound request description. Query pairs are appended to whatever query
/// string `url` already carries.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub form: Option<Vec<(String, String)>>,
    pub timeout: Option<Duration>,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(Method::Head, url)
    }

    pub fn post(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        let mut req = Self::new(Method::Post, url);
        req.form = Some(form);
        req
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            form: None,
            timeout: None,
        }
    }

    pub fn query(mut self, pairs: &[(String, String)]) -> Self {
        self.query.extend(pairs.iter().cloned());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Full URL including the appended query pairs.
    pub fn full_url(&self) -> Result<url::Url, TransportError> {
        let mut url = url::Url::parse(&self.url).map_err(|e| TransportError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }
}

/// Transport-agnostic response: the status, reason phrase, final URL,
/// headers and the fully read body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub reason: String,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Produced locally (e.g. by the throttle) rather than by the provider.
    pub synthetic: bool,
}

impl HttpResponse {
    pub fn new(status: StatusCode, url: impl Into<String>, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            url: url.into(),
            headers,
            body,
            synthetic: false,
        }
    }

    /// A response fabricated locally, never sent over the network.
    pub fn synthetic(status: StatusCode, url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            url: url.into(),
            headers: HeaderMap::new(),
            body: Vec::new(),
            synthetic: true,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Provider rejected the credential. Local rejections never count.
    pub fn is_auth_error(&self) -> bool {
        !self.synthetic && AUTH_ERROR_CODES.contains(&self.status.as_u16())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parsed JSON body, `None` when the body is empty or not JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("transport worker failed: {0}")]
    Worker(String),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout { url: url.to_string() }
        } else {
            TransportError::Request {
                url: url.to_string(),
                source: err,
            }
        }
    }
}

/// Connection-level settings shared by both transport implementations.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub headers: HeaderMap,
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl TransportSettings {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(user_agent)?);
        Ok(Self {
            headers,
            proxy: None,
            timeout,
        })
    }

    /// Add the `Authorization: OAuth <token>` header used by the authenticated host.
    pub fn with_oauth_token(mut self, token: &str) -> anyhow::Result<Self> {
        let mut value = HeaderValue::from_str(&format!("OAuth {}", token))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }
}

/// User agent sent on every request.
pub fn user_agent() -> String {
    concat!("soundcloud-gateway/", env!("CARGO_PKG_VERSION")).to_string()
}
