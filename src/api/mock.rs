use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use tracing::info;

use super::{HttpResponse, Method, Request, Transport, TransportError};

/// Scripted outcome for a mocked route.
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond {
        status: u16,
        headers: Vec<(String, String)>,
        body: String,
    },
    Timeout,
}

impl MockReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        MockReply::Respond {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        MockReply::Respond {
            status: 302,
            headers: vec![("location".to_string(), location.into())],
            body: String::new(),
        }
    }
}

struct Route {
    method: Method,
    url_contains: String,
    reply: MockReply,
}

/// An in-memory transport used in tests. Routes match on method and a URL
/// substring, first match wins; unmatched requests get a 404. Every request
/// is recorded with its full URL.
pub struct MockTransport {
    name: String,
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<(Method, String)>>,
}

impl MockTransport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            routes: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn route(self, method: Method, url_contains: &str, reply: MockReply) -> Self {
        self.routes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Route {
                method,
                url_contains: url_contains.to_string(),
                reply,
            });
        self
    }

    pub fn requests(&self) -> Vec<(Method, String)> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Number of recorded requests whose URL contains `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.requests()
            .iter()
            .filter(|(_, url)| url.contains(needle))
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, request: Request) -> Result<HttpResponse, TransportError> {
        let url = request.full_url()?.to_string();
        info!("MockTransport({}): {} {}", self.name, request.method, url);
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((request.method, url.clone()));

        let reply = self
            .routes
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .find(|r| r.method == request.method && url.contains(&r.url_contains))
            .map(|r| r.reply.clone());

        match reply {
            Some(MockReply::Timeout) => Err(TransportError::Timeout { url }),
            Some(MockReply::Respond { status, headers, body }) => {
                let status = StatusCode::from_u16(status)
                    .map_err(|e| TransportError::Worker(e.to_string()))?;
                let mut map = HeaderMap::new();
                for (k, v) in headers {
                    let name = HeaderName::from_bytes(k.as_bytes())
                        .map_err(|e| TransportError::Worker(e.to_string()))?;
                    let value = HeaderValue::from_str(&v)
                        .map_err(|e| TransportError::Worker(e.to_string()))?;
                    map.insert(name, value);
                }
                Ok(HttpResponse::new(status, url, map, body.into_bytes()))
            }
            None => Ok(HttpResponse::new(StatusCode::NOT_FOUND, url, HeaderMap::new(), Vec::new())),
        }
    }
}
