use std::sync::Arc;

use anyhow::Result;
use log::{debug, error};
use serde_json::{Map, Value};

use super::basic::BasicTransport;
use super::client_id::ClientIdBroker;
use super::fallback::TransportSelector;
use super::pooled::PooledTransport;
use super::throttle::GatedTransport;
use super::{user_agent, HttpResponse, Request, Transport, TransportError, TransportSettings};
use crate::config::Config;
use crate::models::Transcoding;

/// Page size requested through the `limit` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// The configured `explore_songs` page size.
    Default,
    Count(u32),
}

/// Request facade for one API host.
///
/// An authenticated session sends `Authorization: OAuth <token>` and never
/// touches the anonymous credential. An anonymous session appends
/// `client_id=<credential>` to every request, discovers the credential lazily
/// and refreshes it once per call when the provider rejects it.
pub struct SoundCloudSession {
    api_host: String,
    explore_songs: u32,
    oauth: bool,
    transports: TransportSelector,
    broker: ClientIdBroker,
}

impl SoundCloudSession {
    /// Build a session with the pooled transport as primary and the basic
    /// transport as fallback, each behind its own HEAD throttle.
    pub fn new(config: &Config, api_host: &str, oauth: bool) -> Result<Self> {
        let sc = &config.soundcloud;
        let mut settings = TransportSettings::new(&user_agent(), sc.request_timeout())?
            .with_proxy(config.proxy.url());
        if oauth {
            settings = settings.with_oauth_token(&sc.auth_token)?;
        }

        let primary = GatedTransport::new(PooledTransport::new(&settings)?, sc.throttling);
        let fallback = GatedTransport::new(BasicTransport::new(&settings), sc.throttling);
        let broker = ClientIdBroker::new(sc.landing_page.clone(), sc.discovery_timeout());
        Ok(Self::with_transports(
            api_host,
            sc.explore_songs,
            oauth,
            Arc::new(primary),
            Some(Arc::new(fallback)),
            broker,
        ))
    }

    pub fn with_transports(
        api_host: impl Into<String>,
        explore_songs: u32,
        oauth: bool,
        primary: Arc<dyn Transport>,
        fallback: Option<Arc<dyn Transport>>,
        broker: ClientIdBroker,
    ) -> Self {
        Self {
            api_host: api_host.into().trim_end_matches('/').to_string(),
            explore_songs,
            oauth,
            transports: TransportSelector::new(primary, fallback),
            broker,
        }
    }

    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    pub fn is_oauth(&self) -> bool {
        self.oauth
    }

    pub fn client_id(&self) -> Option<String> {
        self.broker.current()
    }

    pub fn set_client_id(&self, client_id: Option<String>) {
        self.broker.set(client_id);
    }

    /// Name of the transport currently in use.
    pub fn transport_name(&self) -> String {
        self.transports.current_name()
    }

    /// Force a credential discovery, replacing the current one.
    pub async fn update_public_client_id(&self) -> Option<String> {
        let current = self.broker.current();
        self.broker.refresh(&self.transports, current.as_deref()).await
    }

    /// GET `{api_host}/{path}` and return the parsed JSON body.
    ///
    /// Any failure (non-2xx, transport error, invalid JSON) is logged and
    /// yields an empty mapping: callers treat that as "no data".
    pub async fn get(&self, path: &str, limit: Option<Limit>) -> Value {
        let url = format!("{}/{}", self.api_host, path.trim_start_matches('/'));
        let mut request = Request::get(url);
        if let Some(limit) = limit {
            let n = match limit {
                Limit::Count(n) => n,
                Limit::Default => self.explore_songs,
            };
            request = request.query(&[("limit".to_string(), n.to_string())]);
        }

        match self.send_with_credential(request).await {
            Ok(resp) if resp.is_success() => {
                debug!("Requested {}", resp.url);
                resp.json().unwrap_or_else(|| {
                    error!("SoundCloud API request failed: invalid JSON from {}", resp.url);
                    empty()
                })
            }
            Ok(resp) => {
                self.log_failure(&resp);
                empty()
            }
            Err(e) => {
                error!("SoundCloud API request failed: {}", e);
                empty()
            }
        }
    }

    /// HEAD `url`. Subject to the transport's throttle; a locally rejected
    /// request comes back as a synthetic 429.
    pub async fn head(&self, url: &str) -> Result<HttpResponse> {
        Ok(self.send_with_credential(Request::head(url)).await?)
    }

    /// GET the transcoding's stream-resolution URL.
    pub async fn get_stream(&self, transcoding: &Transcoding) -> Result<HttpResponse> {
        Ok(self
            .send_with_credential(Request::get(transcoding.url.as_str()))
            .await?)
    }

    /// Send with the current credential; on a credential rejection refresh it
    /// once and retry once. A second rejection is returned as is.
    ///
    /// Discovery runs at most once per call: a credential that was just
    /// discovered (or could not be) is not refreshed again, and no retry is
    /// sent when the refresh leaves the credential unchanged.
    async fn send_with_credential(&self, request: Request) -> Result<HttpResponse, TransportError> {
        if self.oauth {
            return self.transports.current().send(request).await;
        }

        let (client_id, discovered) = match self.broker.current() {
            Some(id) => (Some(id), false),
            None => (self.broker.refresh(&self.transports, None).await, true),
        };
        let resp = self
            .transports
            .current()
            .send(request.clone().query(&credential_params(client_id.as_deref())))
            .await?;
        if !resp.is_auth_error() || discovered {
            return Ok(resp);
        }

        debug!(
            "Public client id rejected with {} for {}; refreshing once",
            resp.status, resp.url
        );
        let refreshed = self.broker.refresh(&self.transports, client_id.as_deref()).await;
        if refreshed == client_id {
            debug!("Public client id unchanged after refresh; not retrying");
            return Ok(resp);
        }
        self.transports
            .current()
            .send(request.query(&credential_params(refreshed.as_deref())))
            .await
    }

    fn log_failure(&self, resp: &HttpResponse) {
        if self.oauth && resp.status.as_u16() == 401 {
            error!("Invalid \"auth_token\" used for SoundCloud authentication!");
        } else {
            error!("SoundCloud API request failed: {}", status_message(resp));
        }
    }
}

fn credential_params(client_id: Option<&str>) -> Vec<(String, String)> {
    client_id
        .map(|id| vec![("client_id".to_string(), id.to_string())])
        .unwrap_or_default()
}

fn empty() -> Value {
    Value::Object(Map::new())
}

/// `"404 Client Error: Not Found for url: ..."`
pub fn status_message(resp: &HttpResponse) -> String {
    let class = if resp.status.is_client_error() {
        "Client Error"
    } else if resp.status.is_server_error() {
        "Server Error"
    } else {
        "Error"
    };
    format!(
        "{} {}: {} for url: {}",
        resp.status.as_u16(),
        class,
        resp.reason,
        resp.url
    )
}
