use super::{HttpResponse, Method, Request, Transport, TransportError, TransportSettings};
use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use reqwest::redirect::Policy;
use reqwest::{Client, Proxy};

/// Full-featured transport backed by an async `reqwest::Client`: pooled
/// keep-alive connections, a cookie store and proxy support.
///
/// HEAD requests go through a second client that never follows redirects,
/// since the redirect status and `Location` header are what callers want.
pub struct PooledTransport {
    client: Client,
    no_redirect: Client,
}

impl PooledTransport {
    pub fn new(settings: &TransportSettings) -> Result<Self> {
        Ok(Self {
            client: Self::builder(settings)?.build()?,
            no_redirect: Self::builder(settings)?.redirect(Policy::none()).build()?,
        })
    }

    fn builder(settings: &TransportSettings) -> Result<reqwest::ClientBuilder> {
        let mut builder = Client::builder()
            .default_headers(settings.headers.clone())
            .cookie_store(true)
            .timeout(settings.timeout);
        if let Some(proxy) = &settings.proxy {
            builder = builder.proxy(Proxy::all(proxy.as_str())?);
        }
        Ok(builder)
    }
}

#[async_trait]
impl Transport for PooledTransport {
    fn name(&self) -> &str {
        "pooled"
    }

    async fn send(&self, request: Request) -> Result<HttpResponse, TransportError> {
        let url = request.full_url()?;
        let url_str = url.to_string();
        let builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Head => self.no_redirect.head(url),
            Method::Post => {
                let form = request.form.clone().unwrap_or_default();
                self.client.post(url).form(&form)
            }
        };
        let builder = match request.timeout {
            Some(t) => builder.timeout(t),
            None => builder,
        };

        let resp = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&url_str, e))?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        let headers = resp.headers().clone();
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(&url_str, e))?;
        debug!("{} {} -> {}", request.method, final_url, status);
        Ok(HttpResponse::new(status, final_url, headers, body.to_vec()))
    }
}
