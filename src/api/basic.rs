use super::{HttpResponse, Method, Request, Transport, TransportError, TransportSettings};
use async_trait::async_trait;
use log::debug;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use reqwest::Proxy;

/// Minimal fallback transport.
///
/// Every request runs on the blocking pool with a freshly built HTTP/1.1-only
/// client: no connection reuse, no cookie jar carried between requests. This
/// sidesteps the pooled client's stalls on the provider's landing page under
/// some network stacks. The blocking client is created and dropped on the
/// worker thread, never inside the async runtime.
pub struct BasicTransport {
    settings: TransportSettings,
}

impl BasicTransport {
    pub fn new(settings: &TransportSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }
}

fn perform(settings: &TransportSettings, request: &Request) -> Result<HttpResponse, TransportError> {
    let url = request.full_url()?;
    let url_str = url.to_string();

    let redirect = match request.method {
        Method::Head => Policy::none(),
        _ => Policy::default(),
    };
    let mut builder = Client::builder()
        .default_headers(settings.headers.clone())
        .http1_only()
        .pool_max_idle_per_host(0)
        .redirect(redirect)
        .timeout(request.timeout.unwrap_or(settings.timeout));
    if let Some(proxy) = &settings.proxy {
        let proxy = Proxy::all(proxy.as_str()).map_err(|e| TransportError::from_reqwest(&url_str, e))?;
        builder = builder.proxy(proxy);
    }
    let client = builder
        .build()
        .map_err(|e| TransportError::from_reqwest(&url_str, e))?;

    let req = match request.method {
        Method::Get => client.get(url),
        Method::Head => client.head(url),
        Method::Post => client.post(url).form(&request.form.clone().unwrap_or_default()),
    };
    let resp = req.send().map_err(|e| TransportError::from_reqwest(&url_str, e))?;
    let status = resp.status();
    let final_url = resp.url().to_string();
    let headers = resp.headers().clone();
    let body = resp
        .bytes()
        .map_err(|e| TransportError::from_reqwest(&url_str, e))?;
    debug!("{} {} -> {} (basic)", request.method, final_url, status);
    Ok(HttpResponse::new(status, final_url, headers, body.to_vec()))
}

#[async_trait]
impl Transport for BasicTransport {
    fn name(&self) -> &str {
        "basic"
    }

    async fn send(&self, request: Request) -> Result<HttpResponse, TransportError> {
        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || perform(&settings, &request))
            .await
            .map_err(|e| TransportError::Worker(e.to_string()))?
    }
}
