//! Discovery and refresh of the anonymous `client_id` credential.
//!
//! The public host requires a `client_id` query parameter but the provider
//! issues none through a documented flow. The broker scrapes one from the
//! JavaScript bundles referenced by the provider's landing page.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{debug, error, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use super::fallback::TransportSelector;
use super::{HttpResponse, Request, Transport, TransportError};

pub const DEFAULT_LANDING_PAGE: &str = "https://soundcloud.com/";

static SCRIPT_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<script\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("valid script regex")
});

static CLIENT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"client_id=([a-zA-Z0-9]{16,})").expect("valid client_id regex"));

/// Owns the process-wide anonymous credential for one session.
pub struct ClientIdBroker {
    landing_page: String,
    timeout: Duration,
    credential: RwLock<Option<String>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl ClientIdBroker {
    pub fn new(landing_page: impl Into<String>, timeout: Duration) -> Self {
        Self {
            landing_page: landing_page.into(),
            timeout,
            credential: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn current(&self) -> Option<String> {
        self.credential
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn set(&self, client_id: Option<String>) {
        *self.credential.write().unwrap_or_else(|p| p.into_inner()) = client_id;
    }

    /// Replace the credential that just failed (`stale`).
    ///
    /// Refreshes are serialized. If another caller already replaced `stale`
    /// while this one waited, its result is adopted without a second
    /// discovery. When discovery finds nothing, the credential is left as is.
    pub async fn refresh(&self, transports: &TransportSelector, stale: Option<&str>) -> Option<String> {
        let _guard = self.refresh_lock.lock().await;
        let current = self.current();
        if current.as_deref() != stale {
            debug!("SoundCloud public client id was already refreshed");
            return current;
        }

        match self.discover(transports).await {
            Ok(Some(client_id)) => {
                debug!("Updated SoundCloud public client id to: {}", client_id);
                self.set(Some(client_id.clone()));
                Some(client_id)
            }
            Ok(None) => {
                warn!("Failed to obtain public client id");
                current
            }
            Err(e) => {
                error!("Failed to obtain public client id: {}", e);
                current
            }
        }
    }

    async fn discover(&self, transports: &TransportSelector) -> Result<Option<String>, TransportError> {
        let page = match self.fetch(transports.current(), &self.landing_page).await {
            Ok(page) => page,
            Err(e) if e.is_timeout() => {
                let reason = format!("timeout in {} transport: {}", transports.current_name(), e);
                if !transports.fall_back(&reason) {
                    return Err(e);
                }
                self.fetch(transports.current(), &self.landing_page).await?
            }
            Err(e) => return Err(e),
        };

        let transport = transports.current();
        let scripts = script_sources(&page.text(), &page.url);
        debug!("Scanning {} script(s) for a client id", scripts.len());
        for src in scripts {
            let script = match self.fetch(transport.clone(), &src).await {
                Ok(resp) if resp.is_success() => resp,
                Ok(resp) => {
                    debug!("Skipping script {} ({})", src, resp.status);
                    continue;
                }
                Err(e) => {
                    debug!("Skipping script {}: {}", src, e);
                    continue;
                }
            };
            if let Some(client_id) = scan_client_id(&script.text()) {
                return Ok(Some(client_id));
            }
        }
        Ok(None)
    }

    async fn fetch(&self, transport: Arc<dyn Transport>, url: &str) -> Result<HttpResponse, TransportError> {
        transport.send(Request::get(url).timeout(self.timeout)).await
    }
}

/// `src` attributes of the page's `<script>` tags, resolved against `base`.
pub fn script_sources(html: &str, base: &str) -> Vec<String> {
    let base = url::Url::parse(base).ok();
    SCRIPT_SRC
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .filter_map(|m| match &base {
            Some(b) => b.join(m.as_str()).ok().map(|u| u.to_string()),
            None => Some(m.as_str().to_string()),
        })
        .collect()
}

/// First `client_id=<16+ alphanumerics>` occurrence in `text`.
pub fn scan_client_id(text: &str) -> Option<String> {
    CLIENT_ID
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_script_sources_and_resolves_relative_ones() {
        let html = r#"<html><head>
            <script crossorigin src="https://a-v2.sndcdn.com/assets/0-abc.js"></script>
            <script>window.inline = true;</script>
            <script type="text/javascript" src='/assets/app.js'></script>
        </head></html>"#;
        let srcs = script_sources(html, "https://soundcloud.com/");
        assert_eq!(
            srcs,
            vec![
                "https://a-v2.sndcdn.com/assets/0-abc.js".to_string(),
                "https://soundcloud.com/assets/app.js".to_string(),
            ]
        );
    }

    #[test]
    fn scans_first_long_enough_client_id() {
        let js = r#"a="client_id=short";b="?client_id=AbCdEfGh12345678XYZ&x=1";c="client_id=ZZZZZZZZZZZZZZZZZZ""#;
        assert_eq!(scan_client_id(js).as_deref(), Some("AbCdEfGh12345678XYZ"));
        assert_eq!(scan_client_id("nothing here"), None);
    }
}
