//! Client-side burst limiter for HEAD requests.
//!
//! Redirect-based stream URLs are resolved with HEAD requests, and bursts of
//! those trip the provider's own rate limiter. The [`Throttle`] lets
//! `burst_length` requests through within `burst_window`, then rejects
//! locally until `burst_window + wait_window` has elapsed since the window
//! opened. Rejections never reach the network: [`GatedTransport`] answers
//! them with a synthetic 429.
//!
//! This is per-process and best-effort; nothing is coordinated across
//! processes or machines.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::time::Instant;

use super::{HttpResponse, Method, Request, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ThrottleSettings {
    #[serde(default = "default_burst_length")]
    pub burst_length: u32,
    #[serde(default = "default_burst_window")]
    pub burst_window_secs: u64,
    #[serde(default = "default_wait_window")]
    pub wait_window_secs: u64,
}

fn default_burst_length() -> u32 { 3 }
fn default_burst_window() -> u64 { 1 }
fn default_wait_window() -> u64 { 10 }

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            burst_length: default_burst_length(),
            burst_window_secs: default_burst_window(),
            wait_window_secs: default_wait_window(),
        }
    }
}

impl ThrottleSettings {
    pub fn burst_window(&self) -> Duration {
        Duration::from_secs(self.burst_window_secs)
    }

    pub fn total_window(&self) -> Duration {
        Duration::from_secs(self.burst_window_secs + self.wait_window_secs)
    }

    /// Nominal allowed rate, requests per second.
    pub fn rate(&self) -> f64 {
        if self.burst_window_secs == 0 {
            return f64::from(self.burst_length);
        }
        f64::from(self.burst_length) / self.burst_window_secs as f64
    }
}

#[derive(Debug, Default)]
struct RateWindow {
    hits: u32,
    started: Option<Instant>,
}

/// A request refused by the [`Throttle`].
#[derive(Debug, Clone, PartialEq)]
pub struct Throttled {
    pub reason: String,
}

#[derive(Debug)]
pub struct Throttle {
    settings: ThrottleSettings,
    window: Mutex<RateWindow>,
}

impl Throttle {
    pub fn new(settings: ThrottleSettings) -> Self {
        Self {
            settings,
            window: Mutex::new(RateWindow::default()),
        }
    }

    pub fn settings(&self) -> ThrottleSettings {
        self.settings
    }

    /// Record one request and decide whether it may go out.
    pub fn admit(&self) -> Result<(), Throttled> {
        let now = Instant::now();
        let mut window = self.window.lock().unwrap_or_else(|p| p.into_inner());

        let started = match window.started {
            Some(s) if now < s + self.settings.total_window() => s,
            _ => {
                window.started = Some(now);
                window.hits = 0;
                return Ok(());
            }
        };

        window.hits += 1;
        if now < started + self.settings.burst_window() && window.hits < self.settings.burst_length {
            return Ok(());
        }

        let elapsed = now.saturating_duration_since(started);
        debug!(
            "Request throttling after {} hits in {} us (window open for another {:?})",
            window.hits,
            elapsed.as_micros(),
            self.settings.total_window().saturating_sub(elapsed)
        );
        Err(Throttled {
            reason: format!(
                "Client throttled to {:.1} requests per second",
                self.settings.rate()
            ),
        })
    }
}

/// Decorator applying a [`Throttle`] to the HEAD requests of an inner
/// transport. Other methods pass through untouched.
pub struct GatedTransport<T> {
    inner: T,
    throttle: Throttle,
}

impl<T: Transport> GatedTransport<T> {
    pub fn new(inner: T, settings: ThrottleSettings) -> Self {
        Self {
            inner,
            throttle: Throttle::new(settings),
        }
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for GatedTransport<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(&self, request: Request) -> Result<HttpResponse, TransportError> {
        if request.method == Method::Head {
            if let Err(throttled) = self.throttle.admit() {
                return Ok(HttpResponse::synthetic(
                    StatusCode::TOO_MANY_REQUESTS,
                    request.url,
                    throttled.reason,
                ));
            }
        }
        self.inner.send(request).await
    }
}
