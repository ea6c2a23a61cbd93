use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::client_id::DEFAULT_LANDING_PAGE;
use crate::api::throttle::ThrottleSettings;
use crate::transcoding::{DEFAULT_COMPRESSION, DEFAULT_PROTOCOL};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub soundcloud: SoundCloudConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Directory for the daily-rotated log file. Stdout only when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SoundCloudConfig {
    #[serde(default)]
    pub auth_token: String,
    #[serde(default = "default_explore_songs")]
    pub explore_songs: u32,
    #[serde(default = "default_stream_pref")]
    pub stream_pref: String,
    #[serde(default = "default_compression_pref")]
    pub compression_pref: String,

    // Registered application id, used for the v1 stream_url fallback
    #[serde(default = "default_app_client_id")]
    pub app_client_id: String,

    #[serde(default = "default_api_v1_base")]
    pub api_v1_base: String,
    #[serde(default = "default_api_v2_base")]
    pub api_v2_base: String,
    #[serde(default = "default_landing_page")]
    pub landing_page: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Bound on each landing-page and script fetch during client id discovery.
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,

    #[serde(default)]
    pub throttling: ThrottleSettings,
}

fn default_explore_songs() -> u32 { 25 }
fn default_stream_pref() -> String { DEFAULT_PROTOCOL.into() }
fn default_compression_pref() -> String { DEFAULT_COMPRESSION.into() }
fn default_app_client_id() -> String { "93e33e327fd8a9b77becd179652272e2".into() }
fn default_api_v1_base() -> String { "https://api.soundcloud.com".into() }
fn default_api_v2_base() -> String { "https://api-v2.soundcloud.com".into() }
fn default_landing_page() -> String { DEFAULT_LANDING_PAGE.into() }
fn default_request_timeout() -> u64 { 30 }
fn default_discovery_timeout() -> u64 { 5 }

impl Default for SoundCloudConfig {
    fn default() -> Self {
        Self {
            auth_token: String::new(),
            explore_songs: default_explore_songs(),
            stream_pref: default_stream_pref(),
            compression_pref: default_compression_pref(),
            app_client_id: default_app_client_id(),
            api_v1_base: default_api_v1_base(),
            api_v2_base: default_api_v2_base(),
            landing_page: default_landing_page(),
            request_timeout_secs: default_request_timeout(),
            discovery_timeout_secs: default_discovery_timeout(),
            throttling: ThrottleSettings::default(),
        }
    }
}

impl SoundCloudConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProxyConfig {
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    /// `scheme://[user:pass@]host[:port]`, or `None` without a hostname.
    pub fn url(&self) -> Option<String> {
        let host = self.hostname.as_deref().filter(|h| !h.is_empty())?;
        let scheme = self.scheme.as_deref().unwrap_or("http");
        let auth = match (&self.username, &self.password) {
            (Some(u), Some(p)) => format!(
                "{}:{}@",
                urlencoding::encode(u),
                urlencoding::encode(p)
            ),
            (Some(u), None) => format!("{}@", urlencoding::encode(u)),
            _ => String::new(),
        };
        let port = self.port.map(|p| format!(":{}", p)).unwrap_or_default();
        Some(format!("{}://{}{}{}", scheme, auth, host, port))
    }
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let cfg: Config = toml::from_str(s)?;
        Ok(cfg)
    }
}
