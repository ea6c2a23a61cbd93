//! Resilient client for the SoundCloud REST API: throttled requests,
//! anonymous client id discovery, transport fallback and memoized lookups.
pub mod api;
pub mod cache;
pub mod config;
pub mod images;
pub mod models;
pub mod soundcloud;
pub mod transcoding;
pub mod util;
