use std::collections::HashMap;

use anyhow::Result;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::api::session::{Limit, SoundCloudSession};
use crate::cache::{CachePolicy, Memo};
use crate::config::{Config, SoundCloudConfig};
use crate::images::{images_for, parse_image_uri, Image, ImageTarget};
use crate::models::{Album, Artist, PlaylistData, Selection, Track, TrackData, UserData};
use crate::transcoding::pick_transcoding;
use crate::util::{get_datetime, get_user_url, parse_fail_reason, timestamp_millis, track_uri};

const PREVIEW_SUFFIX: &str = " - Preview (Get SoundCloud GO for full stream)";
const IMAGE_FETCH_CONCURRENCY: usize = 4;

/// Domain operations over the two API hosts.
///
/// User-specific calls go through the authenticated (v1) session, public
/// browsing and streaming through the anonymous (v2) one. Nothing here
/// returns an error for an ordinary provider failure: callers get an empty
/// collection or `None`.
pub struct SoundCloudClient {
    oauth: SoundCloudSession,
    public: SoundCloudSession,
    stream_pref: String,
    compression_pref: String,
    app_client_id: String,

    user: Memo<(), Option<UserData>>,
    user_stream: Memo<(), Vec<Track>>,
    followings: Memo<Option<String>, Vec<UserData>>,
    sets: Memo<String, Option<PlaylistData>>,
    user_sets: Memo<Option<String>, Vec<PlaylistData>>,
    favorites: Memo<Option<String>, Vec<Track>>,
    user_tracks: Memo<Option<String>, Vec<Track>>,
    selections: Memo<u32, Vec<Selection>>,
    parsed_tracks: Memo<(String, bool), Option<Track>>,
    tracks: Memo<String, Value>,
    parsed: Memo<(String, bool), Option<Track>>,
}

impl SoundCloudClient {
    pub fn new(config: &Config) -> Result<Self> {
        let sc = &config.soundcloud;
        let oauth = SoundCloudSession::new(config, &sc.api_v1_base, true)?;
        let public = SoundCloudSession::new(config, &sc.api_v2_base, false)?;
        Ok(Self::from_sessions(sc, oauth, public))
    }

    pub fn from_sessions(
        config: &SoundCloudConfig,
        oauth: SoundCloudSession,
        public: SoundCloudSession,
    ) -> Self {
        let listing = CachePolicy::with_ttl_secs(10);
        Self {
            oauth,
            public,
            stream_pref: config.stream_pref.clone(),
            compression_pref: config.compression_pref.clone(),
            app_client_id: config.app_client_id.clone(),
            user: Memo::default(),
            user_stream: Memo::new(listing),
            followings: Memo::new(listing),
            sets: Memo::default(),
            user_sets: Memo::new(listing),
            favorites: Memo::new(listing),
            user_tracks: Memo::new(listing),
            selections: Memo::new(CachePolicy::with_ttl_secs(600)),
            parsed_tracks: Memo::default(),
            tracks: Memo::new(CachePolicy::default().unbounded_hits()),
            parsed: Memo::default(),
        }
    }

    pub fn oauth_session(&self) -> &SoundCloudSession {
        &self.oauth
    }

    pub fn public_session(&self) -> &SoundCloudSession {
        &self.public
    }

    /// Profile of the authenticated user.
    pub async fn user(&self) -> Option<UserData> {
        self.user
            .call(&(), || async {
                let me = self.oauth.get("me", None).await;
                if truthy(&me) {
                    UserData::from_value(&me)
                } else {
                    None
                }
            })
            .await
    }

    /// Tracks from the activity feed, including those of posted playlists.
    pub async fn get_user_stream(&self) -> Vec<Track> {
        self.user_stream
            .call(&(), || async {
                let stream = self.oauth.get("me/activities", Some(Limit::Default)).await;
                let mut tracks = Vec::new();
                for activity in items(&stream) {
                    let origin = match activity.get("origin") {
                        Some(o) if truthy(o) => o,
                        _ => continue,
                    };
                    match origin.get("kind").and_then(Value::as_str) {
                        Some("track") => tracks.extend(self.parse_track(origin, false).await),
                        Some("playlist") => {
                            if let Some(Value::Array(playlist)) = origin.get("tracks") {
                                tracks.extend(self.parse_results(playlist).await);
                            }
                        }
                        _ => {}
                    }
                }
                tracks
            })
            .await
    }

    pub async fn get_user_followings(&self, user_id: Option<&str>) -> Vec<UserData> {
        let key = user_id.map(str::to_string);
        self.followings
            .call(&key, || async {
                let path = format!("{}/followings", get_user_url(user_id));
                let followings = self.oauth.get(&path, Some(Limit::Default)).await;
                items(&followings)
                    .iter()
                    .filter_map(UserData::from_value)
                    .inspect(|u| {
                        debug!(
                            "Fetched user {} with ID {}",
                            u.username.as_deref().unwrap_or_default(),
                            u.id.as_deref().unwrap_or_default()
                        )
                    })
                    .collect()
            })
            .await
    }

    pub async fn get_set(&self, set_id: &str) -> Option<PlaylistData> {
        self.sets
            .call(set_id, || async {
                let set = self.oauth.get(&format!("playlists/{}", set_id), None).await;
                if truthy(&set) {
                    PlaylistData::from_value(&set)
                } else {
                    None
                }
            })
            .await
    }

    /// Raw track payloads of a set.
    pub async fn get_set_tracks(&self, set_id: &str) -> Vec<Value> {
        self.get_set(set_id)
            .await
            .map(|set| set.tracks)
            .unwrap_or_default()
    }

    pub async fn get_user_sets(&self, user_id: Option<&str>) -> Vec<PlaylistData> {
        let key = user_id.map(str::to_string);
        self.user_sets
            .call(&key, || async {
                let path = format!("{}/playlists", get_user_url(user_id));
                let sets = self.oauth.get(&path, Some(Limit::Default)).await;
                items(&sets)
                    .iter()
                    .filter_map(PlaylistData::from_value)
                    .inspect(|set| {
                        debug!(
                            "Fetched set {} with ID {} ({} tracks)",
                            set.title.as_deref().unwrap_or_default(),
                            set.id.as_deref().unwrap_or_default(),
                            set.tracks.len()
                        )
                    })
                    .collect()
            })
            .await
    }

    /// Liked tracks.
    pub async fn get_user_favorites(&self, user_id: Option<&str>) -> Vec<Track> {
        let key = user_id.map(str::to_string);
        self.favorites
            .call(&key, || async {
                let path = format!("{}/favorites", get_user_url(user_id));
                let likes = self.oauth.get(&path, Some(Limit::Default)).await;
                self.parse_results(&items(&likes)).await
            })
            .await
    }

    pub async fn get_user_tracks(&self, user_id: Option<&str>) -> Vec<Track> {
        let key = user_id.map(str::to_string);
        self.user_tracks
            .call(&key, || async {
                let path = format!("{}/tracks", get_user_url(user_id));
                let tracks = self.oauth.get(&path, Some(Limit::Default)).await;
                self.parse_results(&items(&tracks)).await
            })
            .await
    }

    /// Editorial selections with their playlists.
    pub async fn get_selections(&self, limit: u32) -> Vec<Selection> {
        self.selections
            .call(&limit, || async {
                let explored = self.public.get("mixed-selections", Some(Limit::Count(limit))).await;
                items(&explored)
                    .iter()
                    .enumerate()
                    .map(|(i, selection)| {
                        let id = match selection.get("id") {
                            Some(Value::String(s)) => s.clone(),
                            Some(Value::Number(n)) => n.to_string(),
                            _ => format!("selection-{}", i),
                        };
                        let playlists: Vec<PlaylistData> = selection
                            .get("items")
                            .map(items)
                            .unwrap_or_default()
                            .iter()
                            .filter_map(PlaylistData::from_value)
                            .collect();
                        let title = selection.get("title").and_then(Value::as_str).map(str::to_string);
                        debug!(
                            "Fetched selection {} with ID {} ({} playlists)",
                            title.as_deref().unwrap_or_default(),
                            id,
                            playlists.len()
                        );
                        Selection { id, title, playlists }
                    })
                    .collect()
            })
            .await
    }

    pub async fn get_parsed_track(&self, track_id: &str, stream: bool) -> Option<Track> {
        let key = (track_id.to_string(), stream);
        self.parsed_tracks
            .call(&key, || async {
                let track = self.get_track(track_id).await;
                self.parse_track(&track, stream).await
            })
            .await
    }

    /// Raw track payload. The public host is asked first and its answer is
    /// only used when it carries `media`; otherwise the authenticated host.
    ///
    /// An empty answer from both hosts is returned but not kept.
    pub async fn get_track(&self, track_id: &str) -> Value {
        let track = self
            .tracks
            .call(track_id, || async {
                debug!("Getting info for track with ID {}", track_id);
                let path = format!("tracks/{}", track_id);
                let res = self.public.get(&path, None).await;
                if res.get("media").map_or(false, truthy) {
                    return res;
                }
                debug!(
                    "Failed public (API-v2) call with url: {}. Trying OAuth (API-v1) call",
                    path
                );
                self.oauth.get(&path, None).await
            })
            .await;
        if !truthy(&track) {
            self.tracks.forget(track_id).await;
        }
        track
    }

    /// Fetch several tracks in one request, falling back to one request per
    /// id (in parallel, order kept) when the batch yields nothing.
    pub async fn get_tracks_batch(&self, track_ids: &[String]) -> Vec<Value> {
        let ids = track_ids.join(",");
        debug!("Getting info for tracks with IDs {}", ids);
        let batch = self.public.get(&format!("tracks?ids={}", ids), None).await;
        match batch {
            Value::Array(tracks) if !tracks.is_empty() => tracks,
            _ => join_all(track_ids.iter().map(|id| self.get_track(id))).await,
        }
    }

    pub async fn search(&self, query: &str) -> Vec<Track> {
        let query: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let results = self
            .oauth
            .get(&format!("tracks?q={}", query), Some(Limit::Default))
            .await;
        let mut tracks = Vec::new();
        for track in items(&results) {
            tracks.extend(self.parse_track(&track, false).await);
        }
        tracks
    }

    /// Flatten `track` items and the tracks of `playlist` items.
    pub async fn parse_results(&self, results: &[Value]) -> Vec<Track> {
        debug!("Parsing {} result item(s)...", results.len());
        let mut tracks = Vec::new();
        for item in results {
            match item.get("kind").and_then(Value::as_str) {
                Some("track") => tracks.extend(self.parse_track(item, false).await),
                Some("playlist") => {
                    let playlist = item.get("tracks").map(items).unwrap_or_default();
                    debug!("Parsing {} playlist track(s)...", playlist.len());
                    for track in &playlist {
                        tracks.extend(self.parse_track(track, false).await);
                    }
                }
                Some(kind) => warn!("Unknown item type {:?}", kind),
                None if truthy(item) => warn!("Result item without a kind"),
                None => {}
            }
        }
        tracks
    }

    pub async fn resolve_url(&self, url: &str) -> Vec<Track> {
        let res = self
            .oauth
            .get(&format!("resolve?url={}", urlencoding::encode(url)), None)
            .await;
        self.parse_results(&[res]).await
    }

    /// Map a track payload to a [`Track`]. `None` for empty payloads,
    /// unstreamable tracks and non-track items. With `stream` set the URI is
    /// the resolved stream URL instead of a `soundcloud:song/...` URI.
    pub async fn parse_track(&self, data: &Value, stream: bool) -> Option<Track> {
        self.parsed
            .call(&(data, stream), || self.build_track(data, stream))
            .await
    }

    async fn build_track(&self, data: &Value, stream: bool) -> Option<Track> {
        if !truthy(data) {
            return None;
        }
        let track = TrackData::from_value(data)?;
        let title = track.title.clone();
        if track.streamable != Some(true) {
            info!("{:?} can't be streamed from SoundCloud", title.as_deref().unwrap_or_default());
            return None;
        }
        if track.kind.as_deref() != Some("track") {
            debug!("{} is not a track", title.as_deref().unwrap_or_default());
            return None;
        }

        let (artists, album) = match &title {
            Some(_) => {
                let artist = track
                    .label_name
                    .clone()
                    .filter(|l| !l.is_empty())
                    .or_else(|| track.user.as_ref().and_then(|u| u.username.clone()))
                    .unwrap_or_else(|| "Unknown label".to_string());
                let mut album = "SoundCloud".to_string();
                if track.policy.as_deref() == Some("SNIP") {
                    album.push_str(PREVIEW_SUFFIX);
                }
                (vec![Artist { name: artist }], Some(Album { name: album }))
            }
            None => (Vec::new(), None),
        };

        let uri = if stream {
            match self.get_streamable_url(&track).await {
                Some(url) => url,
                None => {
                    info!("{} can't be streamed from SoundCloud", title.as_deref().unwrap_or_default());
                    return None;
                }
            }
        } else {
            track_uri(
                title.as_deref().unwrap_or_default(),
                track.id.as_deref().unwrap_or_default(),
            )
        };

        let mut comment = track.permalink_url.clone().unwrap_or_default();
        if let Some(description) = track.description.as_deref().filter(|d| !d.is_empty()) {
            comment.push_str(" - ");
            comment.push_str(description);
        }

        Some(Track {
            uri,
            name: title,
            artists,
            album,
            date: track
                .created_at
                .as_deref()
                .and_then(get_datetime)
                .map(|d| d.format("%Y-%m-%d").to_string()),
            last_modified: track
                .last_modified
                .as_deref()
                .and_then(get_datetime)
                .map(|d| timestamp_millis(&d)),
            genre: track.genre.clone(),
            length: track.duration.unwrap_or(0.0).max(0.0) as u64,
            comment,
        })
    }

    /// Resolve a playable URL: the picked transcoding through the public
    /// host first, then the v1 `stream_url` redirect with the application id.
    pub async fn get_streamable_url(&self, track: &TrackData) -> Option<String> {
        let picked = pick_transcoding(track.transcodings(), &self.compression_pref, &self.stream_pref);
        if let Some(transcoding) = picked {
            let failure = match self.public.get_stream(transcoding).await {
                Ok(resp) => {
                    let url = resp
                        .json()
                        .and_then(|v| v.get("url").and_then(Value::as_str).map(str::to_string));
                    if url.is_some() {
                        return url;
                    }
                    format!("{} {}", resp.status, parse_fail_reason(&resp.reason))
                }
                Err(e) => e.to_string(),
            };
            info!(
                "Streaming of public song using public client id failed, \
                 trying with standard application client id.."
            );
            debug!("Caught public client id stream failure: {}", failure);
        }

        let stream_url = match &track.stream_url {
            Some(url) => url.clone(),
            None => {
                let id = track.id.as_deref()?;
                let full = self.oauth.get(&format!("tracks/{}", id), None).await;
                TrackData::from_value(&full)?.stream_url?
            }
        };

        let url = format!("{}?client_id={}", stream_url, self.app_client_id);
        match self.oauth.head(&url).await {
            Ok(resp) if resp.status.as_u16() == 302 => resp.header("location").map(str::to_string),
            Ok(resp) if resp.status.as_u16() == 429 => {
                warn!(
                    "SoundCloud daily rate limit exceeded on application client id {}",
                    parse_fail_reason(&resp.reason)
                );
                None
            }
            Ok(resp) => {
                debug!("No stream redirect for {} ({})", stream_url, resp.status);
                None
            }
            Err(e) => {
                error!("Stream URL lookup failed: {}", e);
                None
            }
        }
    }

    /// Artwork for song and playlist URIs, fetched with bounded parallelism.
    /// Unparseable URIs are skipped.
    pub async fn get_images(&self, uris: &[String]) -> HashMap<String, Vec<Image>> {
        let targets: Vec<_> = uris
            .iter()
            .filter_map(|u| match parse_image_uri(u) {
                Ok(target) => Some(target),
                Err(e) => {
                    debug!("{}", e);
                    None
                }
            })
            .collect();

        stream::iter(targets)
            .map(|target| async move {
                let images = match target.target {
                    ImageTarget::Playlist => self
                        .get_set_tracks(&target.id)
                        .await
                        .iter()
                        .flat_map(images_for)
                        .collect(),
                    _ => images_for(&self.get_track(&target.id).await),
                };
                (target.uri, images)
            })
            .buffer_unordered(IMAGE_FETCH_CONCURRENCY)
            .collect()
            .await
    }
}

/// Whether a JSON value carries data. Empty containers and strings, zero,
/// `false` and `null` do not.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Entries of a listing: either a bare array or a `{"collection": [...]}` page.
fn items(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(a) => a.clone(),
        Value::Object(o) => match o.get("collection") {
            Some(Value::Array(a)) => a.clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
