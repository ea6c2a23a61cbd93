use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ---- payloads returned by the provider ----

/// Track object as returned by either API host. Every field is optional;
/// absent or `null` keys take their default rather than failing the parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackData {
    pub kind: Option<String>,
    #[serde(deserialize_with = "lenient_id")]
    pub id: Option<String>,
    pub title: Option<String>,
    pub streamable: Option<bool>,
    pub policy: Option<String>,
    pub created_at: Option<String>,
    pub last_modified: Option<String>,
    pub genre: Option<String>,
    pub duration: Option<f64>,
    pub permalink_url: Option<String>,
    pub description: Option<String>,
    pub label_name: Option<String>,
    pub user: Option<UserData>,
    pub media: Option<Media>,
    pub stream_url: Option<String>,
    pub artwork_url: Option<String>,
}

impl TrackData {
    pub fn from_value(data: &Value) -> Option<Self> {
        match serde_json::from_value(data.clone()) {
            Ok(t) => Some(t),
            Err(e) => {
                log::debug!("Unparseable track payload: {}", e);
                None
            }
        }
    }

    pub fn transcodings(&self) -> &[Transcoding] {
        self.media
            .as_ref()
            .map(|m| m.transcodings.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Media {
    #[serde(deserialize_with = "null_as_default")]
    pub transcodings: Vec<Transcoding>,
}

/// One encoded variant (format x protocol) of a track's audio stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transcoding {
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
    pub preset: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub snipped: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub format: TranscodingFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodingFormat {
    #[serde(deserialize_with = "null_as_default")]
    pub protocol: String,
    #[serde(deserialize_with = "null_as_default")]
    pub mime_type: String,
}

impl Transcoding {
    pub fn new(url: &str, mime_type: &str, protocol: &str) -> Self {
        Self {
            url: url.to_string(),
            preset: None,
            snipped: false,
            format: TranscodingFormat {
                protocol: protocol.to_string(),
                mime_type: mime_type.to_string(),
            },
        }
    }

    pub fn preview(mut self) -> Self {
        self.snipped = true;
        self
    }

    /// A 30-second preview rather than the full stream.
    pub fn is_preview(&self) -> bool {
        self.snipped || self.url.contains("preview")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserData {
    #[serde(deserialize_with = "lenient_id")]
    pub id: Option<String>,
    pub username: Option<String>,
    pub permalink_url: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserData {
    pub fn from_value(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

/// A set (playlist). `tracks` stays raw so each entry can go through
/// `SoundCloudClient::parse_track` on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistData {
    pub kind: Option<String>,
    #[serde(deserialize_with = "lenient_id")]
    pub id: Option<String>,
    pub title: Option<String>,
    pub track_count: Option<u64>,
    pub artwork_url: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub tracks: Vec<Value>,
}

impl PlaylistData {
    pub fn from_value(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

/// Editorial selection: a curated group of playlists.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Selection {
    pub id: String,
    pub title: Option<String>,
    pub playlists: Vec<PlaylistData>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

// ---- domain objects handed to the browsing layer ----

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Album {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    pub uri: String,
    pub name: Option<String>,
    pub artists: Vec<Artist>,
    pub album: Option<Album>,
    /// `YYYY-MM-DD`
    pub date: Option<String>,
    /// Milliseconds since the epoch.
    pub last_modified: Option<i64>,
    pub genre: Option<String>,
    /// Milliseconds.
    pub length: u64,
    pub comment: String,
}
