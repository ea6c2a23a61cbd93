use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value;

use crate::util::parse_track_uri;

/// Artwork size tokens and their edge length in pixels. `original` has no
/// fixed size.
const ARTWORK_SIZES: [(&str, u32); 10] = [
    ("mini", 16),
    ("tiny", 20),
    ("small", 32),
    ("badge", 47),
    ("t67x67", 67),
    ("large", 100),
    ("t300x300", 300),
    ("crop", 400),
    ("t500x500", 500),
    ("original", 0),
];

pub const PREFERRED_SIZE: &str = "t500x500";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub uri: String,
    pub width: u32,
    pub height: u32,
}

pub fn artwork_size(token: &str) -> Option<u32> {
    ARTWORK_SIZES
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, px)| *px)
}

/// Artwork candidates of a track or user payload. Avatars are only used when
/// the payload has no artwork of its own.
pub fn image_urls(data: &Value) -> Vec<String> {
    let pick = |v: Option<&Value>| v.and_then(Value::as_str).map(str::to_string);

    let artwork: Vec<String> = [data.get("artwork_url"), data.get("calculated_artwork_url")]
        .into_iter()
        .filter_map(pick)
        .collect();
    if !artwork.is_empty() {
        return artwork;
    }

    [
        data.get("user").and_then(|u| u.get("avatar_url")),
        data.get("avatar_url"),
    ]
    .into_iter()
    .filter_map(pick)
    .collect()
}

/// Rewrite a `large` artwork URL to the preferred size.
pub fn artwork_image(url: &str) -> Image {
    let px = artwork_size(PREFERRED_SIZE).unwrap_or(0);
    Image {
        uri: url.replace("large", PREFERRED_SIZE),
        width: px,
        height: px,
    }
}

pub fn images_for(data: &Value) -> Vec<Image> {
    image_urls(data).iter().map(|u| artwork_image(u)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTarget {
    Song,
    Album,
    Artist,
    Playlist,
}

/// A URI images were requested for, split into its kind and provider id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUri {
    pub uri: String,
    pub target: ImageTarget,
    pub id: String,
}

/// Accepts `soundcloud:<kind>/<name>.<id>` and
/// `https://soundcloud.com/<kind>/<id>` forms.
pub fn parse_image_uri(uri: &str) -> Result<ImageUri> {
    let unsupported = || anyhow!("Could not parse {:?} as a SoundCloud URI", uri);

    let segments: Vec<String> = if let Some(path) = uri.strip_prefix("soundcloud:") {
        path.splitn(3, '/').map(str::to_string).collect()
    } else {
        let parsed = url::Url::parse(uri).map_err(|_| unsupported())?;
        let on_provider = matches!(parsed.scheme(), "http" | "https")
            && parsed.host_str().map_or(false, |h| h.contains("soundcloud.com"));
        if !on_provider {
            return Err(unsupported());
        }
        parsed
            .path_segments()
            .map(|s| s.map(str::to_string).collect())
            .unwrap_or_default()
    };

    let target = match segments.first().map(String::as_str) {
        Some("song") => ImageTarget::Song,
        Some("album") => ImageTarget::Album,
        Some("artist") => ImageTarget::Artist,
        Some("playlist") => ImageTarget::Playlist,
        _ => return Err(unsupported()),
    };
    let id = segments
        .get(1)
        .filter(|i| !i.is_empty())
        .ok_or_else(unsupported)?;
    Ok(ImageUri {
        uri: uri.to_string(),
        target,
        id: parse_track_uri(id).to_string(),
    })
}
