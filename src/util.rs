use chrono::{NaiveDateTime, TimeZone, Utc};
use unicode_normalization::UnicodeNormalization;

const URI_CHARS: &str = "-_.() ";

fn ascii_fold(text: &str) -> String {
    text.nfkd().filter(char::is_ascii).collect()
}

/// Form-encode `text` after folding it to ASCII (spaces become `+`).
pub fn safe_url(text: &str) -> String {
    url::form_urlencoded::byte_serialize(ascii_fold(text).as_bytes()).collect()
}

/// Fold `text` to a whitelist of URI-friendly ASCII characters, collapsing
/// whitespace runs to a single space.
pub fn readable_url(text: &str) -> String {
    let kept: String = ascii_fold(text)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || URI_CHARS.contains(*c))
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `me` for the authenticated user, `users/{id}` otherwise.
pub fn get_user_url(user_id: Option<&str>) -> String {
    match user_id {
        Some(id) if !id.is_empty() => format!("users/{}", id),
        _ => "me".to_string(),
    }
}

/// Parse either timestamp format the provider emits.
pub fn get_datetime(date: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%SZ")
        .or_else(|_| NaiveDateTime::parse_from_str(date, "%Y/%m/%d %H:%M:%S +0000"))
        .ok()
}

pub fn timestamp_millis(date: &NaiveDateTime) -> i64 {
    Utc.from_utc_datetime(date).timestamp_millis()
}

/// Parenthesised reason for log lines, empty when the reason is unknown.
pub fn parse_fail_reason(reason: &str) -> String {
    if reason.is_empty() || reason == "Unknown" {
        String::new()
    } else {
        format!("({})", reason)
    }
}

pub fn track_uri(title: &str, id: &str) -> String {
    format!("soundcloud:song/{}.{}", readable_url(title), id)
}

/// The id part of a track URI: everything after the last `.`.
pub fn parse_track_uri(uri: &str) -> &str {
    uri.rsplit('.').next().unwrap_or(uri)
}
