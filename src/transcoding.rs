use crate::models::Transcoding;

pub const DEFAULT_COMPRESSION: &str = "ogg";
pub const DEFAULT_PROTOCOL: &str = "progressive";

/// Pick the transcoding to stream.
///
/// Full streams are preferred over previews when both are offered. Within
/// that set compression is matched first (`compr_pref` is a substring of the
/// mime type); the protocol preference only breaks ties among compression
/// matches. Without any compression match the first remaining entry wins.
pub fn pick_transcoding<'a>(
    transcodings: &'a [Transcoding],
    compr_pref: &str,
    stream_pref: &str,
) -> Option<&'a Transcoding> {
    if transcodings.len() <= 1 {
        return transcodings.first();
    }

    let previews = transcodings.iter().filter(|t| t.is_preview()).count();
    let candidates: Vec<&Transcoding> = if previews > 0 && previews < transcodings.len() {
        transcodings.iter().filter(|t| !t.is_preview()).collect()
    } else {
        transcodings.iter().collect()
    };

    let mut second_choice = None;
    for &t in &candidates {
        if t.format.mime_type.contains(compr_pref) {
            if t.format.protocol == stream_pref {
                return Some(t);
            }
            second_choice.get_or_insert(t);
        }
    }

    second_choice.or_else(|| candidates.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(url: &str, mime: &str, protocol: &str) -> Transcoding {
        Transcoding::new(url, mime, protocol)
    }

    #[test]
    fn empty_and_single() {
        assert!(pick_transcoding(&[], "ogg", "progressive").is_none());
        let only = [t("a", "audio/mpeg", "hls").preview()];
        assert_eq!(pick_transcoding(&only, "ogg", "progressive"), Some(&only[0]));
    }

    #[test]
    fn full_stream_beats_preview() {
        let list = [
            t("a", "audio/ogg; codecs=\"opus\"", "progressive").preview(),
            t("b", "audio/ogg; codecs=\"opus\"", "progressive"),
        ];
        assert_eq!(pick_transcoding(&list, "ogg", "progressive").unwrap().url, "b");
    }

    #[test]
    fn all_previews_are_kept() {
        let list = [
            t("a", "audio/mpeg", "hls").preview(),
            t("b", "audio/ogg", "progressive").preview(),
        ];
        assert_eq!(pick_transcoding(&list, "ogg", "progressive").unwrap().url, "b");
    }

    #[test]
    fn compression_is_matched_before_protocol() {
        let list = [
            t("mp3", "audio/mpeg", "progressive"),
            t("ogg-hls", "audio/ogg", "hls"),
        ];
        assert_eq!(pick_transcoding(&list, "ogg", "progressive").unwrap().url, "ogg-hls");

        let list = [
            t("ogg-hls", "audio/ogg", "hls"),
            t("mp3", "audio/mpeg", "progressive"),
            t("ogg-prog", "audio/ogg", "progressive"),
        ];
        assert_eq!(pick_transcoding(&list, "ogg", "progressive").unwrap().url, "ogg-prog");
    }

    #[test]
    fn first_compression_only_match_is_kept() {
        let list = [
            t("mp3", "audio/mpeg", "progressive"),
            t("ogg-hls-1", "audio/ogg", "hls"),
            t("ogg-hls-2", "audio/ogg", "hls"),
        ];
        assert_eq!(pick_transcoding(&list, "ogg", "progressive").unwrap().url, "ogg-hls-1");
    }

    #[test]
    fn falls_back_to_first_entry() {
        let list = [t("x", "audio/mpeg", "hls"), t("y", "audio/mpeg", "progressive")];
        assert_eq!(pick_transcoding(&list, "ogg", "progressive").unwrap().url, "x");
    }
}
