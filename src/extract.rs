#![forbid(unsafe_code)]

//! Video identifier extraction from pasted YouTube links.

use regex::Regex;
use std::sync::LazyLock;

// Ordered like the UI documents them: regular watch links (including short
// youtu.be and embed forms) first, shorts second. The capture stops at the
// first query/fragment delimiter; the extracted value is not checked against
// YouTube's actual ID grammar.
static ID_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([^&\n?#]+)")
            .unwrap(),
        Regex::new(r"youtube\.com/shorts/([^&\n?#]+)").unwrap(),
    ]
});

/// Pulls the video identifier out of a YouTube link, or `None` when no known
/// pattern matches.
pub fn extract_video_id(url: &str) -> Option<String> {
    ID_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(url)
            .and_then(|captures| captures.get(1))
            .map(|id| id.as_str().to_string())
    })
}

/// Canonical watch URL for an extracted identifier. Converters get this form
/// regardless of how the link was originally pasted.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_watch_link() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn extracts_from_short_link() {
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn extracts_from_embed_link() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn extracts_from_shorts_link() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/shorts/abc123XYZ_-"),
            Some("abc123XYZ_-".to_string())
        );
    }

    #[test]
    fn cuts_trailing_query_parameters() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ?si=share"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn cuts_trailing_fragment() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ#top"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn rejects_unrelated_links() {
        assert_eq!(extract_video_id("https://vimeo.com/123456"), None);
        assert_eq!(extract_video_id("not a link"), None);
        assert_eq!(extract_video_id(""), None);
    }

    #[test]
    fn watch_url_round_trips_identifier() {
        let url = watch_url("dQw4w9WgXcQ");
        assert_eq!(extract_video_id(&url), Some("dQw4w9WgXcQ".to_string()));
    }
}
