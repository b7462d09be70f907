#![forbid(unsafe_code)]

//! The download resolver: one request in, one usable link out.
//!
//! Given `{url, format, quality}` the resolver extracts the video identifier
//! and walks the provider chain in a fixed order: cobalt first, then the two
//! polling converters, finally the static fallback page. Provider failures
//! are logged and swallowed; the only hard error is a link no pattern
//! recognizes.

use anyhow::{Result, anyhow};
use log::{info, warn};
use std::thread;
use std::time::Duration;

use crate::config::RelaySettings;
use crate::extract::{extract_video_id, watch_url};
use crate::providers::{self, PickerOption, PollPolicy, ProviderOutcome, Resolved};
use crate::transport::HttpTransport;

/// Requested output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaFormat {
    #[default]
    Video,
    Audio,
}

impl MediaFormat {
    /// Anything that is not explicitly `audio` means video, mirroring how
    /// the original frontend treated the field.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("audio") {
            Self::Audio
        } else {
            Self::Video
        }
    }
}

/// Supported video resolutions. Unknown values fall back to 720p rather
/// than failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    Q360,
    Q480,
    #[default]
    Q720,
    Q1080,
}

impl Quality {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "360" => Some(Self::Q360),
            "480" => Some(Self::Q480),
            "720" => Some(Self::Q720),
            "1080" => Some(Self::Q1080),
            _ => None,
        }
    }

    pub fn from_number(value: u64) -> Option<Self> {
        match value {
            360 => Some(Self::Q360),
            480 => Some(Self::Q480),
            720 => Some(Self::Q720),
            1080 => Some(Self::Q1080),
            _ => None,
        }
    }

    /// Label used on the wire, both towards cobalt (`vQuality`) and the
    /// ajax converters (`format`).
    pub fn label(self) -> &'static str {
        match self {
            Self::Q360 => "360",
            Self::Q480 => "480",
            Self::Q720 => "720",
            Self::Q1080 => "1080",
        }
    }
}

/// Validated relay input.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub format: MediaFormat,
    pub quality: Quality,
}

/// What the chain produced for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A direct media link from one of the converters.
    Direct(Resolved),
    /// Multiple media items; the client has to pick one.
    Picker(Vec<PickerOption>),
    /// External download page; every converter failed.
    FallbackPage { url: String },
}

pub fn resolve_download(
    settings: &RelaySettings,
    transport: &dyn HttpTransport,
    request: &DownloadRequest,
) -> Result<Resolution> {
    resolve_download_with_wait(settings, transport, request, thread::sleep)
}

/// Same as [`resolve_download`] but with the poll sleep injected, so tests
/// do not spend wall-clock time in the polling loop.
pub fn resolve_download_with_wait(
    settings: &RelaySettings,
    transport: &dyn HttpTransport,
    request: &DownloadRequest,
    mut wait: impl FnMut(Duration),
) -> Result<Resolution> {
    let video_id = extract_video_id(&request.url)
        .ok_or_else(|| anyhow!("Link inválido. Por favor, cole um link válido do YouTube"))?;

    info!(
        "resolving download for {video_id} (format {:?}, quality {})",
        request.format,
        request.quality.label()
    );

    let audio_only = request.format == MediaFormat::Audio;
    match providers::request_cobalt(
        transport,
        &settings.cobalt_url,
        &request.url,
        request.quality.label(),
        audio_only,
    ) {
        Ok(ProviderOutcome::Resolved(resolved)) => {
            info!("cobalt resolved {video_id}");
            return Ok(Resolution::Direct(resolved));
        }
        Ok(ProviderOutcome::Picker(options)) => {
            info!("cobalt returned {} picker options for {video_id}", options.len());
            return Ok(Resolution::Picker(options));
        }
        Err(err) => warn!("cobalt failed for {video_id}: {err:#}"),
    }

    let format_code = match request.format {
        MediaFormat::Audio => "mp3",
        MediaFormat::Video => request.quality.label(),
    };
    let policy = PollPolicy {
        interval: settings.poll_interval,
        attempts: settings.poll_attempts,
    };
    let canonical_url = watch_url(&video_id);

    for base_url in [&settings.converter_url, &settings.converter_alt_url] {
        match providers::request_conversion(
            transport,
            base_url,
            &canonical_url,
            format_code,
            &policy,
            &mut wait,
        ) {
            Ok(resolved) => {
                info!("converter at {base_url} resolved {video_id}");
                return Ok(Resolution::Direct(resolved));
            }
            Err(err) => warn!("converter at {base_url} failed for {video_id}: {err:#}"),
        }
    }

    // Last resort: hand the user the external download page for this video.
    warn!("all providers failed for {video_id}, falling back to the external page");
    Ok(Resolution::FallbackPage {
        url: providers::fallback_page_url(&settings.fallback_url, &video_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    fn test_settings() -> RelaySettings {
        RelaySettings {
            relay_host: "127.0.0.1".to_string(),
            relay_port: 0,
            cobalt_url: "https://cobalt.test/api/json".to_string(),
            converter_url: "https://convert.test".to_string(),
            converter_alt_url: "https://convert-alt.test".to_string(),
            fallback_url: "https://page.test".to_string(),
            poll_interval: Duration::from_millis(1),
            poll_attempts: 3,
        }
    }

    fn video_request(url: &str) -> DownloadRequest {
        DownloadRequest {
            url: url.to_string(),
            format: MediaFormat::Video,
            quality: Quality::Q720,
        }
    }

    /// Routes canned responses by URL substring so the chain order is
    /// observable without real HTTP.
    struct RoutedTransport {
        routes: Vec<(&'static str, Result<Value>)>,
        log: Mutex<Vec<String>>,
    }

    impl RoutedTransport {
        fn new(routes: Vec<(&'static str, Result<Value>)>) -> Self {
            Self {
                routes,
                log: Mutex::new(Vec::new()),
            }
        }

        fn respond(&self, url: &str) -> Result<Value> {
            self.log.lock().unwrap().push(url.to_string());
            for (needle, response) in &self.routes {
                if url.contains(needle) {
                    return match response {
                        Ok(value) => Ok(value.clone()),
                        Err(err) => Err(anyhow!("{err}")),
                    };
                }
            }
            Err(anyhow!("unreachable host: {url}"))
        }
    }

    impl HttpTransport for RoutedTransport {
        fn post_json(&self, url: &str, _body: &Value) -> Result<Value> {
            self.respond(url)
        }

        fn get_json(&self, url: &str) -> Result<Value> {
            self.respond(url)
        }
    }

    #[test]
    fn unrecognized_link_is_an_error() {
        let transport = RoutedTransport::new(vec![]);
        let err = resolve_download_with_wait(
            &test_settings(),
            &transport,
            &video_request("https://example.com/nope"),
            |_| {},
        )
        .unwrap_err();
        assert!(err.to_string().contains("Link inválido"));
        // No provider gets contacted for a bad link.
        assert!(transport.log.lock().unwrap().is_empty());
    }

    #[test]
    fn cobalt_success_short_circuits_the_chain() {
        let transport = RoutedTransport::new(vec![(
            "cobalt.test",
            Ok(json!({"status": "redirect", "url": "https://dl.test/x.mp4"})),
        )]);
        let resolution = resolve_download_with_wait(
            &test_settings(),
            &transport,
            &video_request("https://youtu.be/dQw4w9WgXcQ"),
            |_| {},
        )
        .unwrap();
        assert_eq!(
            resolution,
            Resolution::Direct(Resolved {
                download_url: "https://dl.test/x.mp4".to_string(),
                filename: None,
            })
        );
        let log = transport.log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains("cobalt.test"));
    }

    #[test]
    fn cobalt_picker_is_surfaced() {
        let transport = RoutedTransport::new(vec![(
            "cobalt.test",
            Ok(json!({
                "status": "picker",
                "picker": [{"url": "https://dl.test/a.mp4"}],
            })),
        )]);
        let resolution = resolve_download_with_wait(
            &test_settings(),
            &transport,
            &video_request("https://youtu.be/dQw4w9WgXcQ"),
            |_| {},
        )
        .unwrap();
        match resolution {
            Resolution::Picker(options) => assert_eq!(options.len(), 1),
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn converter_picks_up_after_cobalt_failure() {
        let transport = RoutedTransport::new(vec![
            ("cobalt.test", Err(anyhow!("timeout"))),
            (
                "convert.test/ajax/download.php",
                Ok(json!({"success": true, "id": "job1", "title": "Clip"})),
            ),
            (
                "convert.test/ajax/progress.php",
                Ok(json!({"progress": 1000, "download_url": "https://dl.test/clip.mp4"})),
            ),
        ]);
        let resolution = resolve_download_with_wait(
            &test_settings(),
            &transport,
            &video_request("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            |_| {},
        )
        .unwrap();
        match resolution {
            Resolution::Direct(resolved) => {
                assert_eq!(resolved.download_url, "https://dl.test/clip.mp4");
                assert_eq!(resolved.filename.as_deref(), Some("Clip.mp4"));
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
        // The converter is handed the canonical watch URL.
        let log = transport.log.lock().unwrap();
        assert!(log[1].contains("watch%3Fv%3DdQw4w9WgXcQ"));
    }

    #[test]
    fn alternative_converter_is_tried_last() {
        let transport = RoutedTransport::new(vec![
            ("cobalt.test", Err(anyhow!("down"))),
            ("convert.test", Err(anyhow!("down"))),
            (
                "convert-alt.test/ajax/download.php",
                Ok(json!({"success": true, "id": "job2"})),
            ),
            (
                "convert-alt.test/ajax/progress.php",
                Ok(json!({"progress": 1000, "download_url": "https://dl.test/alt.mp3"})),
            ),
        ]);
        let request = DownloadRequest {
            url: "https://youtu.be/dQw4w9WgXcQ".to_string(),
            format: MediaFormat::Audio,
            quality: Quality::Q720,
        };
        let resolution =
            resolve_download_with_wait(&test_settings(), &transport, &request, |_| {}).unwrap();
        match resolution {
            Resolution::Direct(resolved) => {
                assert_eq!(resolved.download_url, "https://dl.test/alt.mp3");
                assert_eq!(resolved.filename, None);
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
        // Audio requests are submitted as mp3 conversions.
        let log = transport.log.lock().unwrap();
        assert!(log.iter().any(|url| url.contains("format=mp3")));
    }

    #[test]
    fn total_failure_yields_the_fallback_page() {
        let transport = RoutedTransport::new(vec![
            ("cobalt.test", Err(anyhow!("down"))),
            ("convert.test", Err(anyhow!("down"))),
            ("convert-alt.test", Err(anyhow!("down"))),
        ]);
        let resolution = resolve_download_with_wait(
            &test_settings(),
            &transport,
            &video_request("https://youtu.be/dQw4w9WgXcQ"),
            |_| {},
        )
        .unwrap();
        assert_eq!(
            resolution,
            Resolution::FallbackPage {
                url: "https://page.test/youtube/dQw4w9WgXcQ".to_string(),
            }
        );
    }

    #[test]
    fn media_format_parse_is_lenient() {
        assert_eq!(MediaFormat::parse("audio"), MediaFormat::Audio);
        assert_eq!(MediaFormat::parse(" AUDIO "), MediaFormat::Audio);
        assert_eq!(MediaFormat::parse("video"), MediaFormat::Video);
        assert_eq!(MediaFormat::parse("whatever"), MediaFormat::Video);
    }

    #[test]
    fn quality_parses_known_labels_only() {
        assert_eq!(Quality::parse("360"), Some(Quality::Q360));
        assert_eq!(Quality::parse(" 1080 "), Some(Quality::Q1080));
        assert_eq!(Quality::parse("144"), None);
        assert_eq!(Quality::from_number(480), Some(Quality::Q480));
        assert_eq!(Quality::from_number(4000), None);
        assert_eq!(Quality::default().label(), "720");
    }
}
