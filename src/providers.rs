#![forbid(unsafe_code)]

//! Clients for the third-party conversion services the relay leans on.
//!
//! None of these APIs are documented by their operators; the request and
//! response shapes below mirror what the services actually emit and may
//! change without notice. Every function treats a malformed response as a
//! plain failure so the caller can move on to the next provider.

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;
use url::form_urlencoded;

use crate::transport::HttpTransport;

/// Progress value the ajax converters report when a job is finished.
const CONVERSION_DONE: u64 = 1000;

/// A download link obtained from a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub download_url: String,
    pub filename: Option<String>,
}

/// One entry of a cobalt "picker" response (videos that resolve to several
/// media items, e.g. photo posts with audio).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PickerOption {
    pub url: String,
    pub thumb: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    Resolved(Resolved),
    Picker(Vec<PickerOption>),
}

/// Fixed-interval polling parameters for the ajax converters.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub attempts: u32,
}

/// Asks a cobalt-compatible endpoint to convert `video_url` in one shot.
///
/// The request body is the one the service expects verbatim; `vQuality` only
/// applies to video downloads and `aFormat` only to audio ones, but cobalt
/// tolerates both being present.
pub fn request_cobalt(
    transport: &dyn HttpTransport,
    api_url: &str,
    video_url: &str,
    quality_label: &str,
    audio_only: bool,
) -> Result<ProviderOutcome> {
    let body = json!({
        "url": video_url,
        "vCodec": "h264",
        "vQuality": quality_label,
        "aFormat": "mp3",
        "filenamePattern": "basic",
        "isAudioOnly": audio_only,
    });

    let data = transport.post_json(api_url, &body)?;
    match data.get("status").and_then(Value::as_str) {
        Some("error") => {
            let text = data
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or("no error text");
            bail!("provider reported an error: {text}");
        }
        // `tunnel` replaced `stream` in newer cobalt deployments; both carry
        // the download link in `url`.
        Some("redirect") | Some("stream") | Some("tunnel") => {
            let download_url = data
                .get("url")
                .and_then(Value::as_str)
                .filter(|url| !url.is_empty())
                .ok_or_else(|| anyhow!("response is missing the download url"))?;
            let filename = data
                .get("filename")
                .and_then(Value::as_str)
                .map(str::to_string);
            Ok(ProviderOutcome::Resolved(Resolved {
                download_url: download_url.to_string(),
                filename,
            }))
        }
        Some("picker") => {
            let options: Vec<PickerOption> = data
                .get("picker")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| {
                            let url = item.get("url").and_then(Value::as_str)?;
                            Some(PickerOption {
                                url: url.to_string(),
                                thumb: item
                                    .get("thumb")
                                    .and_then(Value::as_str)
                                    .map(str::to_string),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            if options.is_empty() {
                bail!("picker response had no usable entries");
            }
            Ok(ProviderOutcome::Picker(options))
        }
        other => bail!("unexpected provider status: {other:?}"),
    }
}

/// Submits a conversion job to a loader.to-style ajax endpoint and polls its
/// progress until a download link appears.
///
/// `format_code` is `mp3` for audio and the bare quality label (`720`, ...)
/// for video. `wait` is called between polls; production passes a real
/// sleep, tests a recorder.
pub fn request_conversion(
    transport: &dyn HttpTransport,
    base_url: &str,
    video_url: &str,
    format_code: &str,
    policy: &PollPolicy,
    mut wait: impl FnMut(Duration),
) -> Result<Resolved> {
    let submit_url = format!(
        "{}/ajax/download.php?format={}&url={}",
        base_url.trim_end_matches('/'),
        format_code,
        encode_component(video_url),
    );
    let submitted = transport
        .get_json(&submit_url)
        .context("submitting conversion job")?;

    if !truthy(submitted.get("success")) {
        bail!("converter rejected the request");
    }
    let job_id = submitted
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("converter response is missing the job id"))?;
    let title = submitted
        .get("title")
        .and_then(Value::as_str)
        .filter(|title| !title.is_empty())
        .map(str::to_string);

    let progress_url = format!(
        "{}/ajax/progress.php?id={}",
        base_url.trim_end_matches('/'),
        encode_component(job_id),
    );

    for attempt in 0..policy.attempts {
        if attempt > 0 {
            wait(policy.interval);
        }
        let report = transport
            .get_json(&progress_url)
            .context("polling conversion progress")?;

        let progress = report
            .get("progress")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let download_url = report
            .get("download_url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty());

        if progress >= CONVERSION_DONE
            && let Some(download_url) = download_url
        {
            let filename = title.map(|title| {
                let ext = if format_code == "mp3" { "mp3" } else { "mp4" };
                format!("{title}.{ext}")
            });
            return Ok(Resolved {
                download_url: download_url.to_string(),
                filename,
            });
        }
    }

    bail!(
        "conversion did not finish within {} polls",
        policy.attempts
    )
}

/// Static external page offered when every conversion provider failed. The
/// page itself handles format selection, so this never fails.
pub fn fallback_page_url(base_url: &str, video_id: &str) -> String {
    format!("{}/youtube/{}", base_url.trim_end_matches('/'), video_id)
}

/// The ajax converters are loose about types: `success` arrives as `true`,
/// `1` or `"1"` depending on the deployment.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_i64() == Some(1),
        Some(Value::String(text)) => text == "1" || text.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn encode_component(raw: &str) -> String {
    form_urlencoded::byte_serialize(raw.as_bytes()).collect()
}
