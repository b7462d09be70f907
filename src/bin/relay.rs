#![forbid(unsafe_code)]

//! HTTP relay that turns a pasted YouTube link into a downloadable file URL.
//!
//! The binary exposes a single JSON endpoint; all the provider logic lives in
//! the `grabtube` library. Responses always carry permissive CORS headers
//! because the browser frontend is served from a different origin.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use grabtube::config::{RelaySettings, SettingsOverrides, resolve_settings};
use grabtube::resolver::{
    DownloadRequest, MediaFormat, Quality, Resolution, resolve_download,
};
use grabtube::security::ensure_not_root;
use grabtube::transport::{HttpTransport, UreqTransport};
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use tokio::signal;

// Header values copied from the original deployment so existing frontends
// keep working unchanged.
const CORS_ALLOW_ORIGIN: &str = "*";
const CORS_ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

#[derive(Debug, Clone)]
struct RelayArgs {
    settings: RelaySettings,
    listen_host: IpAddr,
}

impl RelayArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut host_override: Option<String> = None;
        let mut port_override: Option<u16> = None;
        let mut env_path_override: Option<std::path::PathBuf> = None;
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--host=") {
                host_override = Some(value.to_string());
                continue;
            }
            if let Some(value) = arg.strip_prefix("--port=") {
                port_override = Some(parse_port_arg(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--env-file=") {
                env_path_override = Some(std::path::PathBuf::from(value));
                continue;
            }

            match arg.as_str() {
                "--host" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--host requires a value"))?;
                    host_override = Some(value);
                }
                "--port" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--port requires a value"))?;
                    port_override = Some(parse_port_arg(&value)?);
                }
                "--env-file" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--env-file requires a value"))?;
                    env_path_override = Some(std::path::PathBuf::from(value));
                }
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }

        let settings = resolve_settings(SettingsOverrides {
            relay_host: host_override,
            relay_port: port_override,
            env_path: env_path_override,
        })?;
        let listen_host = parse_host_arg(&settings.relay_host)?;

        Ok(Self {
            settings,
            listen_host,
        })
    }
}

fn parse_port_arg(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context("expected a numeric port between 0 and 65535")
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/GRABTUBE_HOST")
}

/// Shared state injected into every Axum handler.
///
/// The transport is a trait object so handler tests can feed canned provider
/// responses through the same code path the production agent uses.
#[derive(Clone)]
struct AppState {
    settings: Arc<RelaySettings>,
    transport: Arc<dyn HttpTransport>,
}

/// Incoming request body. Every field except the URL is tolerated in the
/// loose forms real clients have sent: `format` is free text and `quality`
/// arrives as either a JSON number or a string.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadRequestBody {
    url: Option<String>,
    format: Option<String>,
    quality: Option<QualityField>,
}

/// Accepts any JSON value so one odd field never sinks the whole body:
/// floats and negative numbers simply fail the range check below and clamp
/// to the default like every other unknown quality.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QualityField {
    Number(serde_json::Number),
    Text(String),
    Other(serde_json::Value),
}

impl DownloadRequestBody {
    fn media_format(&self) -> MediaFormat {
        self.format
            .as_deref()
            .map(MediaFormat::parse)
            .unwrap_or_default()
    }

    /// Out-of-range values silently fall back to the default; the original
    /// service forwarded whatever it got, and rejecting here would only
    /// break older clients.
    fn quality(&self) -> Quality {
        match &self.quality {
            Some(QualityField::Number(value)) => {
                value.as_u64().and_then(Quality::from_number)
            }
            Some(QualityField::Text(value)) => Quality::parse(value),
            Some(QualityField::Other(_)) | None => None,
        }
        .unwrap_or_default()
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "error": self.message,
        });
        (self.status, cors_headers(), Json(body)).into_response()
    }
}

/// CORS headers attached to every response, error or not, exactly like the
/// original edge function did.
fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        CORS_ALLOW_ORIGIN.parse().unwrap(),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        CORS_ALLOW_HEADERS.parse().unwrap(),
    );
    headers
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let RelayArgs {
        settings,
        listen_host,
    } = RelayArgs::parse()?;

    ensure_not_root()?;

    let state = AppState {
        settings: Arc::new(settings.clone()),
        transport: Arc::new(UreqTransport::default()),
    };

    let app = Router::new()
        .route("/api/download", post(handle_download).options(preflight))
        .route("/api/health", get(health))
        .fallback(unknown_route)
        .with_state(state);

    let addr = SocketAddr::new(listen_host, settings.relay_port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("relay listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running relay server")?;

    Ok(())
}

async fn shutdown_signal() {
    // Graceful shutdown only; the process still terminates when Ctrl+C
    // cannot be hooked.
    if let Err(err) = signal::ctrl_c().await {
        error!("failed to install Ctrl+C handler: {err}");
    }
}

/// The relay endpoint. Extracts the identifier, walks the provider chain in
/// a blocking task (the chain sleeps between polls), and maps the outcome
/// onto the wire format the frontend expects.
///
/// The body is parsed by hand instead of through the `Json` extractor so
/// that a malformed payload still answers with the CORS headers and the
/// `{success: false, error}` shape every other response carries.
async fn handle_download(State(state): State<AppState>, body: Bytes) -> Response {
    let payload: DownloadRequestBody = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            return ApiError::bad_request(format!("Corpo da requisição inválido: {err}"))
                .into_response();
        }
    };

    let Some(url) = payload
        .url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
    else {
        return ApiError::bad_request("URL é obrigatória").into_response();
    };

    let request = DownloadRequest {
        url,
        format: payload.media_format(),
        quality: payload.quality(),
    };
    info!(
        "processing download request: url={} format={:?} quality={}",
        request.url,
        request.format,
        request.quality.label()
    );

    let settings = state.settings.clone();
    let transport = state.transport.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        resolve_download(&settings, transport.as_ref(), &request)
    })
    .await;

    match outcome {
        Ok(Ok(resolution)) => resolution_response(resolution),
        // The chain swallows provider failures internally, so an error here
        // means the link itself was not usable.
        Ok(Err(err)) => ApiError::bad_request(err.to_string()).into_response(),
        Err(err) => {
            error!("resolver task panicked or was cancelled: {err}");
            ApiError::internal("Erro interno do servidor").into_response()
        }
    }
}

fn resolution_response(resolution: Resolution) -> Response {
    let body = match resolution {
        Resolution::Direct(resolved) => json!({
            "success": true,
            "downloadUrl": resolved.download_url,
            "filename": resolved.filename.unwrap_or_else(|| "video".to_string()),
        }),
        Resolution::Picker(options) => json!({
            "success": true,
            "picker": true,
            "options": options,
        }),
        Resolution::FallbackPage { url } => json!({
            "success": true,
            "downloadUrl": url,
        }),
    };
    (StatusCode::OK, cors_headers(), Json(body)).into_response()
}

/// CORS preflight; browsers send this before the actual POST.
async fn preflight() -> Response {
    (StatusCode::OK, cors_headers()).into_response()
}

async fn health() -> Response {
    (StatusCode::OK, cors_headers(), Json(json!({"status": "ok"}))).into_response()
}

async fn unknown_route() -> Response {
    ApiError::not_found("endpoint not found").into_response()
}
