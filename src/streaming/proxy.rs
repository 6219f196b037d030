//! HLS stream proxy handlers.
//!
//! Playback traffic never goes to Jellyfin directly. Manifests are fetched
//! with the proxy session token and rewritten so every URI points back here;
//! segments and other files are piped through unchanged.

use std::collections::HashMap;
use std::fmt;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use ifilm_common::{Error, Result};
use reqwest::Url;
use serde::Serialize;

use super::rewrite::{rewrite_manifest, RewriteContext, PROXY_STREAM_PREFIX};
use super::token::StreamToken;
use crate::jellyfin::{hls_master_url, transport_error, video_url, JellyfinClient};
use crate::server::{ensure_client, ApiError, AppContext};

pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Inbound query parameters forwarded on segment requests.
pub const SEGMENT_TIMING_PARAMS: [&str; 2] = ["runtimeTicks", "actualSegmentLengthTicks"];

/// What a stream request asks for, judged by its sub-path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFile {
    /// No sub-path: the master playlist.
    Master,
    /// `*.m3u8`
    Variant,
    /// `*.ts`
    Segment,
    /// Anything else (`.m4s`, `.mp4`, `.vtt`, ...).
    Other,
}

impl StreamFile {
    pub fn classify(sub_path: Option<&str>) -> Self {
        let Some(sub_path) = sub_path else {
            return Self::Master;
        };
        let lower = sub_path.to_ascii_lowercase();
        if lower.ends_with(".m3u8") {
            Self::Variant
        } else if lower.ends_with(".ts") {
            Self::Segment
        } else {
            Self::Other
        }
    }

    pub fn is_manifest(self) -> bool {
        matches!(self, Self::Master | Self::Variant)
    }
}

impl fmt::Display for StreamFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Master => "master playlist",
            Self::Variant => "variant playlist",
            Self::Segment => "segment",
            Self::Other => "stream file",
        })
    }
}

/// Inputs for [`build_target_url`].
#[derive(Debug, Clone, Copy)]
pub struct TargetRequest<'a> {
    pub item_id: &'a str,
    pub sub_path: Option<&'a str>,
    pub token: &'a str,
    pub media_source_id: Option<&'a str>,
    pub inbound_query: &'a HashMap<String, String>,
}

/// Upstream URL for a stream request.
///
/// Every request carries the token and, when known, the media source.
/// Segment requests also carry the playback timing parameters, copied
/// verbatim and only when the client sent them. Other files forward `static`
/// so progressive downloads stay direct. All values are form-encoded.
pub fn build_target_url(base_url: &str, request: &TargetRequest<'_>) -> Result<Url> {
    let kind = StreamFile::classify(request.sub_path);
    let mut url = match request.sub_path {
        None => hls_master_url(base_url, request.item_id)?,
        Some(sub_path) => video_url(base_url, request.item_id, sub_path)?,
    };

    let forwarded: &[&str] = match kind {
        StreamFile::Segment => &SEGMENT_TIMING_PARAMS,
        StreamFile::Other => &["static"],
        StreamFile::Master | StreamFile::Variant => &[],
    };

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("api_key", request.token);
        if let Some(media_source_id) = request.media_source_id {
            query.append_pair("MediaSourceId", media_source_id);
        }
        for name in forwarded {
            if let Some(value) = request.inbound_query.get(*name) {
                query.append_pair(name, value);
            }
        }
    }

    Ok(url)
}

/// Hide the `api_key` value of a URL for logging.
pub fn redact_token(url: &str) -> String {
    match url.find("api_key=") {
        Some(start) => {
            let value_start = start + "api_key=".len();
            let value_end = url[value_start..]
                .find('&')
                .map(|i| value_start + i)
                .unwrap_or(url.len());
            format!("{}***{}", &url[..value_start], &url[value_end..])
        }
        None => url.to_string(),
    }
}

/// Content type for a stream file when the upstream sent none.
pub fn default_content_type(sub_path: Option<&str>) -> &'static str {
    let Some(sub_path) = sub_path else {
        return MANIFEST_CONTENT_TYPE;
    };
    let extension = sub_path
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "m3u8" => MANIFEST_CONTENT_TYPE,
        "ts" => "video/mp2t",
        "m4s" => "video/iso.segment",
        "mp4" => "video/mp4",
        "aac" => "audio/aac",
        "vtt" => "text/vtt",
        _ => "application/octet-stream",
    }
}

/// Reject sub-paths that would escape the item's video directory.
/// Reject item IDs that could leave the `/Videos/{id}` path upstream.
pub fn validate_item_id(item_id: &str) -> Result<()> {
    let bad = item_id.is_empty()
        || item_id.contains(&['/', '\\', '?', '#'][..])
        || item_id.contains("..");
    if bad {
        return Err(Error::invalid_input(format!("Invalid item id: {}", item_id)));
    }
    Ok(())
}

fn validate_sub_path(sub_path: &str) -> Result<()> {
    let bad = sub_path.is_empty()
        || sub_path.contains('\\')
        || sub_path.contains(&['?', '#'][..])
        || sub_path.split('/').any(|segment| matches!(segment, "" | "." | ".."));
    if bad {
        return Err(Error::invalid_input(format!("Invalid stream path: {}", sub_path)));
    }
    Ok(())
}

/// Externally visible origin of this server.
fn request_origin(headers: &HeaderMap) -> String {
    let first = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let proto = first("x-forwarded-proto").unwrap_or("http");
    let host = first("x-forwarded-host")
        .or_else(|| first(header::HOST.as_str()))
        .unwrap_or("localhost");
    format!("{}://{}", proto, host)
}

/// `{origin}/api/media/stream/{item_id}` for the current request.
pub fn proxy_base_url(public_url: Option<&str>, headers: &HeaderMap, item_id: &str) -> String {
    let origin = match public_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => request_origin(headers),
    };
    format!("{}{}{}", origin, PROXY_STREAM_PREFIX, item_id)
}

/// URLs a client uses to play an item through the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    pub item_id: String,
    pub hls_url: String,
    pub stream_url: String,
}

impl StreamDescriptor {
    pub fn new(item_id: &str, proxy_base: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            hls_url: proxy_base.to_string(),
            stream_url: format!("{}/stream?static=true", proxy_base),
        }
    }
}

/// Headers on every proxied stream response.
fn proxy_headers(content_type: &str) -> HeaderMap {
    let mut headers = cors_headers();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers
}

fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers
}

async fn fetch_target(
    client: &JellyfinClient,
    item_id: &str,
    sub_path: Option<&str>,
    token: &StreamToken,
    media_source_id: Option<&str>,
    inbound_query: &HashMap<String, String>,
) -> Result<reqwest::Response> {
    let url = build_target_url(
        client.base_url(),
        &TargetRequest {
            item_id,
            sub_path,
            token: &token.value,
            media_source_id,
            inbound_query,
        },
    )?;
    tracing::debug!("Proxying {}", redact_token(url.as_str()));
    client.fetch_stream(url, &token.value).await
}

async fn proxy_stream(
    ctx: &AppContext,
    item_id: &str,
    sub_path: Option<&str>,
    inbound_query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<Response> {
    validate_item_id(item_id)?;
    if let Some(sub_path) = sub_path {
        validate_sub_path(sub_path)?;
    }
    let kind = StreamFile::classify(sub_path);
    let client = ensure_client(ctx)?;
    let credentials = ctx.config.proxy.credentials();
    let tokens = ctx.state.tokens();

    let token = tokens.acquire(&client, credentials).await;
    let media_source_id = client
        .get_media_source_id(item_id, token.user_id.as_deref(), &token.value)
        .await;

    let mut response = fetch_target(
        &client,
        item_id,
        sub_path,
        &token,
        media_source_id.as_deref(),
        inbound_query,
    )
    .await?;

    if matches!(response.status().as_u16(), 401 | 403) {
        tracing::warn!(
            "Upstream rejected stream token ({}), re-authenticating",
            response.status()
        );
        tokens.invalidate();
        let token = tokens.acquire(&client, credentials).await;
        response = fetch_target(
            &client,
            item_id,
            sub_path,
            &token,
            media_source_id.as_deref(),
            inbound_query,
        )
        .await?;
    }

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(200).collect();
        return Err(Error::upstream(
            status.as_u16(),
            format!("Upstream {} request failed ({}): {}", kind, status, body),
        ));
    }

    if kind.is_manifest() {
        let manifest = response.text().await.map_err(transport_error)?;
        let rewrite = RewriteContext::new(
            item_id,
            proxy_base_url(ctx.config.server.public_url.as_deref(), headers, item_id),
        );
        let body = rewrite_manifest(&manifest, &rewrite);
        return Ok((proxy_headers(MANIFEST_CONTENT_TYPE), body).into_response());
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| default_content_type(sub_path).to_string());

    let mut out_headers = proxy_headers(&content_type);
    if let Some(length) = response.content_length() {
        out_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    Ok((out_headers, Body::from_stream(response.bytes_stream())).into_response())
}

/// `GET /api/media/stream/:id`
pub async fn master_playlist(
    State(ctx): State<AppContext>,
    Path(item_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> std::result::Result<Response, ApiError> {
    Ok(proxy_stream(&ctx, &item_id, None, &query, &headers).await?)
}

/// `GET /api/media/stream/:id/*file_path`
pub async fn stream_file(
    State(ctx): State<AppContext>,
    Path((item_id, file_path)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> std::result::Result<Response, ApiError> {
    let file_path = file_path.trim_start_matches('/');
    Ok(proxy_stream(&ctx, &item_id, Some(file_path), &query, &headers).await?)
}

/// CORS preflight for the stream routes.
pub async fn preflight() -> Response {
    (StatusCode::NO_CONTENT, cors_headers()).into_response()
}
