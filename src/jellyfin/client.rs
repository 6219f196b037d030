use std::sync::Arc;
use std::time::Duration;

use ifilm_common::{Error, ItemKind, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::decode::decode_library_list;
use super::query::ItemQuery;
use super::types::{AuthenticationResult, BaseItem, ItemsResult, LibraryFolder, SystemInfo, UserDto};
use crate::cache::ResponseCache;
use crate::config::{CacheConfig, JellyfinConfig};

/// Timeout for metadata calls.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for manifest and segment fetches.
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for the existence check before handing out a stream URL.
pub const VALIDATION_TIMEOUT: Duration = Duration::from_secs(1);

const AUTH_HEADER: &str = "X-Emby-Token";

const CLIENT_AUTHORIZATION: &str = concat!(
    "MediaBrowser Client=\"iFilm\", Device=\"iFilm Proxy\", DeviceId=\"ifilm-proxy\", Version=\"",
    env!("CARGO_PKG_VERSION"),
    "\""
);

const ITEM_FIELDS: &str = "Overview,Genres,ProductionYear,CommunityRating,RunTimeTicks,\
MediaSources,ImageTags,BackdropImageTags,ChildCount,RecursiveItemCount";

const LIBRARIES_KEY: &str = "libraries";
const DEFAULT_USER_KEY: &str = "users:default";

/// Cache key for a single item's details.
pub fn item_cache_key(item_id: &str) -> String {
    format!("item:{}", item_id)
}

/// Where to reach an upstream server and with which API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JellyfinConnection {
    pub server_url: String,
    pub api_key: String,
}

impl JellyfinConnection {
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

impl From<&JellyfinConfig> for JellyfinConnection {
    fn from(config: &JellyfinConfig) -> Self {
        Self::new(config.url.trim(), config.api_key.trim())
    }
}

impl From<&ifilm_db::models::JellyfinConfigRecord> for JellyfinConnection {
    fn from(record: &ifilm_db::models::JellyfinConfigRecord) -> Self {
        Self::new(record.server_url.as_str(), record.api_key.as_str())
    }
}

/// TTLs applied to cached upstream responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Library lists, user lookups, generic item queries.
    pub default: Duration,
    /// Item details, Movie/Series listings, seasons and episodes.
    pub item: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        (&CacheConfig::default()).into()
    }
}

impl From<&CacheConfig> for CacheTtls {
    fn from(config: &CacheConfig) -> Self {
        Self {
            default: config.default_ttl(),
            item: config.item_ttl(),
        }
    }
}

/// Map a transport failure to an upstream error.
pub(crate) fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::upstream(504, format!("Jellyfin request timed out: {}", e))
    } else {
        Error::upstream(502, format!("Jellyfin unreachable: {}", e))
    }
}

/// Client for a connected upstream server.
///
/// Only obtainable through [`JellyfinClient::connect`], so holding one means
/// the server URL and API key are known. Metadata reads go through the shared
/// [`ResponseCache`].
pub struct JellyfinClient {
    http: Client,
    base_url: String,
    api_key: String,
    cache: Arc<ResponseCache>,
    /// Cache generation this client writes into.
    generation: u64,
    ttls: CacheTtls,
}

impl std::fmt::Debug for JellyfinClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JellyfinClient")
            .field("base_url", &self.base_url)
            .field("generation", &self.generation)
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}

impl JellyfinClient {
    pub fn connect(connection: &JellyfinConnection, cache: Arc<ResponseCache>, ttls: CacheTtls) -> Self {
        let http = Client::builder()
            .timeout(METADATA_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client: {}", e);
                Client::new()
            });

        Self {
            http,
            base_url: connection.server_url.trim_end_matches('/').to_string(),
            api_key: connection.api_key.clone(),
            generation: cache.generation(),
            cache,
            ttls,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Cache generation captured when this client connected. Once the cache
    /// moves on, nothing this client fetches is stored any more.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        upstream_url(&self.base_url, segments.iter().copied())
    }

    fn get(&self, segments: &[&str]) -> Result<RequestBuilder> {
        Ok(self
            .http
            .get(self.url(segments)?)
            .header(AUTH_HEADER, &self.api_key))
    }

    fn store<T: Serialize>(&self, key: impl Into<String>, value: &T, ttl: Duration) {
        let key = key.into();
        if !self.cache.set_from_in_generation(self.generation, key.as_str(), value, ttl) {
            tracing::debug!("Not caching {} from a replaced connection", key);
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(Error::not_found(what));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            return Err(Error::upstream(
                status.as_u16(),
                format!("{} failed ({}): {}", what, status, body),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::upstream(502, format!("Invalid response for {}: {}", what, e)))
    }

    /// Fetch `/System/Info`. Used to test a connection.
    pub async fn system_info(&self) -> Result<SystemInfo> {
        self.send_json(self.get(&["System", "Info"])?, "system info").await
    }

    /// List the upstream libraries, served from cache when possible.
    pub async fn get_libraries(&self) -> Result<Vec<LibraryFolder>> {
        self.fetch_libraries(false).await
    }

    /// List the upstream libraries. With `bypass` the cache is not read, but
    /// the fresh list is still stored.
    pub async fn fetch_libraries(&self, bypass: bool) -> Result<Vec<LibraryFolder>> {
        if !bypass {
            if let Some(cached) = self.cache.get_as::<Vec<LibraryFolder>>(LIBRARIES_KEY) {
                return Ok(cached);
            }
        }

        let raw: Value = self
            .send_json(self.get(&["Library", "VirtualFolders"])?, "library list")
            .await?;
        let folders = decode_library_list(raw);

        self.store(LIBRARIES_KEY, &folders, self.ttls.default);
        Ok(folders)
    }

    /// Run an item query.
    pub async fn get_items(&self, query: &ItemQuery) -> Result<ItemsResult> {
        let key = query.cache_key();
        if !query.is_bypass() {
            if let Some(cached) = self.cache.get_as::<ItemsResult>(&key) {
                return Ok(cached);
            }
        }

        let mut params = query.upstream_params();
        if query.get("Recursive").is_none() {
            params.push(("Recursive", "true"));
        }
        if query.get("Fields").is_none() {
            params.push(("Fields", ITEM_FIELDS));
        }

        let result: ItemsResult = self
            .send_json(self.get(&["Items"])?.query(&params), "item query")
            .await?;

        let ttl = if query.targets_volatile_kinds() {
            self.ttls.item
        } else {
            self.ttls.default
        };
        self.store(key, &result, ttl);
        Ok(result)
    }

    /// Search movies and series by name.
    pub async fn search(&self, term: &str, limit: u32) -> Result<ItemsResult> {
        let query = ItemQuery::new()
            .search_term(term)
            .item_types(&[ItemKind::Movie, ItemKind::Series])
            .limit(limit);
        self.get_items(&query).await
    }

    /// ID of the user to scope item lookups to.
    ///
    /// The first user the server lists is used. Lookup failures yield `None`,
    /// callers then fall back to unscoped paths.
    pub async fn resolve_user_id(&self) -> Option<String> {
        if let Some(id) = self.cache.get_as::<String>(DEFAULT_USER_KEY) {
            return Some(id);
        }

        let request = match self.get(&["Users"]) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Could not resolve a Jellyfin user: {}", e);
                return None;
            }
        };
        match self.send_json::<Vec<UserDto>>(request, "user list").await {
            Ok(users) => {
                let id = users.into_iter().map(|u| u.id).find(|id| !id.is_empty())?;
                self.store(DEFAULT_USER_KEY, &id, self.ttls.default);
                Some(id)
            }
            Err(e) => {
                tracing::debug!("Could not resolve a Jellyfin user: {}", e);
                None
            }
        }
    }

    /// Fetch one item's details.
    ///
    /// A 404 from upstream is definitive: the cached entry is evicted so a
    /// deleted item stops being served.
    pub async fn get_item_details(&self, item_id: &str, bypass: bool) -> Result<BaseItem> {
        let key = item_cache_key(item_id);
        if !bypass {
            if let Some(cached) = self.cache.get_as::<BaseItem>(&key) {
                return Ok(cached);
            }
        }

        let request = match self.resolve_user_id().await {
            Some(user_id) => self.get(&["Users", user_id.as_str(), "Items", item_id])?,
            None => self.get(&["Items", item_id])?,
        };

        let request = request.query(&[("Fields", ITEM_FIELDS)]);
        match self.send_json::<BaseItem>(request, "item details").await {
            Ok(item) => {
                self.store(key, &item, self.ttls.item);
                Ok(item)
            }
            Err(Error::NotFound(_)) => {
                self.cache.delete(&key);
                Err(Error::not_found(format!("item {}", item_id)))
            }
            Err(e) => Err(e),
        }
    }

    async fn cached_items(
        &self,
        key: String,
        segments: &[&str],
        params: &[(&str, &str)],
        bypass: bool,
    ) -> Result<ItemsResult> {
        if !bypass {
            if let Some(cached) = self.cache.get_as::<ItemsResult>(&key) {
                return Ok(cached);
            }
        }

        let user_id = self.resolve_user_id().await;
        let mut request = self
            .get(segments)?
            .query(params)
            .query(&[("Fields", ITEM_FIELDS)]);
        if let Some(ref user_id) = user_id {
            request = request.query(&[("UserId", user_id.as_str())]);
        }

        let result: ItemsResult = self.send_json(request, &key).await?;
        self.store(key, &result, self.ttls.item);
        Ok(result)
    }

    /// Seasons of a series.
    pub async fn get_seasons(&self, series_id: &str, bypass: bool) -> Result<ItemsResult> {
        self.cached_items(
            format!("seasons:{}", series_id),
            &["Shows", series_id, "Seasons"],
            &[],
            bypass,
        )
        .await
    }

    /// Episodes of a series, optionally restricted to one season.
    pub async fn get_episodes(
        &self,
        series_id: &str,
        season_id: Option<&str>,
        bypass: bool,
    ) -> Result<ItemsResult> {
        let segments = ["Shows", series_id, "Episodes"];
        match season_id {
            Some(season_id) => {
                self.cached_items(
                    format!("episodes:{}|{}", series_id, season_id),
                    &segments,
                    &[("SeasonId", season_id)],
                    bypass,
                )
                .await
            }
            None => {
                self.cached_items(format!("episodes:{}", series_id), &segments, &[], bypass)
                    .await
            }
        }
    }

    /// Number of items in a library, as reported by a recursive zero-length query.
    pub async fn get_library_item_count(&self, library_id: &str) -> Result<i64> {
        let request = self.get(&["Items"])?.query(&[
            ("ParentId", library_id),
            ("Recursive", "true"),
            ("Limit", "0"),
        ]);
        let result: ItemsResult = self.send_json(request, "library item count").await?;
        Ok(result.total_record_count)
    }

    /// Quick existence check with a short timeout.
    pub async fn item_exists(&self, item_id: &str) -> Result<bool> {
        let request = self
            .get(&["Items"])?
            .query(&[("Ids", item_id), ("Limit", "1")])
            .timeout(VALIDATION_TIMEOUT);

        match self.send_json::<ItemsResult>(request, "item check").await {
            Ok(result) => Ok(result.total_record_count > 0 || !result.items.is_empty()),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Log in with a username and password to obtain a session token.
    pub async fn authenticate_by_name(&self, username: &str, password: &str) -> Result<AuthenticationResult> {
        let request = self
            .http
            .post(self.url(&["Users", "authenticatebyname"])?)
            .header("X-Emby-Authorization", CLIENT_AUTHORIZATION)
            .json(&json!({ "Username": username, "Pw": password }));

        self.send_json(request, "authentication").await
    }

    /// First media source of an item, looked up with `token`.
    ///
    /// Returns `None` on any failure; the stream still plays without it.
    pub async fn get_media_source_id(&self, item_id: &str, user_id: Option<&str>, token: &str) -> Option<String> {
        let user_id = match user_id {
            Some(id) => Some(id.to_string()),
            None => self.resolve_user_id().await,
        };
        let url = match user_id {
            Some(ref user_id) => self.url(&["Users", user_id.as_str(), "Items", item_id]),
            None => self.url(&["Items", item_id]),
        };
        let url = match url {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("No media source for {}: {}", item_id, e);
                return None;
            }
        };

        let request = self.http.get(url).header(AUTH_HEADER, token);
        match self.send_json::<BaseItem>(request, "media source lookup").await {
            Ok(item) => item.primary_media_source_id().map(str::to_string),
            Err(e) => {
                tracing::debug!("No media source for {}: {}", item_id, e);
                None
            }
        }
    }

    /// GET an upstream stream URL with `token`. The status is not checked.
    pub async fn fetch_stream(&self, url: Url, token: &str) -> Result<Response> {
        self.http
            .get(url)
            .header(AUTH_HEADER, token)
            .timeout(STREAM_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)
    }

    /// GET an item image. The status is not checked.
    pub async fn fetch_image(&self, item_id: &str, kind: &str, max_width: Option<u32>) -> Result<Response> {
        self.http
            .get(self.image_url(item_id, kind, max_width)?)
            .header(AUTH_HEADER, &self.api_key)
            .timeout(STREAM_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)
    }

    /// Upstream URL of an item image.
    pub fn image_url(&self, item_id: &str, kind: &str, max_width: Option<u32>) -> Result<Url> {
        let mut url = self.url(&["Items", item_id, "Images", kind])?;
        if let Some(width) = max_width {
            url.query_pairs_mut()
                .append_pair("maxWidth", &width.to_string())
                .append_pair("quality", "90");
        }
        Ok(url)
    }
}

/// `base_url` with `segments` appended to its path.
///
/// Each segment is percent-encoded on its own, so IDs containing `/`, `?` or
/// `#` stay a single segment. Empty, `.` and `..` segments are rejected.
pub fn upstream_url<'a>(base_url: &str, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
    let mut url = Url::parse(base_url)
        .map_err(|e| Error::not_configured(format!("invalid Jellyfin URL {:?}: {}", base_url, e)))?;

    let segments: Vec<&str> = segments.into_iter().collect();
    if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
        return Err(Error::invalid_input(format!("Invalid path segment {:?}", bad)));
    }

    url.path_segments_mut()
        .map_err(|_| Error::not_configured(format!("invalid Jellyfin URL {:?}", base_url)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Upstream URL of a file under an item's video directory. `file` may span
/// several path segments.
pub fn video_url(base_url: &str, item_id: &str, file: &str) -> Result<Url> {
    upstream_url(base_url, ["Videos", item_id].into_iter().chain(file.split('/')))
}

/// Upstream URL of an item's HLS master playlist.
pub fn hls_master_url(base_url: &str, item_id: &str) -> Result<Url> {
    video_url(base_url, item_id, "master.m3u8")
}

/// Upstream URL of an item's progressive stream.
pub fn stream_url(base_url: &str, item_id: &str) -> Result<Url> {
    video_url(base_url, item_id, "stream")
}
