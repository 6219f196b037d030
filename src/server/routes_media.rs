//! Media API routes.
//!
//! Movie, series, search and library endpoints consumed by the frontend. All
//! of them read through the cached upstream client; none expose upstream URLs
//! or credentials. Posters and backdrops are served by the image proxy route.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use ifilm_common::{CollectionType, Error, ItemKind};
use ifilm_db::pool::get_conn;
use ifilm_db::queries::{configs, libraries};
use serde::{Deserialize, Serialize};

use super::{ensure_client, ApiError, AppContext};
use crate::jellyfin::{BaseItem, ItemQuery, ItemsResult};
use crate::streaming::{proxy_base_url, StreamDescriptor};
use crate::sync::classify_collection_type;

type ApiResult<T> = Result<T, ApiError>;

const DEFAULT_PAGE_SIZE: u32 = 100;
const DEFAULT_SEARCH_LIMIT: u32 = 20;
const MAX_SEARCH_LIMIT: u32 = 100;
const IMAGE_KINDS: [&str; 5] = ["Primary", "Backdrop", "Thumb", "Logo", "Banner"];

/// Create media routes.
pub fn media_routes() -> Router<AppContext> {
    Router::new()
        .route("/media/movies", get(list_movies))
        .route("/media/movies/:id", get(get_movie))
        .route("/media/movies/:id/stream", get(movie_stream))
        .route("/media/series", get(list_series))
        .route("/media/series/:id", get(get_series))
        .route("/media/series/:id/seasons", get(get_seasons))
        .route("/media/series/:id/episodes", get(get_episodes))
        .route(
            "/media/series/:id/episodes/:episode_id/stream",
            get(episode_stream),
        )
        .route("/media/search", get(search))
        .route("/media/libraries", get(list_libraries))
        .route("/media/images/:id/:kind", get(get_image))
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub limit: Option<u32>,
    pub start_index: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub genre: Option<String>,
    pub parent_id: Option<String>,
    #[serde(rename = "_t")]
    pub timestamp: Option<String>,
    pub bypass_cache: Option<String>,
}

impl ListParams {
    fn bypass(&self) -> bool {
        is_truthy(self.bypass_cache.as_deref())
    }

    fn to_query(&self, kind: ItemKind) -> ItemQuery {
        let query = ItemQuery::new()
            .item_types(&[kind])
            .limit(self.limit.unwrap_or(DEFAULT_PAGE_SIZE))
            .start_index(self.start_index.unwrap_or(0))
            .sort(
                self.sort_by.as_deref().unwrap_or("SortName"),
                self.sort_order.as_deref().unwrap_or("Ascending"),
            )
            .param_opt("Genres", self.genre.clone())
            .param_opt("ParentId", self.parent_id.clone())
            .param_opt("_t", self.timestamp.clone());

        if self.bypass() {
            query.bypass_cache()
        } else {
            query
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailParams {
    pub bypass_cache: Option<String>,
    pub season_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageParams {
    pub max_width: Option<u32>,
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(value, Some("true") | Some("1"))
}

/// Movie or series as the frontend sees it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub overview: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub year: Option<i32>,
    pub rating: Option<f64>,
    /// Minutes
    pub duration: Option<i64>,
    pub genres: Vec<String>,
}

fn image_route(item_id: &str, kind: &str) -> String {
    format!("/api/media/images/{}/{}", item_id, kind)
}

impl From<&BaseItem> for MediaItem {
    fn from(item: &BaseItem) -> Self {
        Self {
            id: item.id.clone(),
            title: item.name.clone().unwrap_or_default(),
            item_type: item.item_type.clone().unwrap_or_default(),
            overview: item.overview.clone(),
            poster_url: item
                .has_primary_image()
                .then(|| image_route(&item.id, "Primary")),
            backdrop_url: item.has_backdrop().then(|| image_route(&item.id, "Backdrop")),
            year: item.production_year,
            rating: item.community_rating,
            duration: item.runtime_minutes(),
            genres: item.genres.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub start_index: i64,
}

impl ListResponse<MediaItem> {
    fn from_result(result: &ItemsResult) -> Self {
        Self {
            items: result.items.iter().map(MediaItem::from).collect(),
            total_count: result.total_record_count,
            start_index: result.start_index.unwrap_or(0),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonItem {
    pub id: String,
    pub title: String,
    pub season_number: Option<i32>,
    pub poster_url: Option<String>,
    pub episode_count: Option<i64>,
}

impl From<&BaseItem> for SeasonItem {
    fn from(item: &BaseItem) -> Self {
        Self {
            id: item.id.clone(),
            title: item.name.clone().unwrap_or_default(),
            season_number: item.index_number,
            poster_url: item
                .has_primary_image()
                .then(|| image_route(&item.id, "Primary")),
            episode_count: item.child_count,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeItem {
    #[serde(flatten)]
    pub item: MediaItem,
    pub series_id: Option<String>,
    pub season_id: Option<String>,
    pub season_number: Option<i32>,
    pub episode_number: Option<i32>,
}

impl From<&BaseItem> for EpisodeItem {
    fn from(item: &BaseItem) -> Self {
        Self {
            item: MediaItem::from(item),
            series_id: item.series_id.clone(),
            season_id: item.season_id.clone(),
            season_number: item.parent_index_number,
            episode_number: item.index_number,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SeriesDetail {
    #[serde(flatten)]
    pub item: MediaItem,
    pub seasons: Vec<SeasonItem>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LibraryView {
    pub id: String,
    pub name: String,
    pub collection_type: CollectionType,
    pub item_count: Option<i64>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Fetch an item and check it is of the expected kind.
async fn item_of_kind(ctx: &AppContext, id: &str, kind: ItemKind, bypass: bool) -> ApiResult<BaseItem> {
    let client = ensure_client(ctx)?;
    let item = client.get_item_details(id, bypass).await?;

    let actual = item.item_type.as_deref().and_then(ItemKind::from_upstream);
    if actual != Some(kind) {
        return Err(Error::not_found(format!("{} {}", kind, id)).into());
    }
    Ok(item)
}

async fn list_movies(
    State(ctx): State<AppContext>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ListResponse<MediaItem>>> {
    let client = ensure_client(&ctx)?;
    let result = client.get_items(&params.to_query(ItemKind::Movie)).await?;
    Ok(Json(ListResponse::from_result(&result)))
}

async fn get_movie(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(params): Query<DetailParams>,
) -> ApiResult<Json<MediaItem>> {
    let bypass = is_truthy(params.bypass_cache.as_deref());
    let item = item_of_kind(&ctx, &id, ItemKind::Movie, bypass).await?;
    Ok(Json(MediaItem::from(&item)))
}

async fn movie_stream(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<StreamDescriptor>> {
    let client = ensure_client(&ctx)?;
    if !client.item_exists(&id).await? {
        return Err(Error::not_found(format!("movie {}", id)).into());
    }

    let base = proxy_base_url(ctx.config.server.public_url.as_deref(), &headers, &id);
    Ok(Json(StreamDescriptor::new(&id, &base)))
}

async fn list_series(
    State(ctx): State<AppContext>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ListResponse<MediaItem>>> {
    let client = ensure_client(&ctx)?;
    let result = client.get_items(&params.to_query(ItemKind::Series)).await?;
    Ok(Json(ListResponse::from_result(&result)))
}

async fn get_series(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(params): Query<DetailParams>,
) -> ApiResult<Json<SeriesDetail>> {
    let bypass = is_truthy(params.bypass_cache.as_deref());
    let item = item_of_kind(&ctx, &id, ItemKind::Series, bypass).await?;

    let client = ensure_client(&ctx)?;
    let seasons = match client.get_seasons(&id, bypass).await {
        Ok(seasons) => seasons.items.iter().map(SeasonItem::from).collect(),
        Err(e) => {
            tracing::warn!("Seasons of series {} unavailable: {}", id, e);
            Vec::new()
        }
    };

    Ok(Json(SeriesDetail {
        item: MediaItem::from(&item),
        seasons,
    }))
}

async fn get_seasons(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(params): Query<DetailParams>,
) -> ApiResult<Json<ListResponse<SeasonItem>>> {
    let client = ensure_client(&ctx)?;
    let result = client
        .get_seasons(&id, is_truthy(params.bypass_cache.as_deref()))
        .await?;

    Ok(Json(ListResponse {
        items: result.items.iter().map(SeasonItem::from).collect(),
        total_count: result.total_record_count,
        start_index: result.start_index.unwrap_or(0),
    }))
}

async fn get_episodes(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(params): Query<DetailParams>,
) -> ApiResult<Json<ListResponse<EpisodeItem>>> {
    let client = ensure_client(&ctx)?;
    let result = client
        .get_episodes(
            &id,
            params.season_id.as_deref(),
            is_truthy(params.bypass_cache.as_deref()),
        )
        .await?;

    Ok(Json(ListResponse {
        items: result.items.iter().map(EpisodeItem::from).collect(),
        total_count: result.total_record_count,
        start_index: result.start_index.unwrap_or(0),
    }))
}

async fn episode_stream(
    State(ctx): State<AppContext>,
    Path((series_id, episode_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Json<StreamDescriptor>> {
    let client = ensure_client(&ctx)?;
    let episode = client.get_item_details(&episode_id, false).await?;

    if episode.item_type.as_deref().and_then(ItemKind::from_upstream) != Some(ItemKind::Episode) {
        return Err(Error::validation_mismatch(format!("{} is not an episode", episode_id)).into());
    }
    if episode.series_id.as_deref() != Some(series_id.as_str()) {
        return Err(Error::validation_mismatch(format!(
            "episode {} does not belong to series {}",
            episode_id, series_id
        ))
        .into());
    }

    let base = proxy_base_url(ctx.config.server.public_url.as_deref(), &headers, &episode_id);
    Ok(Json(StreamDescriptor::new(&episode_id, &base)))
}

async fn search(
    State(ctx): State<AppContext>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<ListResponse<MediaItem>>> {
    let term = params.q.trim();
    if term.is_empty() {
        return Err(Error::invalid_input("query parameter `q` is required").into());
    }
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);

    let client = ensure_client(&ctx)?;
    let result = client.search(term, limit).await?;
    Ok(Json(ListResponse::from_result(&result)))
}

/// Visible synced libraries of the active config, or the live upstream list
/// when nothing has been synced yet.
async fn list_libraries(State(ctx): State<AppContext>) -> ApiResult<Json<Vec<LibraryView>>> {
    let synced = {
        let conn = get_conn(&ctx.db_pool)?;
        match configs::get_active_config(&conn)? {
            Some(config) if !libraries::list_libraries(&conn, config.id)?.is_empty() => {
                Some(libraries::list_visible_libraries(&conn, config.id)?)
            }
            _ => None,
        }
    };

    if let Some(records) = synced {
        return Ok(Json(
            records
                .into_iter()
                .map(|r| LibraryView {
                    id: r.library_id,
                    name: r.library_name,
                    collection_type: r.collection_type,
                    item_count: Some(r.item_count),
                })
                .collect(),
        ));
    }

    let client = ensure_client(&ctx)?;
    let folders = client.get_libraries().await?;
    Ok(Json(
        folders
            .iter()
            .filter_map(|folder| {
                Some(LibraryView {
                    id: folder.library_id()?.to_string(),
                    name: folder.name.clone(),
                    collection_type: classify_collection_type(&folder.collection_type),
                    item_count: folder.reported_item_count(),
                })
            })
            .collect(),
    ))
}

async fn get_image(
    State(ctx): State<AppContext>,
    Path((id, kind)): Path<(String, String)>,
    Query(params): Query<ImageParams>,
) -> ApiResult<Response> {
    let Some(kind) = IMAGE_KINDS.iter().find(|k| k.eq_ignore_ascii_case(&kind)) else {
        return Err(Error::invalid_input(format!("Unknown image type: {}", kind)).into());
    };

    let client = ensure_client(&ctx)?;
    let response = client.fetch_image(&id, kind, params.max_width).await?;

    let status = response.status();
    if status.as_u16() == 404 {
        return Err(Error::not_found(format!("{} image for {}", kind, id)).into());
    }
    if !status.is_success() {
        return Err(Error::upstream(status.as_u16(), format!("image fetch failed ({})", status)).into());
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| HeaderValue::from_str(v).ok())
        .unwrap_or_else(|| HeaderValue::from_static("image/jpeg"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static("public, max-age=86400")),
        ],
        Body::from_stream(response.bytes_stream()),
    )
        .into_response())
}
