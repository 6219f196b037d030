//! Admin API routes.
//!
//! Manage upstream server configurations, run library syncs, toggle library
//! visibility and flush the response cache.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use ifilm_common::{ConfigId, Error};
use ifilm_db::models::{JellyfinConfigRecord, LibraryRecord};
use ifilm_db::pool::get_conn;
use ifilm_db::queries::{configs, libraries};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppContext};
use crate::cache::ResponseCache;
use crate::jellyfin::{CacheTtls, JellyfinClient, JellyfinConnection};
use crate::sync::{sync_config, SyncReport};

type ApiResult<T> = Result<T, ApiError>;

/// Create admin routes.
pub fn admin_routes() -> Router<AppContext> {
    Router::new()
        .route("/admin/jellyfin", get(list_configs).post(create_config))
        .route("/admin/jellyfin/test", post(test_connection))
        .route(
            "/admin/jellyfin/:id",
            get(get_config).delete(delete_config),
        )
        .route("/admin/jellyfin/:id/activate", post(activate_config))
        .route("/admin/jellyfin/:id/sync", post(sync_libraries))
        .route("/admin/jellyfin/:id/libraries", get(list_libraries))
        .route(
            "/admin/jellyfin/:id/libraries/:library_id/visibility",
            put(set_visibility),
        )
        .route("/admin/cache/flush", post(flush_cache))
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateConfigRequest {
    pub name: String,
    pub server_url: String,
    pub api_key: String,
    /// Activate immediately after creation.
    #[serde(default)]
    pub activate: bool,
}

#[derive(Debug, Deserialize)]
pub struct TestConnectionRequest {
    pub server_url: String,
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct TestConnectionResponse {
    pub success: bool,
    pub server_name: Option<String>,
    pub version: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub visible: bool,
}

#[derive(Debug, Serialize)]
pub struct FlushResponse {
    pub flushed: usize,
}

/// Stored config without its API key.
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub id: ConfigId,
    pub name: String,
    pub server_url: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<JellyfinConfigRecord> for ConfigResponse {
    fn from(record: JellyfinConfigRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            server_url: record.server_url,
            is_active: record.is_active,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

fn parse_config_id(id: &str) -> Result<ConfigId, Error> {
    id.parse()
        .map_err(|_| Error::invalid_input(format!("Invalid config ID: {}", id)))
}

fn validate_connection_fields(server_url: &str, api_key: &str) -> Result<(), Error> {
    let server_url = server_url.trim();
    if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
        return Err(Error::invalid_input("server_url must start with http:// or https://"));
    }
    if api_key.trim().is_empty() {
        return Err(Error::invalid_input("api_key cannot be empty"));
    }
    Ok(())
}

fn load_config(ctx: &AppContext, id: ConfigId) -> Result<JellyfinConfigRecord, Error> {
    let conn = get_conn(&ctx.db_pool)?;
    configs::get_config(&conn, id)?
        .ok_or_else(|| Error::not_found(format!("Jellyfin config {}", id)))
}

/// Mark `id` active and reconnect the shared client to it.
fn activate(ctx: &AppContext, id: ConfigId) -> Result<JellyfinConfigRecord, Error> {
    let record = {
        let conn = get_conn(&ctx.db_pool)?;
        configs::set_active_config(&conn, id)?;
        configs::get_config(&conn, id)?
            .ok_or_else(|| Error::not_found(format!("Jellyfin config {}", id)))?
    };

    ctx.state.initialize(&JellyfinConnection::from(&record));
    tracing::info!("Activated Jellyfin config {} ({})", record.name, record.id);
    Ok(record)
}

// ============================================================================
// Handlers
// ============================================================================

async fn list_configs(State(ctx): State<AppContext>) -> ApiResult<Json<Vec<ConfigResponse>>> {
    let conn = get_conn(&ctx.db_pool)?;
    let records = configs::list_configs(&conn)?;
    Ok(Json(records.into_iter().map(ConfigResponse::from).collect()))
}

async fn create_config(
    State(ctx): State<AppContext>,
    Json(request): Json<CreateConfigRequest>,
) -> ApiResult<(StatusCode, Json<ConfigResponse>)> {
    if request.name.trim().is_empty() {
        return Err(Error::invalid_input("name cannot be empty").into());
    }
    validate_connection_fields(&request.server_url, &request.api_key)?;

    let record = {
        let conn = get_conn(&ctx.db_pool)?;
        configs::create_config(
            &conn,
            request.name.trim(),
            request.server_url.trim(),
            request.api_key.trim(),
        )?
    };
    tracing::info!("Created Jellyfin config {} ({})", record.name, record.id);

    let record = if request.activate {
        activate(&ctx, record.id)?
    } else {
        record
    };

    Ok((StatusCode::CREATED, Json(record.into())))
}

async fn get_config(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<ConfigResponse>> {
    let id = parse_config_id(&id)?;
    Ok(Json(load_config(&ctx, id)?.into()))
}

async fn delete_config(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_config_id(&id)?;
    let record = load_config(&ctx, id)?;

    {
        let conn = get_conn(&ctx.db_pool)?;
        configs::delete_config(&conn, id)?;
    }

    if record.is_active {
        ctx.state.disconnect();
        tracing::info!("Deleted active Jellyfin config {}; client disconnected", id);
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn activate_config(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<ConfigResponse>> {
    let id = parse_config_id(&id)?;
    Ok(Json(activate(&ctx, id)?.into()))
}

async fn test_connection(Json(request): Json<TestConnectionRequest>) -> ApiResult<Json<TestConnectionResponse>> {
    validate_connection_fields(&request.server_url, &request.api_key)?;

    let client = JellyfinClient::connect(
        &JellyfinConnection::new(request.server_url.trim(), request.api_key.trim()),
        Arc::new(ResponseCache::new()),
        CacheTtls::default(),
    );

    let response = match client.system_info().await {
        Ok(info) => TestConnectionResponse {
            success: true,
            server_name: info.server_name,
            version: info.version,
            message: None,
        },
        Err(e) => TestConnectionResponse {
            success: false,
            server_name: None,
            version: None,
            message: Some(e.to_string()),
        },
    };

    Ok(Json(response))
}

async fn sync_libraries(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<SyncReport>> {
    let id = parse_config_id(&id)?;
    let report = sync_config(&ctx.db_pool, id, CacheTtls::from(&ctx.config.cache)).await?;
    Ok(Json(report))
}

async fn list_libraries(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<LibraryRecord>>> {
    let id = parse_config_id(&id)?;
    load_config(&ctx, id)?;

    let conn = get_conn(&ctx.db_pool)?;
    Ok(Json(libraries::list_libraries(&conn, id)?))
}

async fn set_visibility(
    State(ctx): State<AppContext>,
    Path((id, library_id)): Path<(String, String)>,
    Json(request): Json<VisibilityRequest>,
) -> ApiResult<Json<LibraryRecord>> {
    let id = parse_config_id(&id)?;

    let conn = get_conn(&ctx.db_pool)?;
    libraries::set_visibility(&conn, id, &library_id, request.visible)?;
    let record = libraries::get_library(&conn, id, &library_id)?
        .ok_or_else(|| Error::not_found(format!("library {}", library_id)))?;
    Ok(Json(record))
}

async fn flush_cache(State(ctx): State<AppContext>) -> Json<FlushResponse> {
    let flushed = ctx.state.cache().len();
    ctx.state.reset();
    tracing::info!("Flushed {} cached responses", flushed);
    Json(FlushResponse { flushed })
}
