use crate::cache::start_sweep_task;
use crate::config::Config;
use crate::jellyfin::{JellyfinClient, JellyfinConnection};
use crate::state::AppState;
use crate::streaming;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use ifilm_common::Error;
use ifilm_db::pool::{get_conn, DbPool};
use ifilm_db::queries::configs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

pub mod error;
pub mod routes_admin;
pub mod routes_media;

pub use error::ApiError;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<AppState>,
    pub config: Arc<Config>,
    /// Stores upstream configs and synced libraries
    pub db_pool: DbPool,
}

impl AppContext {
    pub fn new(config: Config, db_pool: DbPool) -> Self {
        let state = Arc::new(AppState::new(&config.cache, &config.proxy));
        Self {
            state,
            config: Arc::new(config),
            db_pool,
        }
    }
}

/// Upstream connection to use: the active stored config, else the `[jellyfin]`
/// section of the config file.
pub fn resolve_connection(config: &Config, pool: &DbPool) -> ifilm_common::Result<JellyfinConnection> {
    let conn = get_conn(pool)?;
    if let Some(record) = configs::get_active_config(&conn)? {
        return Ok(JellyfinConnection::from(&record));
    }

    match config.jellyfin {
        Some(ref jellyfin) => Ok(JellyfinConnection::from(jellyfin)),
        None => Err(Error::not_configured("no active Jellyfin server")),
    }
}

/// The connected client, connecting lazily on first use.
pub fn ensure_client(ctx: &AppContext) -> ifilm_common::Result<Arc<JellyfinClient>> {
    if let Ok(client) = ctx.state.client() {
        return Ok(client);
    }
    let connection = resolve_connection(&ctx.config, &ctx.db_pool)?;
    Ok(ctx.state.get_or_initialize(&connection))
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext, static_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::RANGE]);

    let api = routes_media::media_routes()
        .merge(streaming::stream_router())
        .merge(routes_admin::admin_routes());

    let mut app = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    // SPA fallback: serve index.html for any route that doesn't match a file
    if let Some(dir) = static_dir {
        if dir.exists() {
            tracing::info!("Serving static files from {:?}", dir);
            let index_path = dir.join("index.html");
            app = app.fallback_service(
                ServeDir::new(&dir)
                    .append_index_html_on_directories(true)
                    .not_found_service(ServeFile::new(index_path)),
            );
        }
    }

    app
}

async fn health_check(State(ctx): State<AppContext>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "jellyfin": ctx.state.connected_url(),
    }))
}

/// Start the HTTP server
pub async fn start_server(config: Config, db_pool: DbPool) -> Result<()> {
    start_server_with_options(config, db_pool, None).await
}

/// Start the HTTP server, optionally on an already-bound listener
pub async fn start_server_with_options(
    config: Config,
    db_pool: DbPool,
    listener: Option<tokio::net::TcpListener>,
) -> Result<()> {
    let listener = match listener {
        Some(listener) => listener,
        None => {
            let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
                .parse()
                .context("Invalid server address")?;
            tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?
        }
    };

    let static_dir = config.server.static_dir.clone();
    let sweep_interval = config.cache.sweep_interval_secs;
    let ctx = AppContext::new(config, db_pool);

    let sweeper = (sweep_interval > 0).then(|| start_sweep_task(ctx.state.cache().clone(), sweep_interval));

    match resolve_connection(&ctx.config, &ctx.db_pool) {
        Ok(connection) => {
            ctx.state.get_or_initialize(&connection);
        }
        Err(e) if e.is_not_configured() => {
            tracing::warn!("No Jellyfin server configured yet; media routes answer 503 until one is activated");
        }
        Err(e) => return Err(e).context("Failed to load Jellyfin configuration"),
    }

    let app = create_router(ctx, static_dir);

    tracing::info!("Starting server on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
