//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which wires an in-memory DB and a config pointing
//! at a [`MockServer`] standing in for Jellyfin into a full [`AppContext`].
//! [`TestHarness::with_server`] starts Axum on a random port for HTTP-level
//! testing.

#![allow(dead_code)]

use std::net::SocketAddr;

use ifilm::config::{Config, JellyfinConfig};
use ifilm::server::{create_router, AppContext};
use ifilm_db::models::JellyfinConfigRecord;
use ifilm_db::pool::{init_memory_pool, DbPool};
use ifilm_db::queries::configs;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_KEY: &str = "test-api-key";

/// Test harness wrapping a fully-constructed [`AppContext`] backed by an
/// in-memory database and a mock upstream.
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub upstream: MockServer,
}

impl TestHarness {
    /// Harness whose config file points `[jellyfin]` at the mock upstream.
    pub async fn new() -> Self {
        let upstream = MockServer::start().await;
        let mut config = Config::default();
        config.jellyfin = Some(JellyfinConfig {
            url: upstream.uri(),
            api_key: API_KEY.to_string(),
        });
        Self::build(config, upstream)
    }

    /// Harness with no upstream configured anywhere.
    pub async fn unconfigured() -> Self {
        let upstream = MockServer::start().await;
        Self::build(Config::default(), upstream)
    }

    /// Harness with the stream proxy logging in as `proxy`/`secret`.
    pub async fn with_proxy_account() -> Self {
        let upstream = MockServer::start().await;
        let mut config = Config::default();
        config.jellyfin = Some(JellyfinConfig {
            url: upstream.uri(),
            api_key: API_KEY.to_string(),
        });
        config.proxy.username = Some("proxy".to_string());
        config.proxy.password = Some("secret".to_string());
        Self::build(config, upstream)
    }

    fn build(config: Config, upstream: MockServer) -> Self {
        let db = init_memory_pool().expect("failed to create in-memory pool");
        let ctx = AppContext::new(config, db.clone());
        Self { ctx, db, upstream }
    }

    /// Start an Axum server on a random port and return its address.
    pub async fn serve(&self) -> SocketAddr {
        let app = create_router(self.ctx.clone(), None);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        addr
    }

    /// Harness plus a running server.
    pub async fn with_server() -> (Self, SocketAddr) {
        let harness = Self::new().await;
        let addr = harness.serve().await;
        (harness, addr)
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> ifilm_db::pool::PooledConnection {
        ifilm_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }

    /// Store a config for the mock upstream.
    pub fn create_config(&self, name: &str) -> JellyfinConfigRecord {
        configs::create_config(&self.conn(), name, &self.upstream.uri(), API_KEY)
            .expect("failed to create config")
    }

    /// Answer `GET /Users` with a single user `u1`.
    pub async fn mount_default_user(&self) {
        Mock::given(method("GET"))
            .and(path("/Users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"Id": "u1", "Name": "admin"}])))
            .mount(&self.upstream)
            .await;
    }

    /// Answer the user-scoped details of `item_id` with `body`.
    pub async fn mount_item(&self, item_id: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/Users/u1/Items/{}", item_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.upstream)
            .await;
    }
}

/// Upstream item JSON with the fields the proxy reads.
pub fn movie(id: &str, name: &str) -> Value {
    json!({
        "Id": id,
        "Name": name,
        "Type": "Movie",
        "ProductionYear": 2010,
        "RunTimeTicks": 88_800_000_000i64,
        "Genres": ["Sci-Fi"],
        "ImageTags": {"Primary": "tag"},
        "MediaSources": [{"Id": format!("{}-src", id)}]
    })
}

pub fn episode(id: &str, series_id: &str) -> Value {
    json!({
        "Id": id,
        "Name": "Pilot",
        "Type": "Episode",
        "SeriesId": series_id,
        "IndexNumber": 1,
        "ParentIndexNumber": 1
    })
}
