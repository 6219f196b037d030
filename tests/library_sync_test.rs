//! Integration tests for library sync against a mock upstream.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use common::{TestHarness, API_KEY};
use ifilm::cache::ResponseCache;
use ifilm::jellyfin::{CacheTtls, JellyfinClient, JellyfinConnection};
use ifilm::sync::{sync_config, sync_libraries};
use ifilm_common::{CollectionType, ConfigId, Error};
use ifilm_db::queries::libraries;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

async fn mount_upstream_libraries(h: &TestHarness) {
    Mock::given(method("GET"))
        .and(path("/Library/VirtualFolders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"Name": "Films", "ItemId": "L1", "CollectionType": "movies"},
            {"Name": "Shows", "ItemId": "L2", "CollectionType": "tvshows", "ChildCount": 7},
            {"Name": "Everything", "Id": "L3", "CollectionType": ["movies", "tvshows"]},
            {"Name": "Orphan"}
        ])))
        .mount(&h.upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/Items"))
        .and(query_param("ParentId", "L1"))
        .and(query_param("Limit", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Items": [], "TotalRecordCount": 42})))
        .mount(&h.upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/Items"))
        .and(query_param("ParentId", "L2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/Items"))
        .and(query_param("ParentId", "L3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Items": [], "TotalRecordCount": 3})))
        .mount(&h.upstream)
        .await;
}

fn client_for(h: &TestHarness) -> JellyfinClient {
    JellyfinClient::connect(
        &JellyfinConnection::new(h.upstream.uri(), API_KEY),
        Arc::new(ResponseCache::new()),
        CacheTtls::default(),
    )
}

#[tokio::test]
async fn sync_classifies_and_counts_libraries() {
    let h = TestHarness::new().await;
    mount_upstream_libraries(&h).await;
    let config = h.create_config("home");

    let report = sync_libraries(&h.db, &client_for(&h), config.id).await.unwrap();
    assert_eq!(report.synced, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].library_name, "Orphan");

    let rows = libraries::list_libraries(&h.conn(), config.id).unwrap();
    assert_eq!(rows.len(), 3);

    let films = rows.iter().find(|r| r.library_id == "L1").unwrap();
    assert_eq!(films.collection_type, CollectionType::Movies);
    assert_eq!(films.item_count, 42);
    assert!(films.is_visible);

    // Count query failed: falls back to the count embedded in the listing.
    let shows = rows.iter().find(|r| r.library_id == "L2").unwrap();
    assert_eq!(shows.collection_type, CollectionType::TvShows);
    assert_eq!(shows.item_count, 7);

    let mixed = rows.iter().find(|r| r.library_id == "L3").unwrap();
    assert_eq!(mixed.collection_type, CollectionType::Mixed);
}

#[tokio::test]
async fn resync_is_idempotent_and_keeps_visibility() {
    let h = TestHarness::new().await;
    mount_upstream_libraries(&h).await;
    let config = h.create_config("home");
    let client = client_for(&h);

    sync_libraries(&h.db, &client, config.id).await.unwrap();
    libraries::set_visibility(&h.conn(), config.id, "L1", false).unwrap();

    let report = sync_libraries(&h.db, &client, config.id).await.unwrap();
    assert_eq!(report.synced, 3);

    let rows = libraries::list_libraries(&h.conn(), config.id).unwrap();
    assert_eq!(rows.len(), 3);
    let films = rows.iter().find(|r| r.library_id == "L1").unwrap();
    assert!(!films.is_visible);

    let visible = libraries::list_visible_libraries(&h.conn(), config.id).unwrap();
    assert_eq!(visible.len(), 2);
}

#[tokio::test]
async fn sync_config_loads_stored_connection() {
    let h = TestHarness::new().await;
    mount_upstream_libraries(&h).await;
    let config = h.create_config("home");

    let report = sync_config(&h.db, config.id, CacheTtls::default()).await.unwrap();
    assert_eq!(report.config_id, config.id);
    assert_eq!(report.synced, 3);
}

#[tokio::test]
async fn sync_unknown_config_is_not_found() {
    let h = TestHarness::new().await;

    let result = sync_config(&h.db, ConfigId::new(), CacheTtls::default()).await;
    assert_matches!(result, Err(Error::NotFound(_)));
}

#[tokio::test]
async fn sync_fails_when_listing_fails() {
    let h = TestHarness::new().await;
    Mock::given(method("GET"))
        .and(path("/Library/VirtualFolders"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.upstream)
        .await;
    let config = h.create_config("home");

    let result = sync_libraries(&h.db, &client_for(&h), config.id).await;
    assert_matches!(result, Err(Error::Upstream { status: 401, .. }));
    assert!(libraries::list_libraries(&h.conn(), config.id).unwrap().is_empty());
}
