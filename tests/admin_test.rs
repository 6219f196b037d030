//! Integration tests for the admin API.

mod common;

use std::time::Duration;

use common::{TestHarness, API_KEY};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

async fn create(client: &reqwest::Client, addr: &std::net::SocketAddr, body: Value) -> reqwest::Response {
    client
        .post(format!("http://{addr}/api/admin/jellyfin"))
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn config_crud() {
    let h = TestHarness::unconfigured().await;
    let addr = h.serve().await;
    let client = reqwest::Client::new();

    let resp = create(
        &client,
        &addr,
        json!({"name": "home", "server_url": h.upstream.uri(), "api_key": API_KEY}),
    )
    .await;
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.unwrap();
    assert_eq!(created["name"], "home");
    assert_eq!(created["is_active"], false);
    assert!(created.get("api_key").is_none());
    let id = created["id"].as_str().unwrap().to_string();

    let list: Value = client
        .get(format!("http://{addr}/api/admin/jellyfin"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);

    let resp = client
        .get(format!("http://{addr}/api/admin/jellyfin/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .delete(format!("http://{addr}/api/admin/jellyfin/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("http://{addr}/api/admin/jellyfin/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn invalid_configs_are_rejected() {
    let h = TestHarness::unconfigured().await;
    let addr = h.serve().await;
    let client = reqwest::Client::new();

    let resp = create(
        &client,
        &addr,
        json!({"name": "bad", "server_url": "jellyfin.local", "api_key": "k"}),
    )
    .await;
    assert_eq!(resp.status(), 400);

    let resp = create(
        &client,
        &addr,
        json!({"name": "", "server_url": "http://jf", "api_key": "k"}),
    )
    .await;
    assert_eq!(resp.status(), 400);

    let resp = client
        .get(format!("http://{addr}/api/admin/jellyfin/not-a-uuid"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn activation_connects_and_flushes_cache() {
    let h = TestHarness::unconfigured().await;
    let addr = h.serve().await;
    let client = reqwest::Client::new();

    h.ctx
        .state
        .cache()
        .set("libraries", json!([]), Duration::from_secs(60));

    let created: Value = create(
        &client,
        &addr,
        json!({"name": "home", "server_url": h.upstream.uri(), "api_key": API_KEY}),
    )
    .await
    .json()
    .await
    .unwrap();
    let id = created["id"].as_str().unwrap();

    let resp = client
        .post(format!("http://{addr}/api/admin/jellyfin/{id}/activate"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let activated: Value = resp.json().await.unwrap();
    assert_eq!(activated["is_active"], true);
    assert!(h.ctx.state.cache().is_empty());

    let health: Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["jellyfin"], h.upstream.uri());

    // Deleting the active config leaves nothing to connect to.
    client
        .delete(format!("http://{addr}/api/admin/jellyfin/{id}"))
        .send()
        .await
        .unwrap();
    let resp = client
        .get(format!("http://{addr}/api/media/movies"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
}

#[tokio::test]
async fn only_one_config_is_active() {
    let h = TestHarness::unconfigured().await;
    let addr = h.serve().await;
    let client = reqwest::Client::new();

    let first: Value = create(
        &client,
        &addr,
        json!({"name": "a", "server_url": "http://a:8096", "api_key": "k", "activate": true}),
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(first["is_active"], true);

    create(
        &client,
        &addr,
        json!({"name": "b", "server_url": "http://b:8096", "api_key": "k", "activate": true}),
    )
    .await;

    let list: Value = client
        .get(format!("http://{addr}/api/admin/jellyfin"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let active: Vec<&Value> = list
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["is_active"] == true)
        .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["name"], "b");
    assert_eq!(h.ctx.state.connected_url().as_deref(), Some("http://b:8096"));
}

#[tokio::test]
async fn test_connection_reports_server() {
    let h = TestHarness::unconfigured().await;
    Mock::given(method("GET"))
        .and(path("/System/Info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ServerName": "living-room",
            "Version": "10.9.0"
        })))
        .mount(&h.upstream)
        .await;
    let addr = h.serve().await;
    let client = reqwest::Client::new();

    let json: Value = client
        .post(format!("http://{addr}/api/admin/jellyfin/test"))
        .json(&json!({"server_url": h.upstream.uri(), "api_key": API_KEY}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["server_name"], "living-room");
    assert_eq!(json["version"], "10.9.0");

    let json: Value = client
        .post(format!("http://{addr}/api/admin/jellyfin/test"))
        .json(&json!({"server_url": "http://127.0.0.1:1", "api_key": API_KEY}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["success"], false);
    assert!(json["message"].is_string());
}

#[tokio::test]
async fn sync_then_hide_library() {
    let h = TestHarness::unconfigured().await;
    Mock::given(method("GET"))
        .and(path("/Library/VirtualFolders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Items": [
                {"Name": "Films", "ItemId": "L1", "CollectionType": "movies"},
                {"Name": "Music", "ItemId": "L2", "CollectionType": "music"}
            ]
        })))
        .mount(&h.upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/Items"))
        .and(query_param("Limit", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Items": [], "TotalRecordCount": 5})))
        .mount(&h.upstream)
        .await;
    let addr = h.serve().await;
    let client = reqwest::Client::new();

    let created: Value = create(
        &client,
        &addr,
        json!({"name": "home", "server_url": h.upstream.uri(), "api_key": API_KEY, "activate": true}),
    )
    .await
    .json()
    .await
    .unwrap();
    let id = created["id"].as_str().unwrap();

    let report: Value = client
        .post(format!("http://{addr}/api/admin/jellyfin/{id}/sync"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["synced"], 2);
    assert_eq!(report["failed"], 0);

    let resp = client
        .put(format!("http://{addr}/api/admin/jellyfin/{id}/libraries/L2/visibility"))
        .json(&json!({"visible": false}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let record: Value = resp.json().await.unwrap();
    assert_eq!(record["is_visible"], false);

    let all: Value = client
        .get(format!("http://{addr}/api/admin/jellyfin/{id}/libraries"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.as_array().unwrap().len(), 2);

    let visible: Value = client
        .get(format!("http://{addr}/api/media/libraries"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let visible = visible.as_array().unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0]["id"], "L1");
    assert_eq!(visible[0]["itemCount"], 5);

    let resp = client
        .put(format!("http://{addr}/api/admin/jellyfin/{id}/libraries/L9/visibility"))
        .json(&json!({"visible": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn flush_empties_cache() {
    let (h, addr) = TestHarness::with_server().await;
    let cache = h.ctx.state.cache();
    cache.set("a", json!(1), Duration::from_secs(60));
    cache.set("b", json!(2), Duration::from_secs(60));

    let json: Value = reqwest::Client::new()
        .post(format!("http://{addr}/api/admin/cache/flush"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["flushed"], 2);
    assert!(cache.is_empty());
}
