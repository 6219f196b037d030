//! Library sync.
//!
//! Copies the upstream library list into `jellyfin_libraries` for one server
//! configuration. Each library is handled on its own: a failed item count
//! falls back to whatever count the upstream listing embedded, and a library
//! without an ID is skipped. Storage failures abort the sync.

use std::sync::Arc;

use ifilm_common::{CollectionType, ConfigId, Error, Result};
use ifilm_db::models::{LibraryRecord, LibraryUpsert};
use ifilm_db::pool::{get_conn, DbPool};
use ifilm_db::queries::{configs, libraries};
use serde::Serialize;
use serde_json::Value;

use crate::cache::ResponseCache;
use crate::jellyfin::{CacheTtls, JellyfinClient, JellyfinConnection, LibraryFolder};

/// Reduce an upstream `CollectionType` field to one of the four classes.
///
/// A recognized string maps to its class, a single-element array to that
/// element's class. Everything else is `mixed`.
pub fn classify_collection_type(value: &Value) -> CollectionType {
    match value {
        Value::String(s) => CollectionType::from_upstream(s).unwrap_or(CollectionType::Mixed),
        Value::Array(values) if values.len() == 1 => classify_collection_type(&values[0]),
        _ => CollectionType::Mixed,
    }
}

/// A library that could not be synced.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SyncFailure {
    pub library_name: String,
    pub reason: String,
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub config_id: ConfigId,
    pub synced: usize,
    pub failed: usize,
    pub libraries: Vec<LibraryRecord>,
    pub failures: Vec<SyncFailure>,
}

async fn resolve_item_count(client: &JellyfinClient, library_id: &str, folder: &LibraryFolder) -> i64 {
    match client.get_library_item_count(library_id).await {
        Ok(count) => count,
        Err(e) => {
            let fallback = folder.reported_item_count().unwrap_or(0);
            tracing::warn!(
                "Item count for library {} failed ({}); using {}",
                folder.name,
                e,
                fallback
            );
            fallback
        }
    }
}

/// Sync the libraries `client` sees into the rows of `config_id`.
pub async fn sync_libraries(pool: &DbPool, client: &JellyfinClient, config_id: ConfigId) -> Result<SyncReport> {
    let folders = client.fetch_libraries(true).await?;
    tracing::info!("Syncing {} libraries for config {}", folders.len(), config_id);

    let mut report = SyncReport {
        config_id,
        synced: 0,
        failed: 0,
        libraries: Vec::with_capacity(folders.len()),
        failures: Vec::new(),
    };

    for folder in &folders {
        let Some(library_id) = folder.library_id() else {
            tracing::warn!("Skipping library {:?} without an ID", folder.name);
            report.failed += 1;
            report.failures.push(SyncFailure {
                library_name: folder.name.clone(),
                reason: "library has no ID".to_string(),
            });
            continue;
        };

        let item_count = resolve_item_count(client, library_id, folder).await;
        let upsert = LibraryUpsert {
            library_id: library_id.to_string(),
            library_name: folder.name.clone(),
            collection_type: classify_collection_type(&folder.collection_type),
            item_count,
        };

        let conn = get_conn(pool)?;
        let record = libraries::upsert_library(&conn, config_id, &upsert)?;
        tracing::debug!(
            "Synced library {} ({}, {} items)",
            record.library_name,
            record.collection_type,
            record.item_count
        );
        report.libraries.push(record);
        report.synced += 1;
    }

    tracing::info!(
        "Library sync for {} finished: {} synced, {} failed",
        config_id,
        report.synced,
        report.failed
    );
    Ok(report)
}

/// Load a stored configuration and sync its libraries.
///
/// The configuration need not be the active one, so the sync runs on its
/// own client with a private cache.
pub async fn sync_config(pool: &DbPool, config_id: ConfigId, ttls: CacheTtls) -> Result<SyncReport> {
    let record = {
        let conn = get_conn(pool)?;
        configs::get_config(&conn, config_id)?
    }
    .ok_or_else(|| Error::not_found(format!("Jellyfin config {}", config_id)))?;

    let client = JellyfinClient::connect(
        &JellyfinConnection::from(&record),
        Arc::new(ResponseCache::new()),
        ttls,
    );
    sync_libraries(pool, &client, config_id).await
}
