//! Rust models matching the database schema.

use chrono::{DateTime, Utc};
use ifilm_common::{CollectionType, ConfigId};
use serde::{Deserialize, Serialize};

/// Upstream Jellyfin server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JellyfinConfigRecord {
    pub id: ConfigId,
    pub name: String,
    pub server_url: String,
    pub api_key: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Library synced from an upstream server, unique per `(config_id, library_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryRecord {
    pub config_id: ConfigId,
    pub library_id: String,
    pub library_name: String,
    pub collection_type: CollectionType,
    pub is_visible: bool,
    pub item_count: i64,
    pub last_sync: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Values written by one sync pass for one library.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryUpsert {
    pub library_id: String,
    pub library_name: String,
    pub collection_type: CollectionType,
    pub item_count: i64,
}
