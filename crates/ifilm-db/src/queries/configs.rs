//! Upstream server configuration queries.
//!
//! At most one configuration is active at a time; the active one is what the
//! proxy connects to when it initializes lazily.

use chrono::Utc;
use ifilm_common::{ConfigId, Error, Result};
use rusqlite::{Connection, OptionalExtension, Row};

use super::{map_write_error, parse_column, parse_timestamp};
use crate::models::JellyfinConfigRecord;

const SELECT_COLUMNS: &str =
    "SELECT id, name, server_url, api_key, is_active, created_at, updated_at FROM jellyfin_configs";

fn row_to_config(row: &Row<'_>) -> rusqlite::Result<JellyfinConfigRecord> {
    Ok(JellyfinConfigRecord {
        id: parse_column(0, &row.get::<_, String>(0)?)?,
        name: row.get(1)?,
        server_url: row.get(2)?,
        api_key: row.get(3)?,
        is_active: row.get(4)?,
        created_at: parse_timestamp(5, &row.get::<_, String>(5)?)?,
        updated_at: parse_timestamp(6, &row.get::<_, String>(6)?)?,
    })
}

/// Create a new, inactive configuration.
pub fn create_config(
    conn: &Connection,
    name: &str,
    server_url: &str,
    api_key: &str,
) -> Result<JellyfinConfigRecord> {
    let id = ConfigId::new();
    let now = Utc::now();
    let server_url = server_url.trim_end_matches('/');

    conn.execute(
        "INSERT INTO jellyfin_configs (id, name, server_url, api_key, is_active, created_at, updated_at)
         VALUES (:id, :name, :server_url, :api_key, 0, :now, :now)",
        rusqlite::named_params! {
            ":id": id.to_string(),
            ":name": name,
            ":server_url": server_url,
            ":api_key": api_key,
            ":now": now.to_rfc3339(),
        },
    )
    .map_err(map_write_error)?;

    Ok(JellyfinConfigRecord {
        id,
        name: name.to_string(),
        server_url: server_url.to_string(),
        api_key: api_key.to_string(),
        is_active: false,
        created_at: now,
        updated_at: now,
    })
}

/// Get a configuration by ID.
pub fn get_config(conn: &Connection, id: ConfigId) -> Result<Option<JellyfinConfigRecord>> {
    conn.query_row(
        &format!("{} WHERE id = :id", SELECT_COLUMNS),
        rusqlite::named_params! { ":id": id.to_string() },
        row_to_config,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Get the active configuration, if any.
pub fn get_active_config(conn: &Connection) -> Result<Option<JellyfinConfigRecord>> {
    conn.query_row(
        &format!("{} WHERE is_active = 1 LIMIT 1", SELECT_COLUMNS),
        [],
        row_to_config,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// List all configurations, oldest first.
pub fn list_configs(conn: &Connection) -> Result<Vec<JellyfinConfigRecord>> {
    let mut stmt = conn
        .prepare(&format!("{} ORDER BY created_at, name", SELECT_COLUMNS))
        .map_err(|e| Error::database(e.to_string()))?;

    let configs = stmt
        .query_map([], row_to_config)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(configs)
}

/// Make `id` the only active configuration.
pub fn set_active_config(conn: &Connection, id: ConfigId) -> Result<()> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| Error::database(e.to_string()))?;

    tx.execute("UPDATE jellyfin_configs SET is_active = 0 WHERE is_active = 1", [])
        .map_err(|e| Error::database(e.to_string()))?;

    let rows_affected = tx
        .execute(
            "UPDATE jellyfin_configs SET is_active = 1, updated_at = :now WHERE id = :id",
            rusqlite::named_params! {
                ":id": id.to_string(),
                ":now": Utc::now().to_rfc3339(),
            },
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if rows_affected == 0 {
        // Dropping the transaction rolls back the deactivation.
        return Err(Error::not_found(format!("jellyfin config {}", id)));
    }

    tx.commit().map_err(|e| Error::database(e.to_string()))
}

/// Delete a configuration (cascades to its synced libraries).
pub fn delete_config(conn: &Connection, id: ConfigId) -> Result<()> {
    let rows_affected = conn
        .execute(
            "DELETE FROM jellyfin_configs WHERE id = :id",
            rusqlite::named_params! { ":id": id.to_string() },
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if rows_affected == 0 {
        return Err(Error::not_found(format!("jellyfin config {}", id)));
    }

    Ok(())
}
