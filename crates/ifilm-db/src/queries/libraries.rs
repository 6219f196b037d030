//! Synced library queries.
//!
//! Rows are keyed by `(config_id, library_id)`. A sync pass goes through
//! [`upsert_library`], which never duplicates a row and never touches the
//! admin-controlled `is_visible` flag of an existing row.

use chrono::{DateTime, Utc};
use ifilm_common::{ConfigId, Error, Result};
use rusqlite::{Connection, OptionalExtension, Row};

use super::{map_write_error, parse_column, parse_timestamp};
use crate::models::{LibraryRecord, LibraryUpsert};

const SELECT_COLUMNS: &str = "SELECT config_id, library_id, library_name, collection_type,
        is_visible, item_count, last_sync, created_at
     FROM jellyfin_libraries";

fn row_to_library(row: &Row<'_>) -> rusqlite::Result<LibraryRecord> {
    Ok(LibraryRecord {
        config_id: parse_column(0, &row.get::<_, String>(0)?)?,
        library_id: row.get(1)?,
        library_name: row.get(2)?,
        collection_type: parse_column(3, &row.get::<_, String>(3)?)?,
        is_visible: row.get(4)?,
        item_count: row.get(5)?,
        last_sync: parse_timestamp(6, &row.get::<_, String>(6)?)?,
        created_at: parse_timestamp(7, &row.get::<_, String>(7)?)?,
    })
}

/// Insert a new library row.
///
/// Returns `Error::Conflict` when the `(config_id, library_id)` pair already exists.
pub fn insert_library(
    conn: &Connection,
    config_id: ConfigId,
    library: &LibraryUpsert,
    synced_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO jellyfin_libraries
            (config_id, library_id, library_name, collection_type, is_visible, item_count, last_sync, created_at)
         VALUES (:config_id, :library_id, :library_name, :collection_type, 1, :item_count, :now, :now)",
        rusqlite::named_params! {
            ":config_id": config_id.to_string(),
            ":library_id": library.library_id,
            ":library_name": library.library_name,
            ":collection_type": library.collection_type.to_string(),
            ":item_count": library.item_count,
            ":now": synced_at.to_rfc3339(),
        },
    )
    .map_err(map_write_error)?;

    Ok(())
}

/// Update the synced fields of an existing row. Returns whether a row matched.
pub fn update_library(
    conn: &Connection,
    config_id: ConfigId,
    library: &LibraryUpsert,
    synced_at: DateTime<Utc>,
) -> Result<bool> {
    let rows_affected = conn
        .execute(
            "UPDATE jellyfin_libraries
             SET library_name = :library_name,
                 collection_type = :collection_type,
                 item_count = :item_count,
                 last_sync = :now
             WHERE config_id = :config_id AND library_id = :library_id",
            rusqlite::named_params! {
                ":config_id": config_id.to_string(),
                ":library_id": library.library_id,
                ":library_name": library.library_name,
                ":collection_type": library.collection_type.to_string(),
                ":item_count": library.item_count,
                ":now": synced_at.to_rfc3339(),
            },
        )
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(rows_affected > 0)
}

/// Insert or update one library for a sync pass.
///
/// A concurrent sync may insert the same row between our update and insert;
/// that duplicate is recovered by retrying as an update. Any other storage
/// failure is returned to the caller.
pub fn upsert_library(
    conn: &Connection,
    config_id: ConfigId,
    library: &LibraryUpsert,
) -> Result<LibraryRecord> {
    let now = Utc::now();

    if !update_library(conn, config_id, library, now)? {
        match insert_library(conn, config_id, library, now) {
            Ok(()) => {}
            Err(Error::Conflict(_)) => {
                if !update_library(conn, config_id, library, now)? {
                    return Err(Error::database(format!(
                        "library {} vanished during upsert",
                        library.library_id
                    )));
                }
            }
            Err(e) => return Err(e),
        }
    }

    get_library(conn, config_id, &library.library_id)?.ok_or_else(|| {
        Error::database(format!(
            "library {} missing after upsert",
            library.library_id
        ))
    })
}

/// Get one library row.
pub fn get_library(
    conn: &Connection,
    config_id: ConfigId,
    library_id: &str,
) -> Result<Option<LibraryRecord>> {
    conn.query_row(
        &format!(
            "{} WHERE config_id = :config_id AND library_id = :library_id",
            SELECT_COLUMNS
        ),
        rusqlite::named_params! {
            ":config_id": config_id.to_string(),
            ":library_id": library_id,
        },
        row_to_library,
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// List all libraries synced for a configuration, ordered by name.
pub fn list_libraries(conn: &Connection, config_id: ConfigId) -> Result<Vec<LibraryRecord>> {
    query_libraries(
        conn,
        &format!(
            "{} WHERE config_id = :config_id ORDER BY library_name",
            SELECT_COLUMNS
        ),
        config_id,
    )
}

/// List only the libraries an admin left visible.
pub fn list_visible_libraries(
    conn: &Connection,
    config_id: ConfigId,
) -> Result<Vec<LibraryRecord>> {
    query_libraries(
        conn,
        &format!(
            "{} WHERE config_id = :config_id AND is_visible = 1 ORDER BY library_name",
            SELECT_COLUMNS
        ),
        config_id,
    )
}

fn query_libraries(conn: &Connection, sql: &str, config_id: ConfigId) -> Result<Vec<LibraryRecord>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| Error::database(e.to_string()))?;

    let libraries = stmt
        .query_map(
            rusqlite::named_params! { ":config_id": config_id.to_string() },
            row_to_library,
        )
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(libraries)
}

/// Show or hide a library.
pub fn set_visibility(
    conn: &Connection,
    config_id: ConfigId,
    library_id: &str,
    visible: bool,
) -> Result<()> {
    let rows_affected = conn
        .execute(
            "UPDATE jellyfin_libraries SET is_visible = :visible
             WHERE config_id = :config_id AND library_id = :library_id",
            rusqlite::named_params! {
                ":config_id": config_id.to_string(),
                ":library_id": library_id,
                ":visible": visible,
            },
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if rows_affected == 0 {
        return Err(Error::not_found(format!("library {}", library_id)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::configs::create_config;
    use ifilm_common::CollectionType;

    fn movies(count: i64) -> LibraryUpsert {
        LibraryUpsert {
            library_id: "f137a2dd21bbc1b99aa5c0f6bf02a805".to_string(),
            library_name: "Movies".to_string(),
            collection_type: CollectionType::Movies,
            item_count: count,
        }
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let config = create_config(&conn, "home", "http://jf", "k").unwrap();

        let first = upsert_library(&conn, config.id, &movies(10)).unwrap();
        let second = upsert_library(&conn, config.id, &movies(12)).unwrap();

        let all = list_libraries(&conn, config.id).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].item_count, 12);
        assert!(second.last_sync >= first.last_sync);
        assert_eq!(second.created_at, first.created_at);
    }

    #[test]
    fn test_upsert_preserves_visibility() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let config = create_config(&conn, "home", "http://jf", "k").unwrap();

        upsert_library(&conn, config.id, &movies(1)).unwrap();
        set_visibility(&conn, config.id, &movies(1).library_id, false).unwrap();

        let record = upsert_library(&conn, config.id, &movies(2)).unwrap();
        assert!(!record.is_visible);
        assert!(list_visible_libraries(&conn, config.id).unwrap().is_empty());
    }

    #[test]
    fn test_insert_duplicate_is_conflict() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let config = create_config(&conn, "home", "http://jf", "k").unwrap();

        insert_library(&conn, config.id, &movies(1), Utc::now()).unwrap();
        let err = insert_library(&conn, config.id, &movies(1), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_same_library_under_two_configs() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let a = create_config(&conn, "a", "http://a", "k").unwrap();
        let b = create_config(&conn, "b", "http://b", "k").unwrap();

        upsert_library(&conn, a.id, &movies(1)).unwrap();
        upsert_library(&conn, b.id, &movies(1)).unwrap();

        assert_eq!(list_libraries(&conn, a.id).unwrap().len(), 1);
        assert_eq!(list_libraries(&conn, b.id).unwrap().len(), 1);
    }

    #[test]
    fn test_insert_for_unknown_config_is_database_error() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        let err = upsert_library(&conn, ConfigId::new(), &movies(1)).unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[test]
    fn test_set_visibility_unknown_library() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let config = create_config(&conn, "home", "http://jf", "k").unwrap();

        let err = set_visibility(&conn, config.id, "missing", true).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_delete_config_cascades() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let config = create_config(&conn, "home", "http://jf", "k").unwrap();
        upsert_library(&conn, config.id, &movies(1)).unwrap();

        crate::queries::configs::delete_config(&conn, config.id).unwrap();
        assert!(list_libraries(&conn, config.id).unwrap().is_empty());
    }
}
