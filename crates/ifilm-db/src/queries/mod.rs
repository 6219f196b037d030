//! Database query modules.
//!
//! - configs: upstream server configuration CRUD and activation
//! - libraries: synced library records and the sync upsert

pub mod configs;
pub mod libraries;

use chrono::{DateTime, Utc};
use ifilm_common::Error;

/// Parse an RFC 3339 column value inside a row mapper.
pub(crate) fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Parse any `FromStr` column value inside a row mapper.
pub(crate) fn parse_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            e.to_string().into(),
        )
    })
}

/// Map a rusqlite error, separating unique-constraint violations from other failures.
pub(crate) fn map_write_error(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            Error::conflict(e.to_string())
        }
        _ => Error::database(e.to_string()),
    }
}
