//! Decoding of the `/Library/VirtualFolders` response.
//!
//! Depending on server version and plugins the list arrives as a bare array,
//! wrapped in `{"Items": [...]}`, or nested under some other key. The known
//! shapes are tried in order, then the first array-valued property wins.

use serde_json::Value;

use super::types::LibraryFolder;

/// Shape the library list was found in.
#[derive(Debug, Clone, PartialEq)]
pub enum LibraryListShape {
    /// `[ ... ]`
    Array(Vec<Value>),
    /// `{ "Items": [ ... ] }`
    Items(Vec<Value>),
    /// `{ "<field>": [ ... ], ... }`: first array-valued property.
    FirstArrayField { field: String, entries: Vec<Value> },
    /// Nothing usable.
    Unrecognized,
}

impl LibraryListShape {
    pub fn into_entries(self) -> Vec<Value> {
        match self {
            Self::Array(entries) | Self::Items(entries) => entries,
            Self::FirstArrayField { entries, .. } => entries,
            Self::Unrecognized => Vec::new(),
        }
    }
}

/// Detect which shape a library-list response has.
pub fn detect_library_list_shape(value: Value) -> LibraryListShape {
    match value {
        Value::Array(entries) => LibraryListShape::Array(entries),
        Value::Object(mut map) => {
            if let Some(Value::Array(entries)) = map.remove("Items") {
                return LibraryListShape::Items(entries);
            }
            // serde_json keeps object keys sorted, so "first" is deterministic.
            map.into_iter()
                .find_map(|(field, v)| match v {
                    Value::Array(entries) => {
                        Some(LibraryListShape::FirstArrayField { field, entries })
                    }
                    _ => None,
                })
                .unwrap_or(LibraryListShape::Unrecognized)
        }
        _ => LibraryListShape::Unrecognized,
    }
}

/// Decode a library-list response into folders, skipping malformed entries.
pub fn decode_library_list(value: Value) -> Vec<LibraryFolder> {
    let shape = detect_library_list_shape(value);
    match &shape {
        LibraryListShape::FirstArrayField { field, .. } => {
            tracing::debug!("Library list found under unexpected field {:?}", field);
        }
        LibraryListShape::Unrecognized => {
            tracing::warn!("Library list response has no array; treating as empty");
        }
        _ => {}
    }

    shape
        .into_entries()
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<LibraryFolder>(entry) {
            Ok(folder) => Some(folder),
            Err(e) => {
                tracing::warn!("Skipping malformed library entry: {}", e);
                None
            }
        })
        .collect()
}
