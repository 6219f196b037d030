//! Upstream response shapes.
//!
//! Only the fields the proxy reads are modelled. Jellyfin sends `null` for
//! empty collections in some versions, so collection fields go through
//! [`null_as_default`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Treat an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct BaseItem {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "Type", default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub production_year: Option<i32>,
    #[serde(default)]
    pub community_rating: Option<f64>,
    #[serde(default)]
    pub official_rating: Option<String>,
    #[serde(default)]
    pub run_time_ticks: Option<i64>,
    #[serde(default)]
    pub premiere_date: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genres: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image_tags: HashMap<String, String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub backdrop_image_tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub media_sources: Vec<MediaSource>,
    #[serde(default)]
    pub series_id: Option<String>,
    #[serde(default)]
    pub series_name: Option<String>,
    #[serde(default)]
    pub season_id: Option<String>,
    #[serde(default)]
    pub index_number: Option<i32>,
    #[serde(default)]
    pub parent_index_number: Option<i32>,
    #[serde(default)]
    pub child_count: Option<i64>,
    #[serde(default)]
    pub recursive_item_count: Option<i64>,
}

impl BaseItem {
    /// Runtime in whole minutes.
    pub fn runtime_minutes(&self) -> Option<i64> {
        // 10_000 ticks per millisecond
        self.run_time_ticks.map(|ticks| ticks / 600_000_000)
    }

    pub fn has_primary_image(&self) -> bool {
        self.image_tags.contains_key("Primary")
    }

    pub fn has_backdrop(&self) -> bool {
        !self.backdrop_image_tags.is_empty()
    }

    /// First media source ID, if the upstream listed any.
    pub fn primary_media_source_id(&self) -> Option<&str> {
        self.media_sources
            .iter()
            .map(|source| source.id.as_str())
            .find(|id| !id.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct MediaSource {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Paged item list returned by `/Items`, `/Shows/{id}/Seasons` and friends.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ItemsResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<BaseItem>,
    #[serde(default)]
    pub total_record_count: i64,
    #[serde(default)]
    pub start_index: Option<i64>,
}

/// One entry of `/Library/VirtualFolders`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct LibraryFolder {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    /// Usually a string, occasionally an array or absent.
    #[serde(default)]
    pub collection_type: Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub locations: Vec<String>,
    #[serde(default)]
    pub child_count: Option<i64>,
    #[serde(default)]
    pub recursive_item_count: Option<i64>,
    #[serde(default)]
    pub item_count: Option<i64>,
}

impl LibraryFolder {
    /// Upstream library ID (`ItemId`, or `Id` on older servers).
    pub fn library_id(&self) -> Option<&str> {
        self.item_id
            .as_deref()
            .or(self.id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// Item count the upstream embedded in the folder listing, if any.
    pub fn reported_item_count(&self) -> Option<i64> {
        self.recursive_item_count
            .or(self.child_count)
            .or(self.item_count)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct UserDto {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AuthenticationResult {
    pub access_token: String,
    #[serde(default)]
    pub user: Option<UserDto>,
    #[serde(default)]
    pub server_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct SystemInfo {
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub operating_system: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_item_tolerates_nulls() {
        let item: BaseItem = serde_json::from_value(json!({
            "Id": "abc",
            "Name": "Heat",
            "Type": "Movie",
            "Genres": null,
            "ImageTags": null,
            "MediaSources": null,
            "RunTimeTicks": 102_000_000_000i64
        }))
        .unwrap();

        assert!(item.genres.is_empty());
        assert!(!item.has_primary_image());
        assert_eq!(item.primary_media_source_id(), None);
        assert_eq!(item.runtime_minutes(), Some(170));
    }

    #[test]
    fn test_primary_media_source_skips_empty_ids() {
        let item: BaseItem = serde_json::from_value(json!({
            "Id": "abc",
            "MediaSources": [{"Id": ""}, {"Id": "ms-2"}]
        }))
        .unwrap();
        assert_eq!(item.primary_media_source_id(), Some("ms-2"));
    }

    #[test]
    fn test_library_folder_ids_and_counts() {
        let folder: LibraryFolder = serde_json::from_value(json!({
            "Name": "Shows",
            "Id": "legacy-id",
            "CollectionType": "tvshows",
            "ChildCount": 7
        }))
        .unwrap();
        assert_eq!(folder.library_id(), Some("legacy-id"));
        assert_eq!(folder.reported_item_count(), Some(7));

        let folder: LibraryFolder = serde_json::from_value(json!({
            "Name": "Movies",
            "ItemId": "new-id",
            "Id": "legacy-id"
        }))
        .unwrap();
        assert_eq!(folder.library_id(), Some("new-id"));
        assert!(folder.collection_type.is_null());
    }
}
