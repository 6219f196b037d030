//! Core type definitions for libraries and upstream items.
//!
//! Enums are serialized in lowercase, which is also how they are stored in
//! the database.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of an upstream library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    /// Movies library.
    Movies,
    /// TV shows library containing series and episodes.
    TvShows,
    /// Music library.
    Music,
    /// Anything else, including libraries of unknown or multiple kinds.
    Mixed,
}

impl CollectionType {
    /// Recognize a single upstream collection type string.
    ///
    /// Returns `None` for strings that are not one of the three known classes.
    pub fn from_upstream(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "movies" => Some(Self::Movies),
            "tvshows" => Some(Self::TvShows),
            "music" => Some(Self::Music),
            _ => None,
        }
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movies => write!(f, "movies"),
            Self::TvShows => write!(f, "tvshows"),
            Self::Music => write!(f, "music"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

impl std::str::FromStr for CollectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movies" => Ok(Self::Movies),
            "tvshows" => Ok(Self::TvShows),
            "music" => Ok(Self::Music),
            "mixed" => Ok(Self::Mixed),
            _ => Err(format!("Invalid collection type: {}", s)),
        }
    }
}

/// Kind of upstream item the proxy lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A single movie.
    Movie,
    /// A TV series (show).
    Series,
    /// A season within a series.
    Season,
    /// A single episode within a season.
    Episode,
}

impl ItemKind {
    /// Name used by the upstream `Type` field and `IncludeItemTypes` filter.
    pub fn upstream_name(&self) -> &'static str {
        match self {
            Self::Movie => "Movie",
            Self::Series => "Series",
            Self::Season => "Season",
            Self::Episode => "Episode",
        }
    }

    /// Parse the upstream `Type` field.
    pub fn from_upstream(value: &str) -> Option<Self> {
        match value {
            "Movie" => Some(Self::Movie),
            "Series" => Some(Self::Series),
            "Season" => Some(Self::Season),
            "Episode" => Some(Self::Episode),
            _ => None,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie => write!(f, "movie"),
            Self::Series => write!(f, "series"),
            Self::Season => write!(f, "season"),
            Self::Episode => write!(f, "episode"),
        }
    }
}
