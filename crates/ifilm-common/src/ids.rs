//! Typed ID wrappers.
//!
//! Upstream (Jellyfin) identifiers are opaque hex strings and stay `String`;
//! only identifiers minted by ifilm itself get a newtype.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an upstream server configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigId(Uuid);

impl ConfigId {
    /// Generate a new random config ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConfigId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConfigId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<ConfigId> for Uuid {
    fn from(id: ConfigId) -> Self {
        id.0
    }
}

impl std::str::FromStr for ConfigId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for ConfigId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
