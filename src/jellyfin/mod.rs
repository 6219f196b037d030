//! Upstream Jellyfin access.
//!
//! [`JellyfinClient`] wraps the metadata API behind the shared response cache;
//! [`decode_library_list`] copes with the varying shapes of the library list.

mod client;
mod decode;
mod query;
mod types;

pub use client::{
    hls_master_url, item_cache_key, stream_url, upstream_url, video_url, CacheTtls, JellyfinClient,
    JellyfinConnection, METADATA_TIMEOUT, STREAM_TIMEOUT, VALIDATION_TIMEOUT,
};
pub(crate) use client::transport_error;
pub use decode::{decode_library_list, detect_library_list_shape, LibraryListShape};
pub use query::ItemQuery;
pub use types::{
    AuthenticationResult, BaseItem, ItemsResult, LibraryFolder, MediaSource, SystemInfo, UserDto,
};
