//! HLS stream proxy.
//!
//! # Routes
//!
//! - `GET /media/stream/{item_id}` - master playlist, rewritten
//! - `GET /media/stream/{item_id}/{*file_path}` - variant playlist (rewritten),
//!   segment or other file (piped)
//! - `OPTIONS` on both - CORS preflight

mod proxy;
mod rewrite;
mod token;

pub use proxy::{
    build_target_url, default_content_type, master_playlist, preflight, proxy_base_url,
    redact_token, stream_file, StreamDescriptor, StreamFile, TargetRequest, MANIFEST_CONTENT_TYPE,
    validate_item_id, SEGMENT_TIMING_PARAMS,
};
pub use rewrite::{rewrite_line, rewrite_manifest, RewriteContext, PROXY_STREAM_PREFIX};
pub use token::{SessionTokenStore, StreamToken, TokenSource};

use axum::{routing::get, Router};

use crate::server::AppContext;

/// Create the stream proxy router.
pub fn stream_router() -> Router<AppContext> {
    Router::new()
        .route("/media/stream/:item_id", get(master_playlist).options(preflight))
        .route(
            "/media/stream/:item_id/*file_path",
            get(stream_file).options(preflight),
        )
}
