//! iFilm-Common: shared types used by the proxy server and the database crate.
//!
//! - **Error Handling**: one error taxonomy for upstream, cache, proxy and storage failures
//! - **Typed IDs**: UUID wrapper for upstream server configurations
//! - **Core Types**: library collection classes and upstream item kinds
//!
//! # Examples
//!
//! ```
//! use ifilm_common::{CollectionType, ConfigId, Error, Result};
//!
//! let config_id = ConfigId::new();
//! assert_eq!(CollectionType::TvShows.to_string(), "tvshows");
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("item"))
//! }
//! assert_eq!(example().unwrap_err().http_status(), 404);
//! # let _ = config_id;
//! ```

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
