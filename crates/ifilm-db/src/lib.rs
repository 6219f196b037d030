//! iFilm-DB: database schema, migrations, and query operations
//!
//! SQLite via rusqlite with r2d2 connection pooling. Stores the upstream
//! server configurations and the libraries synced from them.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `models` - Rust models matching database schema
//! - `queries` - Database query operations
//!
//! # Example
//!
//! ```no_run
//! use ifilm_db::pool::{init_pool, get_conn};
//! use ifilm_db::queries::configs;
//!
//! let pool = init_pool("/var/lib/ifilm/ifilm.db").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let config = configs::create_config(&conn, "home", "http://jellyfin:8096", "key").unwrap();
//! println!("Created config: {}", config.id);
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
