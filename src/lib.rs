//! iFilm - Jellyfin proxy with HLS manifest rewriting
//!
//! This library crate exposes the core functionality for integration testing.

pub mod cache;
pub mod config;
pub mod jellyfin;
pub mod server;
pub mod state;
pub mod streaming;
pub mod sync;
