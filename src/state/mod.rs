//! Process-wide service state.
//!
//! Holds the response cache, the stream-proxy session token and the slot for
//! the connected upstream client. Everything here lives for the whole process
//! and is reset whenever the upstream connection changes.

use ifilm_common::{Error, Result};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::config::{CacheConfig, ProxyConfig};
use crate::jellyfin::{CacheTtls, JellyfinClient, JellyfinConnection};
use crate::streaming::SessionTokenStore;

pub struct AppState {
    cache: Arc<ResponseCache>,
    tokens: SessionTokenStore,
    client: RwLock<Option<Arc<JellyfinClient>>>,
    ttls: CacheTtls,
}

impl AppState {
    pub fn new(cache: &CacheConfig, proxy: &ProxyConfig) -> Self {
        Self {
            cache: Arc::new(ResponseCache::new()),
            tokens: SessionTokenStore::new(proxy.token_ttl()),
            client: RwLock::new(None),
            ttls: CacheTtls::from(cache),
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn tokens(&self) -> &SessionTokenStore {
        &self.tokens
    }

    /// The connected client, or `Error::NotInitialized`.
    pub fn client(&self) -> Result<Arc<JellyfinClient>> {
        self.client.read().clone().ok_or(Error::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        self.client.read().is_some()
    }

    /// Base URL of the connected server, if any.
    pub fn connected_url(&self) -> Option<String> {
        self.client.read().as_ref().map(|c| c.base_url().to_string())
    }

    /// Connect to `connection`, replacing any existing client.
    ///
    /// Cached responses and the session token belong to the previous server
    /// and are dropped. Requests still running on the old client can no
    /// longer write either of them.
    pub fn initialize(&self, connection: &JellyfinConnection) -> Arc<JellyfinClient> {
        let mut slot = self.client.write();
        self.start_generation();
        let client = Arc::new(JellyfinClient::connect(connection, self.cache.clone(), self.ttls));
        *slot = Some(client.clone());
        tracing::info!("Connected to Jellyfin at {}", connection.server_url);
        client
    }

    /// Connect to `connection` unless a client already exists.
    pub fn get_or_initialize(&self, connection: &JellyfinConnection) -> Arc<JellyfinClient> {
        let mut slot = self.client.write();
        if let Some(ref client) = *slot {
            return client.clone();
        }
        self.start_generation();
        let client = Arc::new(JellyfinClient::connect(connection, self.cache.clone(), self.ttls));
        *slot = Some(client.clone());
        tracing::info!("Connected to Jellyfin at {}", connection.server_url);
        client
    }

    /// Drop the client. The next request initializes lazily again.
    pub fn disconnect(&self) {
        let mut slot = self.client.write();
        self.start_generation();
        *slot = None;
    }

    fn start_generation(&self) {
        let generation = self.cache.advance_generation();
        self.tokens.invalidate();
        tracing::debug!("Started upstream generation {}", generation);
    }

    /// Flush cached responses and the session token.
    pub fn reset(&self) {
        self.cache.flush_all();
        self.tokens.invalidate();
        tracing::debug!("Response cache and stream token reset");
    }
}
