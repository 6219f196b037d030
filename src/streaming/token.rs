//! Session token for the stream proxy.
//!
//! Stream requests authenticate upstream as a dedicated low-privilege account
//! rather than with the admin API key. The session token is kept for a fixed
//! TTL and shared by all stream requests. Each token is tagged with the
//! generation of the client that obtained it, so a login that completes after
//! a server switch is never handed out for the new server.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

use crate::jellyfin::JellyfinClient;

/// Where a stream token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Session obtained by logging in as the proxy account.
    Session,
    /// The server API key, used when no session could be obtained.
    ApiKey,
}

/// Token used to authorize upstream stream fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamToken {
    pub value: String,
    /// User the session belongs to, when known.
    pub user_id: Option<String>,
    pub source: TokenSource,
}

impl StreamToken {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            value: key.into(),
            user_id: None,
            source: TokenSource::ApiKey,
        }
    }
}

struct CachedToken {
    token: StreamToken,
    generation: u64,
    acquired_at: Instant,
}

/// Process-wide store for the proxy session token.
pub struct SessionTokenStore {
    slot: Mutex<Option<CachedToken>>,
    // Serializes logins so concurrent requests share one session.
    login: tokio::sync::Mutex<()>,
    ttl: Duration,
}

impl SessionTokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            login: tokio::sync::Mutex::new(()),
            ttl,
        }
    }

    /// The cached session token for `generation`, if still within its TTL.
    pub fn get(&self, generation: u64) -> Option<StreamToken> {
        let mut slot = self.slot.lock();
        match slot.as_ref() {
            Some(cached) if cached.generation == generation && cached.acquired_at.elapsed() < self.ttl => {
                Some(cached.token.clone())
            }
            Some(_) => {
                *slot = None;
                None
            }
            None => None,
        }
    }

    pub fn store(&self, token: StreamToken, generation: u64) {
        *self.slot.lock() = Some(CachedToken {
            token,
            generation,
            acquired_at: Instant::now(),
        });
    }

    /// Drop the cached token, e.g. after the upstream rejected it.
    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }

    /// Return a usable token, logging in when there is none.
    ///
    /// Without proxy credentials, or when the login fails, the API key is
    /// returned. API key fallbacks are never cached, so the next request
    /// tries to log in again.
    pub async fn acquire(&self, client: &JellyfinClient, credentials: Option<(&str, &str)>) -> StreamToken {
        let generation = client.generation();
        if let Some(token) = self.get(generation) {
            return token;
        }

        let Some((username, password)) = credentials else {
            return StreamToken::api_key(client.api_key());
        };

        let _guard = self.login.lock().await;
        // Another request may have logged in while we waited.
        if let Some(token) = self.get(generation) {
            return token;
        }

        match client.authenticate_by_name(username, password).await {
            Ok(auth) if !auth.access_token.is_empty() => {
                tracing::debug!("Obtained stream session token for {}", username);
                let token = StreamToken {
                    value: auth.access_token,
                    user_id: auth.user.map(|u| u.id).filter(|id| !id.is_empty()),
                    source: TokenSource::Session,
                };
                self.store(token.clone(), generation);
                token
            }
            Ok(_) => {
                tracing::warn!("Login for {} returned no token; using API key", username);
                StreamToken::api_key(client.api_key())
            }
            Err(e) => {
                tracing::warn!("Stream proxy login failed, using API key: {}", e);
                StreamToken::api_key(client.api_key())
            }
        }
    }
}
