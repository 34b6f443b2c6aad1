use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};
use serde::{Deserialize, Serialize};

use crate::{clock::Clock, store::KeyValueStore};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// A browser-like HTTP client together with the cookies it has collected.
#[derive(Debug)]
pub struct Session {
    reqwest: reqwest::Client,
    cookie_store: Arc<CookieStoreMutex>,
}

impl Session {
    /// A session without any cookies, as a browser opening the portal for the first time.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_cookie_store(CookieStore::default())
    }

    #[allow(deprecated)]
    pub fn restore(cookies_json: &str) -> Result<Self, CachedSessionError> {
        let cookie_store = CookieStore::load_json(cookies_json.as_bytes())
            .map_err(|e| CachedSessionError::Cookies(format!("{e:#}")))?;
        Self::with_cookie_store(cookie_store).map_err(CachedSessionError::Client)
    }

    fn with_cookie_store(cookie_store: CookieStore) -> anyhow::Result<Self> {
        let cookie_store = Arc::new(CookieStoreMutex::new(cookie_store));
        let reqwest = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(&cookie_store))
            .connection_verbose(true)
            .build()?;
        Ok(Self {
            reqwest,
            cookie_store,
        })
    }

    pub fn reqwest(&self) -> &reqwest::Client {
        &self.reqwest
    }

    /// Serializes every cookie, including the ones that only live until the browser closes;
    /// identity providers usually keep their login state in exactly those.
    #[allow(deprecated)]
    pub fn cookies_json(&self) -> anyhow::Result<String> {
        let mut buffer = vec![];
        self.cookie_store
            .lock()
            .map_err(|_| anyhow!("Cookie store was poisoned"))?
            .save_incl_expired_and_nonpersistent_json(&mut buffer)
            .map_err(|e| anyhow!("Failed to serialize cookies: {e:#}"))?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// The stored form of a session.
#[derive(Debug, Serialize, Deserialize)]
struct CachedSession {
    cookies: String,
    expiration: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum CachedSessionError {
    #[error("The cached session is corrupted and could not be loaded: {0}")]
    Json(#[from] serde_json::Error),
    #[error("The cookies in the cached session could not be loaded: {0}")]
    Cookies(String),
    #[error("Failed to build an HTTP client for the cached session: {0:#}")]
    Client(anyhow::Error),
}

/// Holds at most one session, valid for `ttl` after it was stored.
pub struct SessionCache<S, C> {
    store: S,
    clock: C,
    key: String,
    ttl: TimeDelta,
}

impl<S: KeyValueStore, C: Clock> SessionCache<S, C> {
    pub fn new(store: S, clock: C, key: String, ttl: TimeDelta) -> Self {
        Self {
            store,
            clock,
            key,
            ttl,
        }
    }

    /// Returns the cached session unless it is absent or expired.
    pub async fn load(&self) -> anyhow::Result<Option<Session>> {
        let Some(bytes) = self.store.get(&self.key).await? else {
            info!("No session is cached.");
            return Ok(None);
        };
        let cached: CachedSession =
            serde_json::from_slice(&bytes).map_err(CachedSessionError::from)?;
        if self.clock.now() >= cached.expiration {
            info!("The cached session expired at {}.", cached.expiration);
            return Ok(None);
        }
        debug!("Using the session cached until {}.", cached.expiration);
        Ok(Some(Session::restore(&cached.cookies)?))
    }

    /// Replaces the cached session with `session`, expiring `ttl` from now.
    pub async fn store(&self, session: &Session) -> anyhow::Result<()> {
        let cached = CachedSession {
            cookies: session.cookies_json()?,
            expiration: self.clock.now() + self.ttl,
        };
        self.store
            .put(&self.key, serde_json::to_vec(&cached)?)
            .await?;
        debug!("Cached the session until {}.", cached.expiration);
        Ok(())
    }
}
