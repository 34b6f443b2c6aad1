use std::time::Duration;

use chrono::TimeDelta;
use log::{info, warn};
use typed_builder::TypedBuilder;

use crate::{
    auth::Authenticator,
    clock::Clock,
    rate_limiter::RateLimiter,
    session::{Session, SessionCache},
    store::KeyValueStore,
    transactions::{process, ProcessedResult, TransactionFetcher},
};

pub const AUTHENTICATION_FAILED: &str = "Failed to authenticate";
pub const DOWNLOAD_FAILED: &str = "Failed to download transactions";

/// How one invocation ended, unless it ended with an error.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    Success(ProcessedResult),
    /// No session was cached and logging in failed.
    AuthenticationFailed,
    /// The feed could not be obtained or processed, even after logging in again.
    DownloadFailed,
}

#[derive(Clone, Debug, TypedBuilder)]
pub struct HandlerSettings {
    pub rate_limit_key: String,
    pub rate_limit_interval: Duration,
    pub session_key: String,
    pub session_ttl: TimeDelta,
    pub transaction_limit: usize,
}

/// Answers one request for the latest transactions.
///
/// Runs the rate limiter, reuses or creates a session, fetches and processes the feed, and
/// on failure logs in once more and retries exactly once.
pub struct Handler<S, C, A, F> {
    store: S,
    clock: C,
    authenticator: A,
    fetcher: F,
    settings: HandlerSettings,
}

impl<S, C, A, F> Handler<S, C, A, F>
where
    S: KeyValueStore,
    C: Clock,
    A: Authenticator,
    F: TransactionFetcher,
{
    pub fn new(
        store: S,
        clock: C,
        authenticator: A,
        fetcher: F,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            store,
            clock,
            authenticator,
            fetcher,
            settings,
        }
    }

    fn rate_limiter(&self) -> RateLimiter<&S, &C> {
        RateLimiter::new(
            &self.store,
            &self.clock,
            self.settings.rate_limit_key.clone(),
            self.settings.rate_limit_interval,
        )
    }

    fn session_cache(&self) -> SessionCache<&S, &C> {
        SessionCache::new(
            &self.store,
            &self.clock,
            self.settings.session_key.clone(),
            self.settings.session_ttl,
        )
    }

    pub async fn handle(&self) -> anyhow::Result<Outcome> {
        self.rate_limiter().acquire().await?;

        let session = match self.session_cache().load().await? {
            Some(session) => {
                info!("Reusing the cached session.");
                session
            }
            None => match self.authenticator.login().await? {
                Some(session) => {
                    self.session_cache().store(&session).await?;
                    session
                }
                None => {
                    warn!("Authentication failed.");
                    return Ok(Outcome::AuthenticationFailed);
                }
            },
        };

        if let Some(result) = self.fetch_and_process(&session).await? {
            return Ok(Outcome::Success(result));
        }

        // The session may have been invalidated on the portal side. Even a session created
        // just above is replaced: this is the only recovery attempt.
        info!("Logging in again to retry the download once.");
        let Some(session) = self.authenticator.login().await? else {
            warn!("Authentication failed on retry.");
            return Ok(Outcome::DownloadFailed);
        };
        self.session_cache().store(&session).await?;
        Ok(match self.fetch_and_process(&session).await? {
            Some(result) => Outcome::Success(result),
            None => Outcome::DownloadFailed,
        })
    }

    async fn fetch_and_process(
        &self,
        session: &Session,
    ) -> anyhow::Result<Option<ProcessedResult>> {
        let Some(document) = self.fetcher.fetch(session).await? else {
            return Ok(None);
        };
        let result = process(&document, self.settings.transaction_limit)?;
        if result.is_none() {
            warn!("The downloaded document has no booked transactions list.");
        }
        Ok(result)
    }
}
