use std::time::Duration;

use anyhow::Context;
use log::debug;

use crate::{
    clock::{epoch_seconds, from_epoch_seconds, Clock},
    store::KeyValueStore,
};

/// Keeps upstream calls at least `interval` apart, using a timestamp kept in the store.
///
/// The check and the update are two separate store operations, so callers in different
/// processes may both pass before either records its call.
pub struct RateLimiter<S, C> {
    store: S,
    clock: C,
    key: String,
    interval: Duration,
}

impl<S: KeyValueStore, C: Clock> RateLimiter<S, C> {
    pub fn new(store: S, clock: C, key: String, interval: Duration) -> Self {
        Self {
            store,
            clock,
            key,
            interval,
        }
    }

    /// Waits until `interval` has passed since the last recorded call, then records now.
    pub async fn acquire(&self) -> anyhow::Result<()> {
        if let Some(last) = self.last_request_time().await? {
            let elapsed = epoch_seconds(self.clock.now()) - last;
            // A timestamp from the future counts as a call made just now.
            let remaining = self.interval.as_secs_f64() - elapsed.max(0.);
            if remaining > 0. {
                debug!("Waiting {remaining:.3}s before calling upstream");
                self.clock.sleep(Duration::from_secs_f64(remaining)).await;
            }
        }
        let now = epoch_seconds(self.clock.now());
        self.store
            .put(&self.key, now.to_string().into_bytes())
            .await?;
        Ok(())
    }

    async fn last_request_time(&self) -> anyhow::Result<Option<f64>> {
        let Some(bytes) = self.store.get(&self.key).await? else {
            return Ok(None);
        };
        let text = String::from_utf8(bytes)
            .with_context(|| format!("{:?} is not valid UTF-8", self.key))?;
        let seconds: f64 = text
            .trim()
            .parse()
            .with_context(|| format!("{:?} does not hold a timestamp: {text:?}", self.key))?;
        from_epoch_seconds(seconds)
            .with_context(|| format!("{:?} holds an out-of-range timestamp: {text:?}", self.key))?;
        Ok(Some(seconds))
    }
}
