use std::sync::Arc;

use tracing::warn;

use crate::config::RequestGateSettings;
use crate::error::{SessionError, SessionResult};
use crate::metrics::REQUEST_GATE_REJECTIONS_TOTAL;
use crate::services::cache::CacheStore;
use crate::services::cache_keys::WRITE_BACK_LOCK;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

/// The only outcome worth waiting out.
struct LockHeld;

/// Holds API traffic back while a write-back flush owns the lock.
pub struct RequestGate {
    cache: Arc<dyn CacheStore>,
    settings: RequestGateSettings,
}

impl RequestGate {
    pub fn new(cache: Arc<dyn CacheStore>, settings: RequestGateSettings) -> Self {
        Self { cache, settings }
    }

    /// Returns once the write-back lock is free. Gives up with
    /// `TemporarilyUnavailable` after `retries` waits of `delay` each. A
    /// failing cache is reported at once instead of being waited on.
    pub async fn wait_until_open(&self) -> SessionResult<()> {
        let config = RetryConfig::fixed(self.settings.retries, self.settings.delay());
        let cache = self.cache.clone();

        let checked = retry_async_with_config(config, move || {
            let cache = cache.clone();
            async move {
                match cache.exists(WRITE_BACK_LOCK).await {
                    Ok(true) => Err(LockHeld),
                    Ok(false) => Ok(Ok(())),
                    Err(err) => Ok(Err(err)),
                }
            }
        })
        .await;

        match checked {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(SessionError::cache(err)),
            Err(LockHeld) => {
                REQUEST_GATE_REJECTIONS_TOTAL.inc();
                warn!(
                    retries = self.settings.retries,
                    delay_ms = self.settings.delay_ms,
                    "Write-back lock still held, rejecting request"
                );
                Err(SessionError::TemporarilyUnavailable)
            }
        }
    }
}
