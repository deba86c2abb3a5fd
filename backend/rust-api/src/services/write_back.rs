use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::WriteBackSettings;
use crate::error::{SessionError, SessionResult};
use crate::metrics::{
    WRITE_BACK_CYCLES_TOTAL, WRITE_BACK_CYCLE_DURATION_SECONDS, WRITE_BACK_SESSIONS_TOTAL,
};
use crate::models::Session;
use crate::services::cache::CacheStore;
use crate::services::cache_keys::{
    self, MARKER, PENDING_INSERT_PREFIX, PENDING_UPDATE_PREFIX, RECENT_SESSIONS_PREFIX,
    WRITE_BACK_LOCK,
};
use crate::services::repository::SessionRepository;
use crate::utils::keyed_lock::KeyedLocks;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Insert,
    Update,
}

impl Phase {
    fn prefix(self) -> &'static str {
        match self {
            Phase::Insert => PENDING_INSERT_PREFIX,
            Phase::Update => PENDING_UPDATE_PREFIX,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Phase::Insert => "insert",
            Phase::Update => "update",
        }
    }
}

/// A marked session and the exact cache value it was read from.
struct Pending {
    session: Session,
    raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Another flush held the lock; nothing was done.
    pub skipped: bool,
    pub inserted: usize,
    pub updated: usize,
    pub stale_markers: usize,
    pub pruned_recent_lists: usize,
}

/// Moves cache-resident sessions into the database under the global
/// write-back lock.
pub struct WriteBackCoordinator {
    cache: Arc<dyn CacheStore>,
    repository: Arc<dyn SessionRepository>,
    locks: Arc<KeyedLocks>,
    settings: WriteBackSettings,
    marker_ttl: Duration,
}

impl WriteBackCoordinator {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        repository: Arc<dyn SessionRepository>,
        locks: Arc<KeyedLocks>,
        settings: WriteBackSettings,
        marker_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            repository,
            locks,
            settings,
            marker_ttl,
        }
    }

    pub async fn run(&self) {
        let interval = self.settings.interval();
        info!(
            "Starting write-back loop (interval {}s)",
            interval.as_secs()
        );

        loop {
            // Failures are logged and counted inside; the next tick retries.
            let _ = self.flush_cycle().await;
            sleep(interval).await;
        }
    }

    pub async fn flush_cycle(&self) -> SessionResult<FlushReport> {
        let acquired = self
            .cache
            .set_if_absent(WRITE_BACK_LOCK, MARKER, self.settings.lock_ttl())
            .await
            .map_err(SessionError::cache)?;
        if !acquired {
            WRITE_BACK_CYCLES_TOTAL.with_label_values(&["skipped"]).inc();
            info!("Write-back lock already held, skipping cycle");
            return Ok(FlushReport {
                skipped: true,
                ..Default::default()
            });
        }

        let started = Instant::now();
        let result = self.flush_locked().await;
        self.release_lock().await;
        WRITE_BACK_CYCLE_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(report) => {
                WRITE_BACK_CYCLES_TOTAL.with_label_values(&["success"]).inc();
                info!(
                    inserted = report.inserted,
                    updated = report.updated,
                    stale_markers = report.stale_markers,
                    pruned_recent_lists = report.pruned_recent_lists,
                    "Write-back cycle completed"
                );
            }
            Err(err) => {
                WRITE_BACK_CYCLES_TOTAL.with_label_values(&["error"]).inc();
                error!(error = %err, "Write-back cycle aborted; markers kept for the next cycle");
            }
        }

        result
    }

    async fn flush_locked(&self) -> SessionResult<FlushReport> {
        let mut report = FlushReport::default();

        let (inserts, stale) = self.collect_pending(Phase::Insert).await?;
        report.stale_markers += stale;
        report.inserted = self.persist(Phase::Insert, &inserts).await?;

        // Sessions modified during the insert phase were re-marked and show up here.
        let (updates, stale) = self.collect_pending(Phase::Update).await?;
        report.stale_markers += stale;
        report.updated = self.persist(Phase::Update, &updates).await?;

        report.pruned_recent_lists = self.prune_recent_lists().await?;

        Ok(report)
    }

    /// Cached sessions behind every marker of `phase`. Markers whose session
    /// expired from the cache are deleted and counted.
    async fn collect_pending(&self, phase: Phase) -> SessionResult<(Vec<Pending>, usize)> {
        let keys = self
            .cache
            .keys_with_prefix(phase.prefix())
            .await
            .map_err(SessionError::cache)?;

        let mut pending = Vec::with_capacity(keys.len());
        let mut stale = 0;
        for key in keys {
            let Some(session_id) = cache_keys::session_id_from(&key, phase.prefix()) else {
                continue;
            };

            let raw = self
                .cache
                .get(&cache_keys::session(session_id))
                .await
                .map_err(SessionError::cache)?;
            match raw {
                Some(raw) => pending.push(Pending {
                    session: serde_json::from_str(&raw)?,
                    raw,
                }),
                None => {
                    warn!(session_id, phase = phase.as_str(), "Dropping stale pending marker");
                    self.cache.delete(&key).await.map_err(SessionError::cache)?;
                    stale += 1;
                }
            }
        }

        Ok((pending, stale))
    }

    /// Writes one phase's batch and clears it. All-or-nothing: an
    /// unacknowledged document aborts before any marker is touched.
    async fn persist(&self, phase: Phase, pending: &[Pending]) -> SessionResult<usize> {
        if pending.is_empty() {
            return Ok(0);
        }
        let sessions: Vec<Session> = pending.iter().map(|p| p.session.clone()).collect();

        match phase {
            Phase::Insert => {
                let ids: Vec<String> = sessions.iter().map(|s| s.id.clone()).collect();
                let existing = self
                    .repository
                    .existing_session_ids(&ids)
                    .await
                    .map_err(SessionError::persistence)?;

                let (stored, fresh): (Vec<Session>, Vec<Session>) = sessions
                    .iter()
                    .cloned()
                    .partition(|s| existing.contains(&s.id));

                let inserted = self
                    .repository
                    .insert_sessions(&fresh)
                    .await
                    .map_err(SessionError::persistence)?;
                check_acknowledged(phase, inserted, fresh.len())?;

                if !stored.is_empty() {
                    warn!(
                        count = stored.len(),
                        "Pending inserts already stored, replacing them instead"
                    );
                    let replaced = self
                        .repository
                        .upsert_sessions(&stored)
                        .await
                        .map_err(SessionError::persistence)?;
                    check_acknowledged(phase, replaced, stored.len())?;
                }
            }
            Phase::Update => {
                let upserted = self
                    .repository
                    .upsert_sessions(&sessions)
                    .await
                    .map_err(SessionError::persistence)?;
                check_acknowledged(phase, upserted, sessions.len())?;
            }
        }

        for flushed in pending {
            self.clear_flushed(phase, flushed).await?;
        }

        WRITE_BACK_SESSIONS_TOTAL
            .with_label_values(&[phase.as_str()])
            .inc_by(sessions.len() as u64);

        Ok(sessions.len())
    }

    /// Drops a persisted session from the cache unless it changed after it
    /// was read, in which case it stays cached and pending-update.
    ///
    /// API processes do not share `locks` with a standalone worker, so the
    /// entry is only removed by a compare-and-delete in the cache itself, and
    /// the marker is cleared before it: a write landing in between either
    /// sees no pending-insert and marks itself, or fails the compare.
    async fn clear_flushed(&self, phase: Phase, flushed: &Pending) -> SessionResult<()> {
        let session_id = flushed.session.id.as_str();
        let _guard = self.locks.lock(session_id).await;

        let marker_key = match phase {
            Phase::Insert => cache_keys::pending_insert(session_id),
            Phase::Update => cache_keys::pending_update(session_id),
        };
        self.cache
            .delete(&marker_key)
            .await
            .map_err(SessionError::cache)?;

        let session_key = cache_keys::session(session_id);
        let removed = self
            .cache
            .delete_if_equals(&session_key, &flushed.raw)
            .await
            .map_err(SessionError::cache)?;
        if removed {
            return Ok(());
        }

        // Evicted meanwhile: the evicting request persisted it.
        if !self
            .cache
            .exists(&session_key)
            .await
            .map_err(SessionError::cache)?
        {
            return Ok(());
        }

        self.cache
            .set(
                &cache_keys::pending_update(session_id),
                MARKER,
                self.marker_ttl,
            )
            .await
            .map_err(SessionError::cache)?;
        info!(session_id, "Session changed during flush, kept pending-update");
        Ok(())
    }

    /// Deletes recent-session lists none of whose sessions is still pending.
    async fn prune_recent_lists(&self) -> SessionResult<usize> {
        let keys = self
            .cache
            .keys_with_prefix(RECENT_SESSIONS_PREFIX)
            .await
            .map_err(SessionError::cache)?;

        let mut pruned = 0;
        for key in keys {
            let Some(raw) = self.cache.get(&key).await.map_err(SessionError::cache)? else {
                continue;
            };
            let ids: Vec<String> = match serde_json::from_str(&raw) {
                Ok(ids) => ids,
                Err(err) => {
                    warn!(key = %key, error = %err, "Dropping unreadable recent-sessions list");
                    Vec::new()
                }
            };

            if !self.any_pending(&ids).await? {
                self.cache.delete(&key).await.map_err(SessionError::cache)?;
                pruned += 1;
            }
        }

        Ok(pruned)
    }

    async fn any_pending(&self, ids: &[String]) -> SessionResult<bool> {
        for id in ids {
            for key in [cache_keys::pending_insert(id), cache_keys::pending_update(id)] {
                if self.cache.exists(&key).await.map_err(SessionError::cache)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    async fn release_lock(&self) {
        let cache = self.cache.clone();
        let released = retry_async_with_config(RetryConfig::default(), move || {
            let cache = cache.clone();
            async move { cache.delete(WRITE_BACK_LOCK).await }
        })
        .await;

        if let Err(err) = released {
            // The TTL frees it eventually; until then every gated request waits.
            error!(error = %err, "Failed to release write-back lock");
        }
    }
}

fn check_acknowledged(phase: Phase, acknowledged: usize, expected: usize) -> SessionResult<()> {
    if acknowledged == expected {
        return Ok(());
    }
    Err(SessionError::Persistence(format!(
        "{} acknowledged {} of {} sessions",
        phase.as_str(),
        acknowledged,
        expected
    )))
}
