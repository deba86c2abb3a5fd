use std::sync::Arc;

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use tracing::{debug, error, info, warn};

use crate::config::SessionSettings;
use crate::error::{SessionError, SessionResult};
use crate::metrics::{
    record_cache_hit, record_cache_miss, SESSIONS_TOTAL, SESSION_ANSWER_UPDATES_TOTAL,
    SESSION_EVENTS_TOTAL,
};
use crate::models::{
    EventType, Quiz, Session, SessionAnswer, SessionEvent, UpdateSessionAnswer,
};
use crate::services::cache::CacheStore;
use crate::services::cache_keys::{self, MARKER};
use crate::services::question_order::build_question_order;
use crate::services::repository::SessionRepository;
use crate::services::timeline::{derive_time_remaining, record_event};
use crate::utils::keyed_lock::KeyedLocks;
use crate::utils::time::round_to_hundredths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// First session for the pair.
    Created,
    /// The latest session was never started and is handed back again.
    Reused,
    /// A new session continuing the latest one.
    CarriedForward,
}

impl CreateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreateOutcome::Created => "created",
            CreateOutcome::Reused => "reused",
            CreateOutcome::CarriedForward => "carried_forward",
        }
    }
}

/// Cache-first session store.
///
/// Every write lands in the shared cache together with a pending marker; the
/// write-back coordinator moves marked sessions into the database later. The
/// only synchronous database write is the eviction of a session pushed out of
/// its pair's recent list.
pub struct SessionStore {
    cache: Arc<dyn CacheStore>,
    local_cache: Arc<dyn CacheStore>,
    repository: Arc<dyn SessionRepository>,
    locks: Arc<KeyedLocks>,
    settings: SessionSettings,
}

impl SessionStore {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        local_cache: Arc<dyn CacheStore>,
        repository: Arc<dyn SessionRepository>,
        locks: Arc<KeyedLocks>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            cache,
            local_cache,
            repository,
            locks,
            settings,
        }
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        quiz_id: &str,
        omr_mode: Option<bool>,
    ) -> SessionResult<Session> {
        let _pair_guard = self
            .locks
            .lock(&format!("create:{}:{}", user_id, quiz_id))
            .await;

        let quiz = self.load_quiz(quiz_id).await?;
        let recent = self.recent_sessions(user_id, quiz_id).await?;
        let now = Utc::now();

        let (session, outcome) = match recent.first() {
            None => (self.first_session(&quiz, user_id, omr_mode, now), CreateOutcome::Created),
            Some(latest) if !has_meaningful_event(latest, recent.get(1)) => {
                let session = self.reuse_session(&latest.id, omr_mode, now).await?;
                (session, CreateOutcome::Reused)
            }
            Some(latest) => (carry_forward(latest, omr_mode, now), CreateOutcome::CarriedForward),
        };

        // Evict first: a failed eviction must leave no trace of the new session.
        let previous = recent.iter().map(|s| s.id.clone()).collect();
        let ids = self.evict_overflow(&session.id, previous).await?;

        if outcome != CreateOutcome::Reused {
            self.write_session(&session).await?;
            self.cache
                .set(
                    &cache_keys::pending_insert(&session.id),
                    MARKER,
                    self.settings.cache_ttl(),
                )
                .await
                .map_err(SessionError::cache)?;
        }

        self.cache
            .set(
                &cache_keys::recent_sessions(user_id, quiz_id),
                &serde_json::to_string(&ids)?,
                self.settings.cache_ttl(),
            )
            .await
            .map_err(SessionError::cache)?;

        SESSIONS_TOTAL.with_label_values(&[outcome.as_str()]).inc();
        info!(
            session_id = %session.id,
            user_id,
            quiz_id,
            outcome = outcome.as_str(),
            "Session ready"
        );

        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> SessionResult<Session> {
        self.resolve(session_id).await
    }

    /// Applies a lifecycle event and returns the new `time_remaining`
    /// (`None` for untimed quizzes).
    pub async fn apply_event(
        &self,
        session_id: &str,
        event_type: EventType,
        metrics: Option<serde_json::Value>,
    ) -> SessionResult<Option<u64>> {
        let _guard = self.locks.lock(session_id).await;
        let mut session = self.resolve(session_id).await?;
        let now = Utc::now();

        let was_ended = session.has_quiz_ended;
        let added = record_event(&mut session.events, SessionEvent::new(event_type, now));

        if !was_ended && session.has_started() {
            let total = session.total_time_spent.unwrap_or(0.0) + added;
            session.total_time_spent = Some(round_to_hundredths(total));
        }

        match event_type {
            EventType::Start => {
                session.start_quiz_time.get_or_insert(now);
            }
            EventType::End => {
                session.end_quiz_time.get_or_insert(now);
                session.has_quiz_ended = true;
                if metrics.is_some() {
                    session.metrics = metrics;
                }
            }
            EventType::Resume | EventType::Heartbeat => {}
        }

        if let (Some(limit), Some(spent)) = (session.time_limit_max, session.total_time_spent) {
            session.time_remaining = Some(derive_time_remaining(limit, spent));
        }
        session.updated_at = now;

        self.write_session(&session).await?;
        self.mark_dirty(session_id).await?;

        SESSION_EVENTS_TOTAL
            .with_label_values(&[event_type.as_str()])
            .inc();
        debug!(
            session_id,
            event = event_type.as_str(),
            total_time_spent = ?session.total_time_spent,
            "Event applied"
        );

        Ok(session.time_remaining)
    }

    pub async fn get_session_answer(
        &self,
        session_id: &str,
        position: usize,
    ) -> SessionResult<SessionAnswer> {
        let session = self.resolve(session_id).await?;
        session
            .session_answers
            .get(position)
            .cloned()
            .ok_or_else(|| answer_not_found(session_id, position))
    }

    pub async fn update_session_answer(
        &self,
        session_id: &str,
        position: usize,
        patch: UpdateSessionAnswer,
    ) -> SessionResult<SessionAnswer> {
        let mut updated = self
            .update_session_answers(session_id, vec![(position, patch)])
            .await?;
        updated
            .pop()
            .ok_or_else(|| answer_not_found(session_id, position))
    }

    /// Applies several answer patches in one write. Nothing is applied unless
    /// every position exists and every patch carries at least one field.
    pub async fn update_session_answers(
        &self,
        session_id: &str,
        patches: Vec<(usize, UpdateSessionAnswer)>,
    ) -> SessionResult<Vec<SessionAnswer>> {
        if patches.is_empty() {
            return Err(SessionError::BadRequest(
                "no session answers to update".to_string(),
            ));
        }
        if let Some((position, _)) = patches.iter().find(|(_, patch)| patch.is_empty()) {
            return Err(SessionError::BadRequest(format!(
                "no fields to update for session answer at position {}",
                position
            )));
        }

        let _guard = self.locks.lock(session_id).await;
        let mut session = self.resolve(session_id).await?;

        if let Some((position, _)) = patches
            .iter()
            .find(|(position, _)| *position >= session.session_answers.len())
        {
            return Err(answer_not_found(session_id, *position));
        }

        let mut updated = Vec::with_capacity(patches.len());
        for (position, patch) in &patches {
            let answer = &mut session.session_answers[*position];
            answer.apply(patch);
            updated.push(answer.clone());
        }
        session.updated_at = Utc::now();

        self.write_session(&session).await?;
        self.mark_dirty(session_id).await?;

        let mode = if patches.len() == 1 { "single" } else { "multiple" };
        SESSION_ANSWER_UPDATES_TOTAL.with_label_values(&[mode]).inc();

        Ok(updated)
    }

    async fn load_quiz(&self, quiz_id: &str) -> SessionResult<Quiz> {
        let key = cache_keys::quiz(quiz_id);
        if let Some(raw) = self
            .local_cache
            .get(&key)
            .await
            .map_err(SessionError::cache)?
        {
            return Ok(serde_json::from_str(&raw)?);
        }

        let quiz = self
            .repository
            .find_quiz(quiz_id)
            .await
            .map_err(SessionError::persistence)?
            .ok_or_else(|| SessionError::quiz_not_found(quiz_id))?;

        self.local_cache
            .set(&key, &serde_json::to_string(&quiz)?, self.settings.cache_ttl())
            .await
            .map_err(SessionError::cache)?;

        Ok(quiz)
    }

    /// Newest-first sessions for the pair, at most `recent_sessions_capacity`.
    async fn recent_sessions(&self, user_id: &str, quiz_id: &str) -> SessionResult<Vec<Session>> {
        let key = cache_keys::recent_sessions(user_id, quiz_id);

        if let Some(raw) = self.cache.get(&key).await.map_err(SessionError::cache)? {
            let ids: Vec<String> = serde_json::from_str(&raw)?;
            let mut sessions = Vec::with_capacity(ids.len());
            for id in ids {
                match self.resolve(&id).await {
                    Ok(session) => sessions.push(session),
                    Err(SessionError::NotFound(_)) => {
                        warn!(session_id = %id, "Recent list points at a missing session")
                    }
                    Err(e) => return Err(e),
                }
            }
            return Ok(sessions);
        }

        let stored = self
            .repository
            .find_recent_sessions(user_id, quiz_id, self.settings.recent_sessions_capacity)
            .await
            .map_err(SessionError::persistence)?;

        let mut sessions = Vec::with_capacity(stored.len());
        for session in stored {
            // A cached copy may carry writes the database has not seen yet.
            match self.read_cached(&session.id).await? {
                Some(cached) => sessions.push(cached),
                None => {
                    self.write_session(&session).await?;
                    sessions.push(session);
                }
            }
        }

        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        self.cache
            .set(&key, &serde_json::to_string(&ids)?, self.settings.cache_ttl())
            .await
            .map_err(SessionError::cache)?;

        Ok(sessions)
    }

    fn first_session(
        &self,
        quiz: &Quiz,
        user_id: &str,
        omr_mode: Option<bool>,
        now: DateTime<Utc>,
    ) -> Session {
        let omr_mode = omr_mode.unwrap_or(false);
        let question_order = build_question_order(
            &quiz.question_set_sizes(),
            self.settings.subset_size,
            omr_mode,
            &mut rand::rng(),
        );
        let session_answers = quiz
            .question_ids()
            .map(|question_id| SessionAnswer::unanswered(new_id(), question_id.to_string()))
            .collect();
        let time_limit_max = quiz.time_limit_max();

        Session {
            id: new_id(),
            user_id: user_id.to_string(),
            quiz_id: quiz.id.clone(),
            is_first: true,
            has_quiz_ended: false,
            omr_mode,
            question_order,
            events: Vec::new(),
            time_limit_max,
            total_time_spent: None,
            time_remaining: time_limit_max,
            start_quiz_time: None,
            end_quiz_time: None,
            created_at: now,
            updated_at: now,
            session_answers,
            metrics: None,
        }
    }

    /// Hands back an unstarted session. Only `omr_mode` may change.
    async fn reuse_session(
        &self,
        session_id: &str,
        omr_mode: Option<bool>,
        now: DateTime<Utc>,
    ) -> SessionResult<Session> {
        let _guard = self.locks.lock(session_id).await;
        let mut session = self.resolve(session_id).await?;

        if let Some(omr_mode) = omr_mode.filter(|mode| *mode != session.omr_mode) {
            session.omr_mode = omr_mode;
            session.updated_at = now;
            self.write_session(&session).await?;
            self.mark_dirty(session_id).await?;
        }

        Ok(session)
    }

    /// The pair's recent list with `session_id` in front, after evicting
    /// every session that no longer fits.
    async fn evict_overflow(
        &self,
        session_id: &str,
        previous: Vec<String>,
    ) -> SessionResult<Vec<String>> {
        let capacity = self.settings.recent_sessions_capacity.max(1);

        let mut ids = Vec::with_capacity(previous.len() + 1);
        ids.push(session_id.to_string());
        ids.extend(previous.into_iter().filter(|id| id != session_id));

        while ids.len() > capacity {
            if let Some(oldest) = ids.last() {
                self.evict(oldest).await?;
            }
            ids.pop();
        }

        Ok(ids)
    }

    /// Persists a session leaving the recent list, then drops it from the cache.
    async fn evict(&self, session_id: &str) -> SessionResult<()> {
        let _guard = self.locks.lock(session_id).await;

        if let Some(session) = self.read_cached(session_id).await? {
            let acknowledged = self
                .repository
                .upsert_sessions(std::slice::from_ref(&session))
                .await
                .map_err(SessionError::persistence)?;
            if acknowledged != 1 {
                error!(session_id, acknowledged, "Eviction upsert not acknowledged");
                return Err(SessionError::Persistence(format!(
                    "eviction of session {} was not acknowledged",
                    session_id
                )));
            }
        }

        for key in [
            cache_keys::session(session_id),
            cache_keys::pending_insert(session_id),
            cache_keys::pending_update(session_id),
        ] {
            self.cache.delete(&key).await.map_err(SessionError::cache)?;
        }

        info!(session_id, "Evicted session from recent list");
        Ok(())
    }

    async fn resolve(&self, session_id: &str) -> SessionResult<Session> {
        if let Some(session) = self.read_cached(session_id).await? {
            record_cache_hit();
            return Ok(session);
        }
        record_cache_miss();

        let session = self
            .repository
            .find_session(session_id)
            .await
            .map_err(SessionError::persistence)?
            .ok_or_else(|| SessionError::session_not_found(session_id))?;

        debug!(session_id, "Session loaded from database into cache");
        self.write_session(&session).await?;
        Ok(session)
    }

    async fn read_cached(&self, session_id: &str) -> SessionResult<Option<Session>> {
        let raw = self
            .cache
            .get(&cache_keys::session(session_id))
            .await
            .map_err(SessionError::cache)?;
        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    async fn write_session(&self, session: &Session) -> SessionResult<()> {
        self.cache
            .set(
                &cache_keys::session(&session.id),
                &serde_json::to_string(session)?,
                self.settings.cache_ttl(),
            )
            .await
            .map_err(SessionError::cache)
    }

    /// Pending-update unless the session has never been inserted.
    async fn mark_dirty(&self, session_id: &str) -> SessionResult<()> {
        let never_inserted = self
            .cache
            .exists(&cache_keys::pending_insert(session_id))
            .await
            .map_err(SessionError::cache)?;
        if never_inserted {
            return Ok(());
        }

        self.cache
            .set(
                &cache_keys::pending_update(session_id),
                MARKER,
                self.settings.cache_ttl(),
            )
            .await
            .map_err(SessionError::cache)
    }
}

/// A session counts as started once it holds an event that the next older
/// session did not already have.
fn has_meaningful_event(latest: &Session, older: Option<&Session>) -> bool {
    if latest.events.is_empty() {
        return false;
    }
    match older {
        Some(older) => older.events.len() != latest.events.len(),
        None => true,
    }
}

fn carry_forward(previous: &Session, omr_mode: Option<bool>, now: DateTime<Utc>) -> Session {
    let session_answers = previous
        .session_answers
        .iter()
        .map(|answer| SessionAnswer {
            id: new_id(),
            ..answer.clone()
        })
        .collect();

    Session {
        id: new_id(),
        user_id: previous.user_id.clone(),
        quiz_id: previous.quiz_id.clone(),
        is_first: false,
        has_quiz_ended: previous.has_quiz_ended,
        omr_mode: omr_mode.unwrap_or(previous.omr_mode),
        question_order: previous.question_order.clone(),
        events: previous.events.clone(),
        time_limit_max: previous.time_limit_max,
        total_time_spent: previous.total_time_spent,
        time_remaining: previous.time_remaining,
        start_quiz_time: previous.start_quiz_time,
        end_quiz_time: previous.end_quiz_time,
        created_at: now,
        updated_at: now,
        session_answers,
        metrics: previous.metrics.clone(),
    }
}

fn new_id() -> String {
    ObjectId::new().to_hex()
}

fn answer_not_found(session_id: &str, position: usize) -> SessionError {
    SessionError::NotFound(format!(
        "session answer at position {} not found in session {}",
        position, session_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuestionRef, QuestionSet, TimeLimit};
    use crate::services::cache::InMemoryCache;
    use crate::services::repository::InMemorySessionRepository;

    struct Fixture {
        store: SessionStore,
        cache: Arc<InMemoryCache>,
        repository: Arc<InMemorySessionRepository>,
    }

    fn quiz(id: &str, questions: usize, time_limit: Option<u64>) -> Quiz {
        Quiz {
            id: id.to_string(),
            question_sets: vec![QuestionSet {
                id: Some("set-1".to_string()),
                questions: (0..questions)
                    .map(|n| QuestionRef {
                        id: format!("q{}", n),
                    })
                    .collect(),
            }],
            time_limit: time_limit.map(|max| TimeLimit {
                min: None,
                max: Some(max),
            }),
            metadata: None,
        }
    }

    fn blank_session(id: &str) -> Session {
        let now = Utc::now();
        Session {
            id: id.to_string(),
            user_id: "u9".to_string(),
            quiz_id: "quiz-1".to_string(),
            is_first: true,
            has_quiz_ended: false,
            omr_mode: false,
            question_order: vec![0, 1],
            events: Vec::new(),
            time_limit_max: None,
            total_time_spent: None,
            time_remaining: None,
            start_quiz_time: None,
            end_quiz_time: None,
            created_at: now,
            updated_at: now,
            session_answers: vec![
                SessionAnswer::unanswered(new_id(), "q0".to_string()),
                SessionAnswer::unanswered(new_id(), "q1".to_string()),
            ],
            metrics: None,
        }
    }

    fn fixture() -> Fixture {
        let cache = Arc::new(InMemoryCache::new());
        let repository = Arc::new(InMemorySessionRepository::new());
        repository.seed_quiz(quiz("quiz-1", 12, Some(600)));
        repository.seed_quiz(quiz("untimed", 3, None));

        let store = SessionStore::new(
            cache.clone(),
            Arc::new(InMemoryCache::new()),
            repository.clone(),
            Arc::new(KeyedLocks::new()),
            SessionSettings::default(),
        );

        Fixture {
            store,
            cache,
            repository,
        }
    }

    #[tokio::test]
    async fn first_session_is_seeded_from_the_quiz() {
        let f = fixture();
        let session = f.store.create_session("u1", "quiz-1", None).await.unwrap();

        assert!(session.is_first);
        assert!(!session.omr_mode);
        assert_eq!(session.session_answers.len(), 12);
        assert!(session.session_answers.iter().all(|a| a.answer.is_none()));
        assert_eq!(session.time_limit_max, Some(600));
        assert_eq!(session.time_remaining, Some(600));

        let mut order = session.question_order.clone();
        order.sort_unstable();
        assert_eq!(order, (0..12).collect::<Vec<_>>());

        assert!(f
            .cache
            .exists(&cache_keys::pending_insert(&session.id))
            .await
            .unwrap());
        assert_eq!(f.repository.session_count(), 0);
    }

    #[tokio::test]
    async fn unknown_quiz_is_not_found() {
        let f = fixture();
        let err = f.store.create_session("u1", "nope", None).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[tokio::test]
    async fn unstarted_session_is_reused_with_new_omr_mode() {
        let f = fixture();
        let first = f.store.create_session("u1", "quiz-1", None).await.unwrap();
        let again = f
            .store
            .create_session("u1", "quiz-1", Some(true))
            .await
            .unwrap();

        assert_eq!(again.id, first.id);
        assert!(again.is_first);
        assert!(again.omr_mode);
        // Still never inserted, so no update marker.
        assert!(!f
            .cache
            .exists(&cache_keys::pending_update(&first.id))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn started_session_is_carried_forward() {
        let f = fixture();
        let first = f.store.create_session("u1", "quiz-1", None).await.unwrap();
        f.store
            .apply_event(&first.id, EventType::Start, None)
            .await
            .unwrap();
        f.store
            .update_session_answer(
                &first.id,
                0,
                UpdateSessionAnswer {
                    answer: Some(Some(serde_json::json!(2))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let next = f.store.create_session("u1", "quiz-1", None).await.unwrap();

        assert_ne!(next.id, first.id);
        assert!(!next.is_first);
        assert_eq!(next.events.len(), 1);
        assert_eq!(next.question_order, first.question_order);
        assert_eq!(next.session_answers[0].answer, Some(serde_json::json!(2)));
        assert_ne!(next.session_answers[0].id, first.session_answers[0].id);

        // Carried forward but not started again: handed back as-is.
        let same = f.store.create_session("u1", "quiz-1", None).await.unwrap();
        assert_eq!(same.id, next.id);
    }

    #[tokio::test]
    async fn events_drive_time_remaining() {
        let f = fixture();
        let session = f.store.create_session("u1", "quiz-1", None).await.unwrap();

        let remaining = f
            .store
            .apply_event(&session.id, EventType::Start, None)
            .await
            .unwrap();
        assert_eq!(remaining, Some(600));

        let remaining = f
            .store
            .apply_event(&session.id, EventType::End, Some(serde_json::json!({"score": 3})))
            .await
            .unwrap();
        assert!(remaining.is_some_and(|r| r <= 600));

        let stored = f.store.get_session(&session.id).await.unwrap();
        assert!(stored.has_quiz_ended);
        assert!(stored.start_quiz_time.is_some());
        assert!(stored.end_quiz_time.is_some());
        assert_eq!(stored.metrics, Some(serde_json::json!({"score": 3})));
    }

    #[tokio::test]
    async fn untimed_quiz_reports_no_time_remaining() {
        let f = fixture();
        let session = f.store.create_session("u1", "untimed", None).await.unwrap();
        let remaining = f
            .store
            .apply_event(&session.id, EventType::Start, None)
            .await
            .unwrap();
        assert_eq!(remaining, None);
    }

    #[tokio::test]
    async fn timing_is_frozen_after_end() {
        let f = fixture();
        let session = f.store.create_session("u1", "quiz-1", None).await.unwrap();
        f.store
            .apply_event(&session.id, EventType::Start, None)
            .await
            .unwrap();
        f.store
            .apply_event(&session.id, EventType::End, None)
            .await
            .unwrap();
        let ended = f.store.get_session(&session.id).await.unwrap();

        f.store
            .apply_event(&session.id, EventType::Resume, None)
            .await
            .unwrap();
        let after = f.store.get_session(&session.id).await.unwrap();

        assert_eq!(after.total_time_spent, ended.total_time_spent);
        assert_eq!(after.end_quiz_time, ended.end_quiz_time);
    }

    #[tokio::test]
    async fn stored_session_is_loaded_into_cache_and_marked_for_update() {
        let f = fixture();
        let stored = blank_session("65f000000000000000000001");
        f.repository.seed_session(stored.clone());

        let fetched = f.store.get_session(&stored.id).await.unwrap();
        assert_eq!(fetched.id, stored.id);
        assert!(f
            .cache
            .exists(&cache_keys::session(&stored.id))
            .await
            .unwrap());

        f.store
            .apply_event(&stored.id, EventType::Start, None)
            .await
            .unwrap();
        assert!(f
            .cache
            .exists(&cache_keys::pending_update(&stored.id))
            .await
            .unwrap());
        assert!(!f
            .cache
            .exists(&cache_keys::pending_insert(&stored.id))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn multi_answer_update_is_all_or_nothing() {
        let f = fixture();
        let session = f.store.create_session("u1", "untimed", None).await.unwrap();
        let patch = UpdateSessionAnswer {
            visited: Some(true),
            ..Default::default()
        };

        let err = f
            .store
            .update_session_answers(&session.id, vec![(0, patch.clone()), (7, patch.clone())])
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
        let untouched = f.store.get_session(&session.id).await.unwrap();
        assert!(!untouched.session_answers[0].visited);

        let err = f
            .store
            .update_session_answers(
                &session.id,
                vec![(0, patch.clone()), (1, UpdateSessionAnswer::default())],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::BadRequest(_)));

        let updated = f
            .store
            .update_session_answers(&session.id, vec![(0, patch.clone()), (2, patch)])
            .await
            .unwrap();
        assert_eq!(updated.len(), 2);
        let answer = f.store.get_session_answer(&session.id, 2).await.unwrap();
        assert!(answer.visited);
    }

    #[test]
    fn meaningful_event_compares_against_older_session() {
        let now = Utc::now();
        let unstarted = blank_session("a");
        let mut started = blank_session("b");
        started.events.push(SessionEvent::new(EventType::Start, now));
        let mut progressed = started.clone();
        progressed
            .events
            .push(SessionEvent::new(EventType::Heartbeat, now));

        assert!(!has_meaningful_event(&unstarted, None));
        assert!(has_meaningful_event(&started, None));
        assert!(!has_meaningful_event(&started, Some(&started)));
        assert!(has_meaningful_event(&progressed, Some(&started)));
    }
}
