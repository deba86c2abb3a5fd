use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOptions, ReplaceOptions};
use mongodb::{Collection, Database};

use crate::metrics::track_db_operation;
use crate::models::{Quiz, Session};

const QUIZZES: &str = "quizzes";
const SESSIONS: &str = "sessions";

/// Durable storage for quizzes (read-only here) and sessions.
///
/// Bulk writes report how many documents were acknowledged so the
/// write-back worker can refuse to clear markers on a partial write.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn find_quiz(&self, quiz_id: &str) -> Result<Option<Quiz>>;

    async fn find_session(&self, session_id: &str) -> Result<Option<Session>>;

    /// Up to `limit` sessions for the pair, newest first.
    async fn find_recent_sessions(
        &self,
        user_id: &str,
        quiz_id: &str,
        limit: usize,
    ) -> Result<Vec<Session>>;

    async fn insert_sessions(&self, sessions: &[Session]) -> Result<usize>;

    /// Full-document replace keyed by id, inserting when absent.
    async fn upsert_sessions(&self, sessions: &[Session]) -> Result<usize>;

    /// Subset of `ids` already stored.
    async fn existing_session_ids(&self, ids: &[String]) -> Result<HashSet<String>>;

    async fn ping(&self) -> Result<()>;
}

pub struct MongoSessionRepository {
    mongo: Database,
}

impl MongoSessionRepository {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    fn quizzes(&self) -> Collection<Quiz> {
        self.mongo.collection(QUIZZES)
    }

    fn sessions(&self) -> Collection<Session> {
        self.mongo.collection(SESSIONS)
    }
}

#[async_trait]
impl SessionRepository for MongoSessionRepository {
    async fn find_quiz(&self, quiz_id: &str) -> Result<Option<Quiz>> {
        track_db_operation("find_one", QUIZZES, async {
            self.quizzes()
                .find_one(doc! { "_id": quiz_id })
                .await
                .with_context(|| format!("Failed to load quiz {}", quiz_id))
        })
        .await
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<Session>> {
        track_db_operation("find_one", SESSIONS, async {
            self.sessions()
                .find_one(doc! { "_id": session_id })
                .await
                .with_context(|| format!("Failed to load session {}", session_id))
        })
        .await
    }

    async fn find_recent_sessions(
        &self,
        user_id: &str,
        quiz_id: &str,
        limit: usize,
    ) -> Result<Vec<Session>> {
        // ObjectId hex strings sort by creation time.
        let options = FindOptions::builder()
            .sort(doc! { "_id": -1 })
            .limit(limit as i64)
            .build();

        track_db_operation("find", SESSIONS, async {
            let cursor = self
                .sessions()
                .find(doc! { "user_id": user_id, "quiz_id": quiz_id })
                .with_options(options)
                .await
                .context("Failed to query recent sessions")?;

            cursor
                .try_collect()
                .await
                .context("Failed to collect recent sessions")
        })
        .await
    }

    async fn insert_sessions(&self, sessions: &[Session]) -> Result<usize> {
        if sessions.is_empty() {
            return Ok(0);
        }

        track_db_operation("insert_many", SESSIONS, async {
            let result = self
                .sessions()
                .insert_many(sessions)
                .await
                .context("Failed to insert sessions")?;
            Ok(result.inserted_ids.len())
        })
        .await
    }

    async fn upsert_sessions(&self, sessions: &[Session]) -> Result<usize> {
        let mut acknowledged = 0;

        for session in sessions {
            let result = track_db_operation("replace_one", SESSIONS, async {
                self.sessions()
                    .replace_one(doc! { "_id": session.id.as_str() }, session)
                    .with_options(ReplaceOptions::builder().upsert(true).build())
                    .await
                    .with_context(|| format!("Failed to upsert session {}", session.id))
            })
            .await?;

            if result.matched_count == 1 || result.upserted_id.is_some() {
                acknowledged += 1;
            }
        }

        Ok(acknowledged)
    }

    async fn existing_session_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let options = FindOptions::builder().projection(doc! { "_id": 1 }).build();

        track_db_operation("find", SESSIONS, async {
            let cursor = self
                .mongo
                .collection::<Document>(SESSIONS)
                .find(doc! { "_id": { "$in": ids.to_vec() } })
                .with_options(options)
                .await
                .context("Failed to probe existing session ids")?;

            let docs: Vec<Document> = cursor
                .try_collect()
                .await
                .context("Failed to collect existing session ids")?;

            Ok(docs
                .iter()
                .filter_map(|d| d.get_str("_id").ok().map(str::to_string))
                .collect())
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }
}

/// Map-backed repository for tests and local runs without MongoDB.
#[derive(Default)]
pub struct InMemorySessionRepository {
    quizzes: Mutex<HashMap<String, Quiz>>,
    sessions: Mutex<Vec<Session>>,
    fail_writes: AtomicBool,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_quiz(&self, quiz: Quiz) {
        self.quizzes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(quiz.id.clone(), quiz);
    }

    pub fn seed_session(&self, session: Session) {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(session);
    }

    /// Stored copy of a session, bypassing any cache.
    pub fn stored_session(&self, session_id: &str) -> Option<Session> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// While set, bulk writes store nothing and acknowledge zero documents.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn writes_failing(&self) -> bool {
        self.fail_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn find_quiz(&self, quiz_id: &str) -> Result<Option<Quiz>> {
        Ok(self
            .quizzes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(quiz_id)
            .cloned())
    }

    async fn find_session(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.stored_session(session_id))
    }

    async fn find_recent_sessions(
        &self,
        user_id: &str,
        quiz_id: &str,
        limit: usize,
    ) -> Result<Vec<Session>> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<Session> = sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.quiz_id == quiz_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.id.cmp(&a.id));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn insert_sessions(&self, batch: &[Session]) -> Result<usize> {
        if self.writes_failing() {
            return Ok(0);
        }

        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(dup) = batch
            .iter()
            .find(|new| sessions.iter().any(|s| s.id == new.id))
        {
            return Err(anyhow!("duplicate key: session {} already stored", dup.id));
        }
        sessions.extend(batch.iter().cloned());
        Ok(batch.len())
    }

    async fn upsert_sessions(&self, batch: &[Session]) -> Result<usize> {
        if self.writes_failing() {
            return Ok(0);
        }

        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        for session in batch {
            match sessions.iter_mut().find(|s| s.id == session.id) {
                Some(existing) => *existing = session.clone(),
                None => sessions.push(session.clone()),
            }
        }
        Ok(batch.len())
    }

    async fn existing_session_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(sessions
            .iter()
            .filter(|s| ids.contains(&s.id))
            .map(|s| s.id.clone())
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
