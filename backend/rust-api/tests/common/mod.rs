#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use quiz_session_api::{
    config::Config,
    create_router,
    models::quiz::{QuestionRef, QuestionSet, Quiz, TimeLimit},
    services::{
        cache::{CacheStore, InMemoryCache},
        repository::{InMemorySessionRepository, SessionRepository},
        AppState,
    },
};

pub const TIMED_QUIZ: &str = "quiz-timed";
pub const UNTIMED_QUIZ: &str = "quiz-untimed";

/// Router plus the backends behind it, so tests can look at what the
/// handlers left in the cache and the database.
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub cache: Arc<InMemoryCache>,
    pub repository: Arc<InMemorySessionRepository>,
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(test_config())
}

pub fn create_test_app_with(config: Config) -> TestApp {
    build_test_app(config, |cache| cache as Arc<dyn CacheStore>)
}

/// Like `create_test_app`, but every shared-cache call yields to the
/// scheduler before and after it runs, so concurrent requests interleave
/// between their reads and writes.
pub fn create_yielding_test_app() -> TestApp {
    build_test_app(test_config(), |cache| {
        Arc::new(YieldingCache { inner: cache }) as Arc<dyn CacheStore>
    })
}

fn build_test_app(
    config: Config,
    wrap: impl FnOnce(Arc<InMemoryCache>) -> Arc<dyn CacheStore>,
) -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let cache = Arc::new(InMemoryCache::new());
    let repository = Arc::new(InMemorySessionRepository::new());
    seed_quizzes(&repository);

    let shared_cache = wrap(cache.clone());
    let local_cache: Arc<dyn CacheStore> = Arc::new(InMemoryCache::new());
    let store: Arc<dyn SessionRepository> = repository.clone();

    let state = Arc::new(AppState::from_backends(
        config,
        shared_cache,
        local_cache,
        store,
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        cache,
        repository,
    }
}

pub struct YieldingCache {
    inner: Arc<InMemoryCache>,
}

impl YieldingCache {
    async fn around<T>(&self, op: impl std::future::Future<Output = T>) -> T {
        tokio::task::yield_now().await;
        let result = op.await;
        tokio::task::yield_now().await;
        result
    }
}

#[async_trait]
impl CacheStore for YieldingCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.around(self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        self.around(self.inner.set(key, value, ttl)).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<bool> {
        self.around(self.inner.set_if_absent(key, value, ttl)).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.around(self.inner.delete(key)).await
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> anyhow::Result<bool> {
        self.around(self.inner.delete_if_equals(key, expected)).await
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.around(self.inner.exists(key)).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        self.around(self.inner.keys_with_prefix(prefix)).await
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.inner.ping().await
    }
}

/// Defaults with a short request gate so a held lock fails fast.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.request_gate.retries = 3;
    config.request_gate.delay_ms = 20;
    config
}

fn seed_quizzes(repository: &InMemorySessionRepository) {
    repository.seed_quiz(quiz(TIMED_QUIZ, &[3, 2], Some(600)));
    repository.seed_quiz(quiz(UNTIMED_QUIZ, &[4], None));
}

pub fn quiz(id: &str, set_sizes: &[usize], time_limit_max: Option<u64>) -> Quiz {
    let mut counter = 0;
    let question_sets = set_sizes
        .iter()
        .map(|size| QuestionSet {
            id: None,
            questions: (0..*size)
                .map(|_| {
                    counter += 1;
                    QuestionRef {
                        id: format!("{}-q{}", id, counter),
                    }
                })
                .collect(),
        })
        .collect();

    Quiz {
        id: id.to_string(),
        question_sets,
        time_limit: time_limit_max.map(|max| TimeLimit {
            min: None,
            max: Some(max),
        }),
        metadata: None,
    }
}

/// Sends one request and returns the status and JSON body (`Null` when the
/// body is empty or not JSON).
pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    (status, json)
}

/// Creates a session and returns its JSON, panicking on anything but 201.
pub async fn create_session(app: &Router, user_id: &str, quiz_id: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/sessions/",
        Some(serde_json::json!({ "user_id": user_id, "quiz_id": quiz_id })),
    )
    .await;

    if status != StatusCode::CREATED {
        panic!("Expected 201 on create, got {}: {}", status, body);
    }

    body
}

pub async fn send_event(app: &Router, session_id: &str, event: &str) -> Value {
    let (status, body) = send(
        app,
        "PATCH",
        &format!("/sessions/{}", session_id),
        Some(serde_json::json!({ "event": event })),
    )
    .await;

    if status != StatusCode::OK {
        panic!("Expected 200 on {}, got {}: {}", event, status, body);
    }

    body
}

pub fn session_id(session: &Value) -> String {
    session["_id"].as_str().unwrap().to_string()
}
