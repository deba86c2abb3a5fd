use std::sync::Arc;
use std::time::Duration;

use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;

use crate::config::Config;
use crate::utils::keyed_lock::KeyedLocks;

pub mod cache;
pub mod cache_keys;
pub mod question_order;
pub mod repository;
pub mod request_gate;
pub mod session_store;
pub mod timeline;
pub mod write_back;

use cache::{CacheStore, InMemoryCache, RedisCache};
use repository::{MongoSessionRepository, SessionRepository};
use request_gate::RequestGate;
use session_store::SessionStore;
use write_back::WriteBackCoordinator;

pub struct AppState {
    pub config: Config,
    pub cache: Arc<dyn CacheStore>,
    pub repository: Arc<dyn SessionRepository>,
    pub sessions: SessionStore,
    pub write_back: WriteBackCoordinator,
    pub request_gate: RequestGate,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");
        let cache: Arc<dyn CacheStore> = Arc::new(RedisCache::new(connect_redis(redis_client).await?));
        tracing::info!("Redis connection established successfully");

        let local_cache: Arc<dyn CacheStore> = match &config.redis_local_uri {
            Some(uri) => {
                let client = redis::Client::open(uri.as_str())?;
                tracing::info!("Using local Redis for quiz documents");
                Arc::new(RedisCache::new(connect_redis(client).await?))
            }
            None => {
                tracing::info!("No local Redis configured, caching quizzes in process");
                Arc::new(InMemoryCache::new())
            }
        };

        let repository: Arc<dyn SessionRepository> = Arc::new(MongoSessionRepository::new(mongo));

        Ok(Self::from_backends(config, cache, local_cache, repository))
    }

    /// Wires the services over already-built backends.
    pub fn from_backends(
        config: Config,
        cache: Arc<dyn CacheStore>,
        local_cache: Arc<dyn CacheStore>,
        repository: Arc<dyn SessionRepository>,
    ) -> Self {
        // Shared so flush and request handlers serialize on the same session ids.
        let locks = Arc::new(KeyedLocks::new());

        let sessions = SessionStore::new(
            cache.clone(),
            local_cache,
            repository.clone(),
            locks.clone(),
            config.sessions.clone(),
        );
        let write_back = WriteBackCoordinator::new(
            cache.clone(),
            repository.clone(),
            locks,
            config.write_back.clone(),
            config.sessions.cache_ttl(),
        );
        let request_gate = RequestGate::new(cache.clone(), config.request_gate.clone());

        Self {
            config,
            cache,
            repository,
            sessions,
            write_back,
            request_gate,
        }
    }
}

async fn connect_redis(client: redis::Client) -> anyhow::Result<ConnectionManager> {
    let redis = tokio::time::timeout(Duration::from_secs(30), ConnectionManager::new(client))
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    let mut conn = redis.clone();
    tokio::time::timeout(
        Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    Ok(redis)
}
