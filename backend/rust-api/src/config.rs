use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    /// Shared cache used for sessions, markers and the write-back lock.
    pub redis_uri: String,
    /// Optional same-host cache for quiz documents. Falls back to an
    /// in-process cache when unset.
    pub redis_local_uri: Option<String>,
    pub server: ServerSettings,
    pub sessions: SessionSettings,
    pub write_back: WriteBackSettings,
    pub request_gate: RequestGateSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    /// Browser origins allowed by CORS. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8081".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Block size for per-page question shuffling.
    pub subset_size: usize,
    /// How many sessions per user+quiz pair stay in the cache.
    pub recent_sessions_capacity: usize,
    pub cache_ttl_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            subset_size: 10,
            recent_sessions_capacity: 2,
            cache_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl SessionSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriteBackSettings {
    pub lock_ttl_secs: u64,
    pub interval_secs: u64,
    /// Run the flush loop inside the API process instead of a separate worker.
    pub run_in_api: bool,
}

impl Default for WriteBackSettings {
    fn default() -> Self {
        Self {
            lock_ttl_secs: 60 * 60,
            interval_secs: 5 * 60,
            run_in_api: false,
        }
    }
}

impl WriteBackSettings {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RequestGateSettings {
    pub retries: usize,
    pub delay_ms: u64,
}

impl Default for RequestGateSettings {
    fn default() -> Self {
        Self {
            retries: 10,
            delay_ms: 500,
        }
    }
}

impl RequestGateSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017".to_string(),
            mongo_database: "quiz".to_string(),
            redis_uri: "redis://127.0.0.1:6379/0".to_string(),
            redis_local_uri: None,
            server: ServerSettings::default(),
            sessions: SessionSettings::default(),
            write_back: WriteBackSettings::default(),
            request_gate: RequestGateSettings::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then a local one
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml, then APP_* overrides (APP_SESSIONS__SUBSET_SIZE=5)
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let defaults = Config::default();

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| {
                eprintln!("WARNING: MONGO_URI not set, using {}", defaults.mongo_uri);
                defaults.mongo_uri.clone()
            });

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or(defaults.mongo_database);

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| {
                let host = env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
                let port = env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
                match env::var("REDIS_PASSWORD") {
                    Ok(password) => format!("redis://:{}@{}:{}/0", password, host, port),
                    Err(_) => format!("redis://{}:{}/0", host, port),
                }
            });

        let redis_local_uri = settings
            .get_string("redis.local_uri")
            .or_else(|_| env::var("REDIS_LOCAL_URI"))
            .ok()
            .filter(|uri| !uri.is_empty());

        if env == "prod" && env::var("METRICS_AUTH").is_err() {
            eprintln!("WARNING: METRICS_AUTH not set, /metrics uses default credentials");
        }

        Ok(Config {
            mongo_uri,
            mongo_database,
            redis_uri,
            redis_local_uri,
            server: section(&settings, "server")?,
            sessions: section(&settings, "sessions")?,
            write_back: section(&settings, "write_back")?,
            request_gate: section(&settings, "request_gate")?,
        })
    }
}

/// Deserializes an optional table; missing tables fall back to defaults.
fn section<T>(settings: &config::Config, key: &str) -> Result<T, config::ConfigError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match settings.get::<T>(key) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => Ok(T::default()),
        Err(e) => Err(e),
    }
}
