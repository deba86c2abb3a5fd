use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Async mutual exclusion per string key (session id, user+quiz pair).
///
/// Entries are created on demand and dropped once the last holder and all
/// waiters are gone, so the table only ever contains contended keys.
#[derive(Default)]
pub struct KeyedLocks {
    table: Arc<LockTable>,
}

pub struct KeyedLockGuard {
    key: String,
    table: Arc<LockTable>,
    _guard: OwnedMutexGuard<()>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyedLockGuard {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            table
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = mutex.lock_owned().await;

        KeyedLockGuard {
            key: key.to_string(),
            table: self.table.clone(),
            _guard: guard,
        }
    }

    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for KeyedLockGuard {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        // One reference is the table's, one is held by our own guard.
        let idle = table
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) <= 2);
        if idle {
            table.remove(&self.key);
        }
    }
}
