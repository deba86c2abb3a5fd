//! Key layout shared by the API instances and the write-back worker.

pub const SESSION_PREFIX: &str = "session_";
pub const PENDING_INSERT_PREFIX: &str = "session_id_to_insert_";
pub const PENDING_UPDATE_PREFIX: &str = "session_id_to_update_";
pub const RECENT_SESSIONS_PREFIX: &str = "previous_two_session_ids_";
pub const WRITE_BACK_LOCK: &str = "write_back_lock";

/// Marker value for pending-insert / pending-update keys.
pub const MARKER: &str = "1";

pub fn session(session_id: &str) -> String {
    format!("{}{}", SESSION_PREFIX, session_id)
}

pub fn pending_insert(session_id: &str) -> String {
    format!("{}{}", PENDING_INSERT_PREFIX, session_id)
}

pub fn pending_update(session_id: &str) -> String {
    format!("{}{}", PENDING_UPDATE_PREFIX, session_id)
}

pub fn recent_sessions(user_id: &str, quiz_id: &str) -> String {
    format!("{}{}_{}", RECENT_SESSIONS_PREFIX, user_id, quiz_id)
}

pub fn quiz(quiz_id: &str) -> String {
    format!("quiz_{}", quiz_id)
}

/// Session id carried by a marker key, if `key` starts with `prefix`.
pub fn session_id_from<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix).filter(|id| !id.is_empty())
}
