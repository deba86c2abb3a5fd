use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// Lifecycle transition recorded in a session's event log.
///
/// Stored under the names the quiz frontend has always sent; the short forms
/// are accepted on input as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "start-quiz", alias = "start")]
    Start,
    #[serde(rename = "resume-quiz", alias = "resume")]
    Resume,
    #[serde(rename = "dummy-event", alias = "heartbeat")]
    Heartbeat,
    #[serde(rename = "end-quiz", alias = "end")]
    End,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Start => "start-quiz",
            EventType::Resume => "resume-quiz",
            EventType::Heartbeat => "dummy-event",
            EventType::End => "end-quiz",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub event_type: EventType,
    pub created_at: DateTime<Utc>,
    /// Only heartbeats ever move this past `created_at`. Older documents may
    /// lack it entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionEvent {
    pub fn new(event_type: EventType, at: DateTime<Utc>) -> Self {
        Self {
            event_type,
            created_at: at,
            updated_at: Some(at),
        }
    }

    /// Point in time at which this event stopped being "active".
    pub fn end_time(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAnswer {
    #[serde(rename = "_id")]
    pub id: String,
    pub question_id: String,
    #[serde(default)]
    pub answer: Option<serde_json::Value>,
    #[serde(default)]
    pub visited: bool,
    #[serde(default)]
    pub marked_for_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_spent: Option<f64>,
}

impl SessionAnswer {
    pub fn unanswered(id: String, question_id: String) -> Self {
        Self {
            id,
            question_id,
            answer: None,
            visited: false,
            marked_for_review: false,
            time_spent: None,
        }
    }

    pub fn apply(&mut self, patch: &UpdateSessionAnswer) {
        if let Some(answer) = &patch.answer {
            self.answer = answer.clone();
        }
        if let Some(visited) = patch.visited {
            self.visited = visited;
        }
        if let Some(marked) = patch.marked_for_review {
            self.marked_for_review = marked;
        }
        if let Some(time_spent) = patch.time_spent {
            self.time_spent = Some(time_spent);
        }
    }
}

/// One quiz attempt by one user. The cache holds the authoritative copy
/// while the attempt is active; the `sessions` collection gets it on flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub quiz_id: String,
    pub is_first: bool,
    #[serde(default)]
    pub has_quiz_ended: bool,
    #[serde(default)]
    pub omr_mode: bool,
    #[serde(default)]
    pub question_order: Vec<usize>,
    #[serde(default)]
    pub events: Vec<SessionEvent>,
    #[serde(default)]
    pub time_limit_max: Option<u64>,
    #[serde(default)]
    pub total_time_spent: Option<f64>,
    #[serde(default)]
    pub time_remaining: Option<u64>,
    #[serde(default)]
    pub start_quiz_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_quiz_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub session_answers: Vec<SessionAnswer>,
    /// Scoring output supplied by the client on `end-quiz`; stored verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<serde_json::Value>,
}

impl Session {
    pub fn has_started(&self) -> bool {
        self.events
            .first()
            .is_some_and(|event| event.event_type == EventType::Start)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, message = "quiz_id must not be empty"))]
    pub quiz_id: String,
    #[validate(length(min = 1, message = "user_id must not be empty"))]
    pub user_id: String,
    pub omr_mode: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub event: EventType,
    pub metrics: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct UpdateSessionResponse {
    /// `None` means the quiz is untimed.
    pub time_remaining: Option<u64>,
}

/// Partial update of one answer. An absent field is left alone; an explicit
/// `"answer": null` clears the stored answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSessionAnswer {
    #[serde(default, deserialize_with = "present")]
    pub answer: Option<Option<serde_json::Value>>,
    pub visited: Option<bool>,
    pub marked_for_review: Option<bool>,
    pub time_spent: Option<f64>,
}

/// Marks a field that was present in the payload, even as `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateSessionAnswer {
    pub fn is_empty(&self) -> bool {
        self.answer.is_none()
            && self.visited.is_none()
            && self.marked_for_review.is_none()
            && self.time_spent.is_none()
    }
}
