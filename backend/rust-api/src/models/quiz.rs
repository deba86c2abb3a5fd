use serde::{Deserialize, Serialize};

/// The slice of a quiz document the session layer reads. Everything else in
/// the `quizzes` collection (question text, options, marking schemes) is
/// ignored on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub question_sets: Vec<QuestionSet>,
    #[serde(default)]
    pub time_limit: Option<TimeLimit>,
    #[serde(default)]
    pub metadata: Option<QuizMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuestionRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRef {
    #[serde(rename = "_id")]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeLimit {
    #[serde(default)]
    pub min: Option<u64>,
    #[serde(default)]
    pub max: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizMetadata {
    #[serde(default)]
    pub quiz_type: Option<String>,
}

impl Quiz {
    pub fn time_limit_max(&self) -> Option<u64> {
        self.time_limit.as_ref().and_then(|limit| limit.max)
    }

    pub fn question_ids(&self) -> impl Iterator<Item = &str> {
        self.question_sets
            .iter()
            .flat_map(|set| set.questions.iter())
            .map(|question| question.id.as_str())
    }

    pub fn question_set_sizes(&self) -> Vec<usize> {
        self.question_sets
            .iter()
            .map(|set| set.questions.len())
            .collect()
    }
}
