use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Answer {
    pub id: Uuid,
    pub test_attempt_id: Uuid,
    pub question_id: Uuid,
    pub answer_text: Option<String>,
    pub selected_options: Option<JsonValue>,
    pub is_correct: Option<bool>,
    pub score: Option<f64>,
    pub feedback: Option<String>,
    pub time_spent: Option<i32>,
    pub audio_recording: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A graded answer ready to be upserted for (attempt, question).
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerWrite {
    pub test_attempt_id: Uuid,
    pub question_id: Uuid,
    pub answer_text: Option<String>,
    pub selected_options: Option<JsonValue>,
    pub is_correct: Option<bool>,
    pub score: Option<f64>,
    pub time_spent: Option<i32>,
    pub audio_recording: Option<String>,
}

impl AnswerWrite {
    /// Builds a fresh row, or overwrites `existing` in place keeping its id.
    pub fn into_answer(self, existing: Option<&Answer>, now: DateTime<Utc>) -> Answer {
        let (id, created_at, feedback) = match existing {
            Some(prev) => (prev.id, prev.created_at, prev.feedback.clone()),
            None => (Uuid::new_v4(), now, None),
        };
        Answer {
            id,
            test_attempt_id: self.test_attempt_id,
            question_id: self.question_id,
            answer_text: self.answer_text,
            selected_options: self.selected_options,
            is_correct: self.is_correct,
            score: self.score,
            feedback,
            time_spent: self.time_spent,
            audio_recording: self.audio_recording,
            created_at,
            updated_at: now,
        }
    }
}
