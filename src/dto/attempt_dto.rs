use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

use crate::models::answer::Answer;
use crate::models::test::{TestSummary, TestType, TestWithQuestions};
use crate::models::test_attempt::{AttemptStatus, TestAttempt};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartAttemptResponse {
    pub test_attempt: TestAttempt,
    pub test: TestWithQuestions,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    pub question_id: Uuid,
    pub answer_text: Option<String>,
    pub selected_options: Option<JsonValue>,
    #[validate(range(min = 0))]
    pub time_spent: Option<i32>,
    pub audio_recording: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteAttemptResponse {
    #[serde(flatten)]
    pub attempt: TestAttempt,
    pub answered_questions: usize,
    pub total_questions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage_score: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReviewAttemptRequest {
    #[validate(range(min = 0.0, max = 9.0))]
    pub band_score: f64,
    #[validate(length(max = 10000))]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListAttemptsQuery {
    pub status: Option<AttemptStatus>,
    #[serde(rename = "type")]
    pub test_type: Option<TestType>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptListItem {
    #[serde(flatten)]
    pub attempt: TestAttempt,
    pub test: TestSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub pages: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptListResponse {
    pub success: bool,
    pub data: Vec<AttemptListItem>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptDetail {
    #[serde(flatten)]
    pub attempt: TestAttempt,
    pub test: TestWithQuestions,
    pub answers: Vec<Answer>,
}
