//! Persistence seams for the attempt lifecycle.
//!
//! [`TestCatalog`] is the read-only view of tests owned by the catalog;
//! [`AttemptStore`] owns attempts and answers. Every method that checks an
//! attempt's status and writes in the same call does both atomically.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::answer::{Answer, AnswerWrite};
use crate::models::test::{TestSummary, TestType, TestWithQuestions};
use crate::models::test_attempt::{AttemptStatus, AttemptTransition, TestAttempt};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TestCatalog: Send + Sync {
    /// Questions come back in display order. With `reveal_answer_keys`
    /// false every question's key is absent.
    async fn get_test_with_questions(
        &self,
        test_id: Uuid,
        reveal_answer_keys: bool,
    ) -> Result<Option<TestWithQuestions>>;
}

#[derive(Debug, Clone, Default)]
pub struct AttemptFilter {
    pub status: Option<AttemptStatus>,
    pub test_type: Option<TestType>,
    pub page: i64,
    pub limit: i64,
}

impl AttemptFilter {
    /// Rows to skip for `page`. A page too far out to address is a bad request.
    pub fn offset(&self) -> Result<i64> {
        (self.page.max(1) - 1)
            .checked_mul(self.limit.max(0))
            .ok_or_else(|| Error::Validation(format!("page {} is out of range", self.page)))
    }
}

#[derive(Debug, Clone)]
pub struct AttemptPage {
    pub items: Vec<(TestAttempt, TestSummary)>,
    pub total: i64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Returns the user's in-progress attempt at the test, creating one when
    /// none exists. The flag is true when a new attempt was created.
    async fn find_or_start_attempt(
        &self,
        user_id: Uuid,
        test_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(TestAttempt, bool)>;

    async fn get_attempt(&self, attempt_id: Uuid) -> Result<Option<TestAttempt>>;

    /// The user's attempts, most recently active first.
    async fn list_attempts(&self, user_id: Uuid, filter: &AttemptFilter) -> Result<AttemptPage>;

    async fn list_answers(&self, attempt_id: Uuid) -> Result<Vec<Answer>>;

    /// Inserts or overwrites the answer for (attempt, question) and bumps the
    /// attempt's revision, but only while the attempt is in progress.
    /// `None` means the attempt no longer accepts answers.
    async fn upsert_answer(&self, answer: AnswerWrite, now: DateTime<Utc>) -> Result<Option<Answer>>;

    /// Applies `transition` if the attempt is still in `from` and, when
    /// given, still at `expected_revision`. `None` when the guard fails.
    async fn transition_attempt(
        &self,
        attempt_id: Uuid,
        from: AttemptStatus,
        expected_revision: Option<i32>,
        transition: &AttemptTransition,
        now: DateTime<Utc>,
    ) -> Result<Option<TestAttempt>>;
}
