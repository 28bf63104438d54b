use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AttemptFilter, AttemptPage, AttemptStore, TestCatalog};
use crate::error::Result;
use crate::models::answer::{Answer, AnswerWrite};
use crate::models::test::{TestSummary, TestWithQuestions};
use crate::models::test_attempt::{AttemptStatus, AttemptTransition, TestAttempt};

#[derive(Default)]
struct Inner {
    tests: HashMap<Uuid, TestWithQuestions>,
    attempts: HashMap<Uuid, TestAttempt>,
    answers: HashMap<(Uuid, Uuid), Answer>,
}

/// Process-local store behind one lock, so every operation is trivially
/// atomic. Backs the service and HTTP tests.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the catalog side. Questions keep their keys; hiding happens on read.
    pub async fn insert_test(&self, test: TestWithQuestions) {
        let mut inner = self.inner.lock().await;
        inner.tests.insert(test.test.id, test);
    }

    pub async fn answer_count(&self, attempt_id: Uuid) -> usize {
        let inner = self.inner.lock().await;
        inner
            .answers
            .keys()
            .filter(|(attempt, _)| *attempt == attempt_id)
            .count()
    }
}

#[async_trait]
impl TestCatalog for InMemoryStore {
    async fn get_test_with_questions(
        &self,
        test_id: Uuid,
        reveal_answer_keys: bool,
    ) -> Result<Option<TestWithQuestions>> {
        let inner = self.inner.lock().await;
        let Some(test) = inner.tests.get(&test_id).cloned() else {
            return Ok(None);
        };
        let mut test = if reveal_answer_keys {
            test
        } else {
            test.without_answer_keys()
        };
        test.questions.sort_by_key(|q| q.order_index);
        Ok(Some(test))
    }
}

#[async_trait]
impl AttemptStore for InMemoryStore {
    async fn find_or_start_attempt(
        &self,
        user_id: Uuid,
        test_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(TestAttempt, bool)> {
        let mut inner = self.inner.lock().await;
        if let Some(existing) = inner.attempts.values().find(|a| {
            a.user_id == user_id && a.test_id == test_id && a.status == AttemptStatus::InProgress
        }) {
            return Ok((existing.clone(), false));
        }
        let attempt = TestAttempt::new_in_progress(user_id, test_id, now);
        inner.attempts.insert(attempt.id, attempt.clone());
        Ok((attempt, true))
    }

    async fn get_attempt(&self, attempt_id: Uuid) -> Result<Option<TestAttempt>> {
        let inner = self.inner.lock().await;
        Ok(inner.attempts.get(&attempt_id).cloned())
    }

    async fn list_attempts(&self, user_id: Uuid, filter: &AttemptFilter) -> Result<AttemptPage> {
        let offset = filter.offset()?;
        let inner = self.inner.lock().await;
        let mut matching: Vec<(TestAttempt, TestSummary)> = inner
            .attempts
            .values()
            .filter(|a| a.user_id == user_id)
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .filter_map(|a| {
                let test = inner.tests.get(&a.test_id)?;
                if filter
                    .test_type
                    .is_some_and(|t| test.test.test_type != t)
                {
                    return None;
                }
                Some((a.clone(), TestSummary::from(&test.test)))
            })
            .collect();
        matching.sort_by(|(a, _), (b, _)| b.updated_at.cmp(&a.updated_at));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(filter.limit.max(0) as usize)
            .collect();
        Ok(AttemptPage { items, total })
    }

    async fn list_answers(&self, attempt_id: Uuid) -> Result<Vec<Answer>> {
        let inner = self.inner.lock().await;
        let mut answers: Vec<Answer> = inner
            .answers
            .values()
            .filter(|a| a.test_attempt_id == attempt_id)
            .cloned()
            .collect();
        answers.sort_by_key(|a| a.created_at);
        Ok(answers)
    }

    async fn upsert_answer(&self, answer: AnswerWrite, now: DateTime<Utc>) -> Result<Option<Answer>> {
        let mut inner = self.inner.lock().await;
        let Some(attempt) = inner.attempts.get_mut(&answer.test_attempt_id) else {
            return Ok(None);
        };
        if !attempt.status.accepts_answers() {
            return Ok(None);
        }
        attempt.revision += 1;
        attempt.updated_at = now;

        let key = (answer.test_attempt_id, answer.question_id);
        let stored = answer.into_answer(inner.answers.get(&key), now);
        inner.answers.insert(key, stored.clone());
        Ok(Some(stored))
    }

    async fn transition_attempt(
        &self,
        attempt_id: Uuid,
        from: AttemptStatus,
        expected_revision: Option<i32>,
        transition: &AttemptTransition,
        now: DateTime<Utc>,
    ) -> Result<Option<TestAttempt>> {
        let mut inner = self.inner.lock().await;
        let Some(attempt) = inner.attempts.get_mut(&attempt_id) else {
            return Ok(None);
        };
        if attempt.status != from || expected_revision.is_some_and(|rev| attempt.revision != rev) {
            return Ok(None);
        }
        transition.apply(attempt, now);
        Ok(Some(attempt.clone()))
    }
}
