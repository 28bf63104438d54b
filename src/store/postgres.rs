use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{AttemptFilter, AttemptPage, AttemptStore, TestCatalog};
use crate::error::{Error, Result};
use crate::models::answer::{Answer, AnswerWrite};
use crate::models::question::{AnswerKey, Question, QuestionType};
use crate::models::test::{DifficultyLevel, Test, TestSummary, TestWithQuestions};
use crate::models::test_attempt::{AttemptStatus, AttemptTransition, TestAttempt};

const TEST_COLUMNS: &str = r#"id, title, description, type, difficulty_level, duration_minutes,
    instructions, is_active, is_premium, created_at, updated_at"#;

#[derive(Debug, FromRow)]
struct QuestionRow {
    id: Uuid,
    test_id: Uuid,
    question_text: String,
    question_type: QuestionType,
    options: Option<JsonValue>,
    correct_answer: Option<JsonValue>,
    marks: f64,
    explanation: Option<String>,
    difficulty: DifficultyLevel,
    section: Option<String>,
    audio_file: Option<String>,
    image_file: Option<String>,
    order_index: i32,
}

impl QuestionRow {
    fn into_question(self, reveal_answer_keys: bool) -> Result<Question> {
        let correct_answer = match (reveal_answer_keys, &self.correct_answer) {
            (true, Some(raw)) => AnswerKey::from_json(self.question_type, raw)
                .map_err(|e| Error::Internal(format!("question {}: {}", self.id, e)))?,
            _ => None,
        };
        Ok(Question {
            id: self.id,
            test_id: self.test_id,
            question_text: self.question_text,
            question_type: self.question_type,
            options: self.options,
            correct_answer,
            marks: self.marks,
            explanation: self.explanation.filter(|_| reveal_answer_keys),
            difficulty: self.difficulty,
            section: self.section,
            audio_file: self.audio_file,
            image_file: self.image_file,
            order_index: self.order_index,
        })
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_in_progress(&self, user_id: Uuid, test_id: Uuid) -> Result<Option<TestAttempt>> {
        let attempt = sqlx::query_as::<_, TestAttempt>(
            r#"SELECT * FROM test_attempts
               WHERE user_id = $1 AND test_id = $2 AND status = 'in-progress'"#,
        )
        .bind(user_id)
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn test_summaries(&self, test_ids: Vec<Uuid>) -> Result<HashMap<Uuid, TestSummary>> {
        let tests = sqlx::query_as::<_, Test>(&format!(
            "SELECT {} FROM tests WHERE id = ANY($1)",
            TEST_COLUMNS
        ))
        .bind(test_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(tests.iter().map(|t| (t.id, TestSummary::from(t))).collect())
    }
}

#[async_trait]
impl TestCatalog for PgStore {
    async fn get_test_with_questions(
        &self,
        test_id: Uuid,
        reveal_answer_keys: bool,
    ) -> Result<Option<TestWithQuestions>> {
        let test = sqlx::query_as::<_, Test>(&format!(
            "SELECT {} FROM tests WHERE id = $1",
            TEST_COLUMNS
        ))
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(test) = test else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, QuestionRow>(
            r#"SELECT id, test_id, question_text, question_type, options, correct_answer, marks,
                      explanation, difficulty, section, audio_file, image_file, order_index
               FROM questions
               WHERE test_id = $1
               ORDER BY order_index ASC"#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        let questions = rows
            .into_iter()
            .map(|row| row.into_question(reveal_answer_keys))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(TestWithQuestions { test, questions }))
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn find_or_start_attempt(
        &self,
        user_id: Uuid,
        test_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(TestAttempt, bool)> {
        if let Some(existing) = self.find_in_progress(user_id, test_id).await? {
            return Ok((existing, false));
        }

        // The partial unique index lets exactly one concurrent insert win.
        let created = sqlx::query_as::<_, TestAttempt>(
            r#"
            INSERT INTO test_attempts (id, user_id, test_id, start_time, status, revision, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'in-progress', 0, $4, $4)
            ON CONFLICT (user_id, test_id) WHERE status = 'in-progress' DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(test_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(attempt) = created {
            return Ok((attempt, true));
        }

        match self.find_in_progress(user_id, test_id).await? {
            Some(existing) => Ok((existing, false)),
            None => Err(Error::Conflict(
                "Attempt changed while starting, please retry".to_string(),
            )),
        }
    }

    async fn get_attempt(&self, attempt_id: Uuid) -> Result<Option<TestAttempt>> {
        let attempt = sqlx::query_as::<_, TestAttempt>(r#"SELECT * FROM test_attempts WHERE id = $1"#)
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(attempt)
    }

    async fn list_attempts(&self, user_id: Uuid, filter: &AttemptFilter) -> Result<AttemptPage> {
        let offset = filter.offset()?;
        let attempts = sqlx::query_as::<_, TestAttempt>(
            r#"
            SELECT a.* FROM test_attempts a
            JOIN tests t ON t.id = a.test_id
            WHERE a.user_id = $1
              AND ($2::attempt_status IS NULL OR a.status = $2)
              AND ($3::test_type IS NULL OR t.type = $3)
            ORDER BY a.updated_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(user_id)
        .bind(filter.status)
        .bind(filter.test_type)
        .bind(filter.limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM test_attempts a
            JOIN tests t ON t.id = a.test_id
            WHERE a.user_id = $1
              AND ($2::attempt_status IS NULL OR a.status = $2)
              AND ($3::test_type IS NULL OR t.type = $3)
            "#,
        )
        .bind(user_id)
        .bind(filter.status)
        .bind(filter.test_type)
        .fetch_one(&self.pool)
        .await?;

        let mut test_ids: Vec<Uuid> = attempts.iter().map(|a| a.test_id).collect();
        test_ids.sort();
        test_ids.dedup();
        let summaries = self.test_summaries(test_ids).await?;

        let items = attempts
            .into_iter()
            .filter_map(|a| summaries.get(&a.test_id).cloned().map(|s| (a, s)))
            .collect();

        Ok(AttemptPage { items, total })
    }

    async fn list_answers(&self, attempt_id: Uuid) -> Result<Vec<Answer>> {
        let answers = sqlx::query_as::<_, Answer>(
            r#"SELECT * FROM answers WHERE test_attempt_id = $1 ORDER BY created_at ASC"#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(answers)
    }

    async fn upsert_answer(&self, answer: AnswerWrite, now: DateTime<Utc>) -> Result<Option<Answer>> {
        // One statement: the status guard, the revision bump and the upsert
        // commit together, and the row lock serializes writers per attempt.
        let stored = sqlx::query_as::<_, Answer>(
            r#"
            WITH live AS (
                UPDATE test_attempts
                SET revision = revision + 1, updated_at = $10
                WHERE id = $1 AND status = 'in-progress'
                RETURNING id
            )
            INSERT INTO answers (
                id, test_attempt_id, question_id, answer_text, selected_options,
                is_correct, score, time_spent, audio_recording, created_at, updated_at
            )
            SELECT $2, live.id, $3, $4, $5, $6, $7, $8, $9, $10, $10 FROM live
            ON CONFLICT (test_attempt_id, question_id) DO UPDATE SET
                answer_text = EXCLUDED.answer_text,
                selected_options = EXCLUDED.selected_options,
                is_correct = EXCLUDED.is_correct,
                score = EXCLUDED.score,
                time_spent = EXCLUDED.time_spent,
                audio_recording = EXCLUDED.audio_recording,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(answer.test_attempt_id)
        .bind(Uuid::new_v4())
        .bind(answer.question_id)
        .bind(answer.answer_text)
        .bind(answer.selected_options)
        .bind(answer.is_correct)
        .bind(answer.score)
        .bind(answer.time_spent)
        .bind(answer.audio_recording)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(stored)
    }

    async fn transition_attempt(
        &self,
        attempt_id: Uuid,
        from: AttemptStatus,
        expected_revision: Option<i32>,
        transition: &AttemptTransition,
        now: DateTime<Utc>,
    ) -> Result<Option<TestAttempt>> {
        let Some(mut next) = self.get_attempt(attempt_id).await? else {
            return Ok(None);
        };
        transition.apply(&mut next, now);

        let updated = sqlx::query_as::<_, TestAttempt>(
            r#"
            UPDATE test_attempts
            SET status = $4, end_time = $5, total_score = $6, band_score = $7,
                feedback = $8, feedback_by = $9, feedback_date = $10, updated_at = $11
            WHERE id = $1 AND status = $2 AND ($3::int IS NULL OR revision = $3)
            RETURNING *
            "#,
        )
        .bind(attempt_id)
        .bind(from)
        .bind(expected_revision)
        .bind(next.status)
        .bind(next.end_time)
        .bind(next.total_score)
        .bind(next.band_score)
        .bind(next.feedback)
        .bind(next.feedback_by)
        .bind(next.feedback_date)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }
}
