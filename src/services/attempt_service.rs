use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::dto::attempt_dto::{AttemptDetail, ReviewAttemptRequest, SubmitAnswerRequest};
use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::test::TestWithQuestions;
use crate::models::test_attempt::{AttemptStatus, AttemptTransition, TestAttempt};
use crate::services::grading_service::{GradingService, MatchPolicy};
use crate::services::scoring_service::{ScoreSummary, ScoringService};
use crate::store::{AttemptFilter, AttemptPage, AttemptStore, TestCatalog};

/// How many times completion recomputes the score when answers land
/// between reading them and flipping the status.
const COMPLETION_TRIES: usize = 3;

/// The authenticated caller as handed over by the identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub is_privileged: bool,
}

#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub attempt: TestAttempt,
    pub test: TestWithQuestions,
    pub resumed: bool,
}

#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub attempt: TestAttempt,
    pub summary: ScoreSummary,
}

#[derive(Clone)]
pub struct AttemptService {
    catalog: Arc<dyn TestCatalog>,
    store: Arc<dyn AttemptStore>,
    match_policy: MatchPolicy,
}

impl AttemptService {
    pub fn new(
        catalog: Arc<dyn TestCatalog>,
        store: Arc<dyn AttemptStore>,
        match_policy: MatchPolicy,
    ) -> Self {
        Self {
            catalog,
            store,
            match_policy,
        }
    }

    async fn load_test(&self, test_id: Uuid, reveal_answer_keys: bool) -> Result<TestWithQuestions> {
        self.catalog
            .get_test_with_questions(test_id, reveal_answer_keys)
            .await?
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))
    }

    /// The attempt, if it exists and belongs to `user_id`. Someone else's
    /// attempt looks exactly like a missing one.
    async fn owned_attempt(&self, attempt_id: Uuid, user_id: Uuid) -> Result<TestAttempt> {
        self.store
            .get_attempt(attempt_id)
            .await?
            .filter(|a| a.user_id == user_id)
            .ok_or_else(|| Error::NotFound("Test attempt not found or not authorized".to_string()))
    }

    pub async fn start_attempt(&self, caller: Caller, test_id: Uuid) -> Result<StartOutcome> {
        let test = self.load_test(test_id, caller.is_privileged).await?;
        if !test.test.is_active && !caller.is_privileged {
            return Err(Error::Forbidden(
                "You do not have permission to access this test".to_string(),
            ));
        }

        let (attempt, created) = self
            .store
            .find_or_start_attempt(caller.user_id, test_id, Utc::now())
            .await?;

        if created {
            tracing::info!(attempt_id = %attempt.id, user_id = %caller.user_id, %test_id, "attempt started");
        } else {
            tracing::info!(attempt_id = %attempt.id, user_id = %caller.user_id, %test_id, "attempt resumed");
        }

        Ok(StartOutcome {
            attempt,
            test,
            resumed: !created,
        })
    }

    pub async fn submit_answer(
        &self,
        attempt_id: Uuid,
        user_id: Uuid,
        req: SubmitAnswerRequest,
    ) -> Result<Answer> {
        req.validate()?;
        let attempt = self.owned_attempt(attempt_id, user_id).await?;
        if !attempt.status.accepts_answers() {
            return Err(Error::InvalidState(
                "This test attempt is no longer in progress".to_string(),
            ));
        }

        let test = self.load_test(attempt.test_id, true).await?;
        let question = test
            .question(req.question_id)
            .ok_or_else(|| Error::NotFound("Question not found in this test".to_string()))?;

        let write = GradingService::evaluate(attempt.id, question, &req, self.match_policy)?;
        let (is_correct, score) = (write.is_correct, write.score);

        // The store re-checks the status in the same statement as the write.
        let answer = self
            .store
            .upsert_answer(write, Utc::now())
            .await?
            .ok_or_else(|| {
                Error::InvalidState("This test attempt is no longer in progress".to_string())
            })?;

        tracing::debug!(
            %attempt_id,
            question_id = %question.id,
            question_type = ?question.question_type,
            ?is_correct,
            ?score,
            "answer graded"
        );
        Ok(answer)
    }

    pub async fn complete_attempt(&self, attempt_id: Uuid, user_id: Uuid) -> Result<CompletionOutcome> {
        let mut attempt = self.owned_attempt(attempt_id, user_id).await?;
        let test = self.load_test(attempt.test_id, false).await?;

        for _ in 0..COMPLETION_TRIES {
            if attempt.status != AttemptStatus::InProgress {
                return Err(Error::InvalidState(
                    "This test attempt is already completed".to_string(),
                ));
            }

            let answers = self.store.list_answers(attempt.id).await?;
            let summary = ScoringService::summarize(&test, &answers);
            let now = Utc::now();
            let transition = ScoringService::completion_transition(&test, &summary, now);
            ensure_transition(attempt.status, &transition)?;

            if let Some(updated) = self
                .store
                .transition_attempt(
                    attempt.id,
                    AttemptStatus::InProgress,
                    Some(attempt.revision),
                    &transition,
                    now,
                )
                .await?
            {
                tracing::info!(
                    %attempt_id,
                    status = %updated.status,
                    total_score = summary.total_score,
                    total_possible = summary.total_possible,
                    band_score = ?updated.band_score,
                    "attempt finished"
                );
                return Ok(CompletionOutcome {
                    attempt: updated,
                    summary,
                });
            }

            tracing::warn!(%attempt_id, "attempt changed during completion, rescoring");
            attempt = self.owned_attempt(attempt_id, user_id).await?;
        }

        Err(Error::Conflict(
            "Answers kept arriving while completing the attempt, please retry".to_string(),
        ))
    }

    /// Records a reviewer's band. Callers must have checked the reviewer is
    /// privileged.
    pub async fn review_attempt(
        &self,
        attempt_id: Uuid,
        reviewer_id: Uuid,
        req: ReviewAttemptRequest,
    ) -> Result<TestAttempt> {
        req.validate()?;
        if !ScoringService::is_valid_band(req.band_score) {
            return Err(Error::Validation(
                "band_score must be between 0 and 9 in steps of 0.5".to_string(),
            ));
        }

        let attempt = self
            .store
            .get_attempt(attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound("Test attempt not found".to_string()))?;
        let test = self.load_test(attempt.test_id, false).await?;

        if !test.test.test_type.requires_review() {
            return Err(Error::InvalidState(
                "Only writing and speaking tests can be reviewed".to_string(),
            ));
        }

        if !attempt.status.can_transition_to(AttemptStatus::Reviewed) {
            return Err(Error::InvalidState(
                "Only submitted tests can be reviewed".to_string(),
            ));
        }

        let now = Utc::now();
        let transition = AttemptTransition::Review {
            band_score: req.band_score,
            feedback: req.feedback,
            feedback_by: reviewer_id,
            feedback_date: now,
        };
        ensure_transition(attempt.status, &transition)?;

        let reviewed = self
            .store
            .transition_attempt(attempt.id, AttemptStatus::Submitted, None, &transition, now)
            .await?
            .ok_or_else(|| Error::InvalidState("Only submitted tests can be reviewed".to_string()))?;

        tracing::info!(%attempt_id, %reviewer_id, band_score = req.band_score, "attempt reviewed");
        Ok(reviewed)
    }

    pub async fn list_attempts(&self, user_id: Uuid, filter: &AttemptFilter) -> Result<AttemptPage> {
        filter.offset()?;
        self.store.list_attempts(user_id, filter).await
    }

    /// The attempt with its test and answers, for its owner or a privileged
    /// caller. Keys stay hidden from the owner until the attempt is finished.
    pub async fn get_attempt(&self, attempt_id: Uuid, caller: Caller) -> Result<AttemptDetail> {
        let attempt = self
            .store
            .get_attempt(attempt_id)
            .await?
            .filter(|a| caller.is_privileged || a.user_id == caller.user_id)
            .ok_or_else(|| Error::NotFound("Test attempt not found or not authorized".to_string()))?;

        let reveal = caller.is_privileged || attempt.status != AttemptStatus::InProgress;
        let test = self.load_test(attempt.test_id, reveal).await?;
        let answers = self.store.list_answers(attempt.id).await?;

        Ok(AttemptDetail {
            attempt,
            test,
            answers,
        })
    }
}

fn ensure_transition(current: AttemptStatus, transition: &AttemptTransition) -> Result<()> {
    let next = transition.target();
    if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(Error::InvalidState(format!(
            "Cannot move a {} attempt to {}",
            current, next
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{AnswerKey, Question, QuestionType};
    use crate::models::test::{DifficultyLevel, Test, TestType};
    use crate::store::{MockAttemptStore, MockTestCatalog};
    use std::collections::BTreeSet;

    fn catalog_test(is_active: bool) -> TestWithQuestions {
        let test_id = Uuid::new_v4();
        TestWithQuestions {
            test: Test {
                id: test_id,
                title: "Academic Reading 1".into(),
                description: None,
                test_type: TestType::Reading,
                difficulty_level: DifficultyLevel::Medium,
                duration_minutes: 60,
                instructions: None,
                is_active,
                is_premium: false,
                created_at: None,
                updated_at: None,
            },
            questions: vec![Question {
                id: Uuid::new_v4(),
                test_id,
                question_text: "Pick B".into(),
                question_type: QuestionType::MultipleChoice,
                options: None,
                correct_answer: Some(AnswerKey::Choices(BTreeSet::from(["B".to_string()]))),
                marks: 1.0,
                explanation: None,
                difficulty: DifficultyLevel::Easy,
                section: None,
                audio_file: None,
                image_file: None,
                order_index: 0,
            }],
        }
    }

    fn service(catalog: MockTestCatalog, store: MockAttemptStore) -> AttemptService {
        AttemptService::new(Arc::new(catalog), Arc::new(store), MatchPolicy::default())
    }

    #[tokio::test]
    async fn inactive_test_is_forbidden_for_regular_users() {
        let test = catalog_test(false);
        let test_id = test.test.id;
        let mut catalog = MockTestCatalog::new();
        catalog
            .expect_get_test_with_questions()
            .withf(|_, reveal| !*reveal)
            .returning(move |_, _| Ok(Some(test.clone().without_answer_keys())));
        // No store expectations: reaching the store would panic.
        let svc = service(catalog, MockAttemptStore::new());

        let caller = Caller {
            user_id: Uuid::new_v4(),
            is_privileged: false,
        };
        let err = svc.start_attempt(caller, test_id).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn privileged_callers_see_keys_and_inactive_tests() {
        let test = catalog_test(false);
        let test_id = test.test.id;
        let mut catalog = MockTestCatalog::new();
        catalog
            .expect_get_test_with_questions()
            .withf(|_, reveal| *reveal)
            .returning(move |_, _| Ok(Some(test.clone())));
        let mut store = MockAttemptStore::new();
        store
            .expect_find_or_start_attempt()
            .times(1)
            .returning(|user_id, test_id, now| {
                Ok((TestAttempt::new_in_progress(user_id, test_id, now), true))
            });
        let svc = service(catalog, store);

        let caller = Caller {
            user_id: Uuid::new_v4(),
            is_privileged: true,
        };
        let outcome = svc.start_attempt(caller, test_id).await.unwrap();
        assert!(!outcome.resumed);
        assert!(outcome.test.questions[0].correct_answer.is_some());
    }

    #[tokio::test]
    async fn unknown_test_is_not_found() {
        let mut catalog = MockTestCatalog::new();
        catalog
            .expect_get_test_with_questions()
            .returning(|_, _| Ok(None));
        let svc = service(catalog, MockAttemptStore::new());
        let caller = Caller {
            user_id: Uuid::new_v4(),
            is_privileged: false,
        };
        let err = svc.start_attempt(caller, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn storage_failures_surface_as_generic_errors() {
        let mut store = MockAttemptStore::new();
        store
            .expect_get_attempt()
            .returning(|_| Err(Error::Database(sqlx::Error::PoolTimedOut)));
        let svc = service(MockTestCatalog::new(), store);

        let err = svc
            .complete_attempt(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        assert!(!err.is_domain());
    }

    #[tokio::test]
    async fn completion_rescores_when_an_answer_slips_in() {
        let test = catalog_test(true);
        let test_id = test.test.id;
        let user_id = Uuid::new_v4();
        let attempt = TestAttempt::new_in_progress(user_id, test_id, Utc::now());
        let attempt_id = attempt.id;

        let mut catalog = MockTestCatalog::new();
        catalog
            .expect_get_test_with_questions()
            .returning(move |_, _| Ok(Some(test.clone())));

        let mut store = MockAttemptStore::new();
        let mut seen = attempt.clone();
        store.expect_get_attempt().returning(move |_| {
            let current = seen.clone();
            // Each reload observes one more concurrent answer.
            seen.revision += 1;
            Ok(Some(current))
        });
        store.expect_list_answers().returning(|_| Ok(vec![]));
        let mut calls = 0;
        store
            .expect_transition_attempt()
            .times(2)
            .returning(move |_, _, revision, transition, now| {
                calls += 1;
                if calls == 1 {
                    return Ok(None);
                }
                assert_eq!(revision, Some(1));
                let mut done = attempt.clone();
                transition.apply(&mut done, now);
                Ok(Some(done))
            });
        let svc = service(catalog, store);

        let outcome = svc.complete_attempt(attempt_id, user_id).await.unwrap();
        assert_eq!(outcome.attempt.status, AttemptStatus::Completed);
        assert_eq!(outcome.attempt.band_score, Some(0.0));
    }

    #[test]
    fn transitions_outside_the_table_are_rejected() {
        let review = AttemptTransition::Review {
            band_score: 6.0,
            feedback: None,
            feedback_by: Uuid::new_v4(),
            feedback_date: Utc::now(),
        };
        assert!(ensure_transition(AttemptStatus::Submitted, &review).is_ok());
        assert!(matches!(
            ensure_transition(AttemptStatus::Completed, &review),
            Err(Error::InvalidState(_))
        ));
    }
}
