use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::answer::Answer;
use crate::models::question::Question;
use crate::models::test::TestWithQuestions;
use crate::models::test_attempt::AttemptTransition;

pub const MAX_BAND: f64 = 9.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub total_score: f64,
    pub total_possible: f64,
    /// Fraction in [0, 1].
    pub percentage: f64,
    pub band_score: f64,
    pub answered_questions: usize,
    pub total_questions: usize,
}

impl ScoreSummary {
    /// Percentage with two decimals, e.g. `70.00`.
    pub fn percentage_score(&self) -> Decimal {
        Decimal::from_f64(self.percentage * 100.0)
            .unwrap_or(Decimal::ZERO)
            .round_dp(2)
    }
}

pub struct ScoringService;

impl ScoringService {
    /// Maps a fraction to a band in half steps: the fractional part of
    /// `percentage * 9` rounds down below .25, to .5 below .75, else up.
    pub fn band_score(percentage: f64) -> f64 {
        let percentage = if percentage.is_finite() {
            percentage.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let raw = percentage * MAX_BAND;
        let whole = raw.floor();
        let frac = raw - whole;
        let band = if frac >= 0.75 {
            whole + 1.0
        } else if frac >= 0.25 {
            whole + 0.5
        } else {
            whole
        };
        band.min(MAX_BAND)
    }

    pub fn summarize(test: &TestWithQuestions, answers: &[Answer]) -> ScoreSummary {
        let questions: HashMap<Uuid, &Question> =
            test.questions.iter().map(|q| (q.id, q)).collect();

        let total_possible = test.total_marks();
        let mut total_score = 0.0;
        let mut answered_questions = 0;

        for answer in answers {
            let Some(question) = questions.get(&answer.question_id) else {
                continue;
            };
            answered_questions += 1;
            if question.question_type.is_objective() {
                total_score += answer.score.unwrap_or(0.0);
            }
        }

        let percentage = if total_possible > 0.0 {
            (total_score / total_possible).clamp(0.0, 1.0)
        } else {
            0.0
        };

        ScoreSummary {
            total_score,
            total_possible,
            percentage,
            band_score: Self::band_score(percentage),
            answered_questions,
            total_questions: test.questions.len(),
        }
    }

    /// Objective tests finalize immediately; writing and speaking wait for a
    /// reviewer and carry no band yet.
    pub fn completion_transition(
        test: &TestWithQuestions,
        summary: &ScoreSummary,
        now: DateTime<Utc>,
    ) -> AttemptTransition {
        if test.test.test_type.requires_review() {
            AttemptTransition::Submit { end_time: now }
        } else {
            AttemptTransition::Complete {
                end_time: now,
                total_score: summary.total_score,
                band_score: summary.band_score,
            }
        }
    }

    /// Reviewer bands must sit on the 0..=9 half-step scale.
    pub fn is_valid_band(band: f64) -> bool {
        band.is_finite() && (0.0..=MAX_BAND).contains(&band) && (band * 2.0).fract() == 0.0
    }
}
