use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::dto::attempt_dto::SubmitAnswerRequest;
use crate::error::{Error, Result};
use crate::models::answer::AnswerWrite;
use crate::models::question::{choice_set, pair_entries, AnswerKey, GradingKind, Question};

/// Comparison rule for matching / fill-blank sub-items. The default is exact
/// string equality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchPolicy {
    pub trim_whitespace: bool,
    pub ignore_case: bool,
}

impl MatchPolicy {
    pub fn matches(&self, expected: &str, submitted: &str) -> bool {
        let (expected, submitted) = if self.trim_whitespace {
            (expected.trim(), submitted.trim())
        } else {
            (expected, submitted)
        };
        if self.ignore_case {
            expected.to_lowercase() == submitted.to_lowercase()
        } else {
            expected == submitted
        }
    }
}

/// A submission decoded according to the question's grading kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Choice(BTreeSet<String>),
    Pairs(BTreeMap<String, String>),
    Open(Option<JsonValue>),
}

impl ResponsePayload {
    /// The normalized form persisted as the answer's selected options.
    pub fn to_stored(&self) -> Option<JsonValue> {
        match self {
            ResponsePayload::Choice(set) => Some(JsonValue::from(
                set.iter().cloned().collect::<Vec<String>>(),
            )),
            ResponsePayload::Pairs(map) => Some(JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
                    .collect(),
            )),
            ResponsePayload::Open(raw) => raw.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grade {
    pub is_correct: Option<bool>,
    pub score: Option<f64>,
}

impl Grade {
    pub const PENDING: Grade = Grade {
        is_correct: None,
        score: None,
    };
}

pub struct GradingService;

impl GradingService {
    /// Decodes `selected_options` for the question. A missing payload on an
    /// objective question is an empty selection.
    pub fn parse_response(
        question: &Question,
        selected_options: Option<&JsonValue>,
    ) -> Result<ResponsePayload> {
        let selected = selected_options.filter(|v| !v.is_null());
        match question.question_type.grading_kind() {
            GradingKind::Manual => Ok(ResponsePayload::Open(selected.cloned())),
            GradingKind::Choice => match selected {
                None => Ok(ResponsePayload::Choice(BTreeSet::new())),
                Some(raw) => choice_set(raw).map(ResponsePayload::Choice).ok_or_else(|| {
                    Error::Validation(
                        "selected_options must be an option or a list of options".to_string(),
                    )
                }),
            },
            GradingKind::KeyMatch => {
                let entries = match selected {
                    None => BTreeMap::new(),
                    Some(raw) => pair_entries(raw).ok_or_else(|| {
                        Error::Validation(
                            "selected_options must map each item to an answer".to_string(),
                        )
                    })?,
                };
                if let Some(AnswerKey::Pairs(expected)) = &question.correct_answer {
                    if let Some(unknown) = entries.keys().find(|k| !expected.contains_key(*k)) {
                        return Err(Error::Validation(format!(
                            "'{}' is not an item of this question",
                            unknown
                        )));
                    }
                }
                // Blank items earn nothing for that item.
                let submitted: BTreeMap<String, String> = entries
                    .into_iter()
                    .filter_map(|(k, v)| v.map(|v| (k, v)))
                    .collect();
                Ok(ResponsePayload::Pairs(submitted))
            }
        }
    }

    pub fn grade(question: &Question, response: &ResponsePayload, policy: MatchPolicy) -> Result<Grade> {
        match (response, &question.correct_answer) {
            (ResponsePayload::Open(_), _) => Ok(Grade::PENDING),
            (ResponsePayload::Choice(selected), Some(AnswerKey::Choices(expected))) => {
                let is_correct = selected.len() == expected.len() && selected == expected;
                Ok(Grade {
                    is_correct: Some(is_correct),
                    score: Some(if is_correct { question.marks } else { 0.0 }),
                })
            }
            (ResponsePayload::Pairs(submitted), Some(AnswerKey::Pairs(expected))) => {
                Ok(Self::grade_pairs(question, submitted, expected, policy))
            }
            (_, None) => Err(Error::Internal(format!(
                "question {} has no answer key",
                question.id
            ))),
            _ => Err(Error::Internal(format!(
                "answer key of question {} does not fit its type",
                question.id
            ))),
        }
    }

    fn grade_pairs(
        question: &Question,
        submitted: &BTreeMap<String, String>,
        expected: &BTreeMap<String, String>,
        policy: MatchPolicy,
    ) -> Grade {
        let total = expected.len();
        if total == 0 {
            tracing::warn!(question_id = %question.id, "answer key has no items, scoring zero");
            return Grade {
                is_correct: Some(false),
                score: Some(0.0),
            };
        }

        let matched = expected
            .iter()
            .filter(|(item, want)| {
                submitted
                    .get(*item)
                    .is_some_and(|got| policy.matches(want, got))
            })
            .count();

        Grade {
            is_correct: Some(matched == total),
            score: Some(matched as f64 / total as f64 * question.marks),
        }
    }

    /// Grades a submission and shapes the row to upsert.
    pub fn evaluate(
        attempt_id: Uuid,
        question: &Question,
        req: &SubmitAnswerRequest,
        policy: MatchPolicy,
    ) -> Result<AnswerWrite> {
        let response = Self::parse_response(question, req.selected_options.as_ref())?;
        let grade = Self::grade(question, &response, policy)?;

        Ok(AnswerWrite {
            test_attempt_id: attempt_id,
            question_id: question.id,
            answer_text: req.answer_text.clone(),
            selected_options: response.to_stored(),
            is_correct: grade.is_correct,
            score: grade.score,
            time_spent: req.time_spent,
            audio_recording: req.audio_recording.clone(),
        })
    }
}
