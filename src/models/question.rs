use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::test::DifficultyLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "question_type", rename_all = "kebab-case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    Matching,
    FillBlank,
    Essay,
    ShortAnswer,
    SpeakingPrompt,
}

/// How a question type is graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradingKind {
    /// Selected options compared as a set against the key.
    Choice,
    /// Sub-item map compared entry by entry, partial credit.
    KeyMatch,
    /// Left for a human reviewer.
    Manual,
}

impl QuestionType {
    pub fn grading_kind(self) -> GradingKind {
        match self {
            QuestionType::MultipleChoice | QuestionType::TrueFalse => GradingKind::Choice,
            QuestionType::Matching | QuestionType::FillBlank => GradingKind::KeyMatch,
            QuestionType::Essay | QuestionType::ShortAnswer | QuestionType::SpeakingPrompt => {
                GradingKind::Manual
            }
        }
    }

    pub fn is_objective(self) -> bool {
        self.grading_kind() != GradingKind::Manual
    }
}

/// Stored correct answer, shaped by the question's grading kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerKey {
    Choices(BTreeSet<String>),
    Pairs(BTreeMap<String, String>),
}

impl AnswerKey {
    /// Reads a raw catalog key for the given question type. Subjective
    /// types never carry a key.
    pub fn from_json(question_type: QuestionType, raw: &JsonValue) -> Result<Option<Self>, String> {
        match question_type.grading_kind() {
            GradingKind::Manual => Ok(None),
            GradingKind::Choice => choice_set(raw)
                .map(|set| Some(AnswerKey::Choices(set)))
                .ok_or_else(|| format!("answer key for {:?} must be a list of options", question_type)),
            GradingKind::KeyMatch => pair_map(raw)
                .map(|map| Some(AnswerKey::Pairs(map)))
                .ok_or_else(|| format!("answer key for {:?} must be an object", question_type)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub test_id: Uuid,
    pub question_text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub options: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<AnswerKey>,
    pub marks: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub difficulty: DifficultyLevel,
    pub section: Option<String>,
    pub audio_file: Option<String>,
    pub image_file: Option<String>,
    pub order_index: i32,
}

/// Normalizes a choice payload into a set. A lone string or boolean is a
/// one-element selection; a string holding a JSON array is unpacked.
pub fn choice_set(raw: &JsonValue) -> Option<BTreeSet<String>> {
    match raw {
        JsonValue::Array(items) => items.iter().map(scalar_text).collect(),
        JsonValue::String(s) => {
            if let Ok(JsonValue::Array(items)) = serde_json::from_str::<JsonValue>(s) {
                return items.iter().map(scalar_text).collect();
            }
            Some(BTreeSet::from([s.clone()]))
        }
        JsonValue::Bool(_) | JsonValue::Number(_) => scalar_text(raw).map(|s| BTreeSet::from([s])),
        _ => None,
    }
}

/// Normalizes a sub-item payload into a map. A string holding a JSON object
/// is unpacked; scalar values are stringified and `null` marks an item left
/// unanswered.
pub fn pair_entries(raw: &JsonValue) -> Option<BTreeMap<String, Option<String>>> {
    match raw {
        JsonValue::Object(entries) => entries
            .iter()
            .map(|(k, v)| match v {
                JsonValue::Null => Some((k.clone(), None)),
                other => scalar_text(other).map(|v| (k.clone(), Some(v))),
            })
            .collect(),
        JsonValue::String(s) => match serde_json::from_str::<JsonValue>(s) {
            Ok(parsed @ JsonValue::Object(_)) => pair_entries(&parsed),
            _ => None,
        },
        _ => None,
    }
}

/// Like [`pair_entries`] but every item must carry a value.
pub fn pair_map(raw: &JsonValue) -> Option<BTreeMap<String, String>> {
    pair_entries(raw)?
        .into_iter()
        .map(|(k, v)| v.map(|v| (k, v)))
        .collect()
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn grading_kind_per_type() {
        assert_eq!(QuestionType::TrueFalse.grading_kind(), GradingKind::Choice);
        assert_eq!(QuestionType::FillBlank.grading_kind(), GradingKind::KeyMatch);
        assert!(!QuestionType::SpeakingPrompt.is_objective());
        assert!(QuestionType::Matching.is_objective());
    }

    #[test]
    fn choice_payloads_normalize_to_sets() {
        assert_eq!(choice_set(&json!("B")), Some(BTreeSet::from(["B".to_string()])));
        assert_eq!(
            choice_set(&json!(["C", "A", "C"])),
            Some(BTreeSet::from(["A".to_string(), "C".to_string()]))
        );
        assert_eq!(
            choice_set(&json!("[\"A\",\"B\"]")),
            Some(BTreeSet::from(["A".to_string(), "B".to_string()]))
        );
        assert_eq!(choice_set(&json!(true)), Some(BTreeSet::from(["true".to_string()])));
        assert_eq!(choice_set(&json!({"a": 1})), None);
        assert_eq!(choice_set(&json!([["nested"]])), None);
    }

    #[test]
    fn pair_payloads_normalize_to_maps() {
        let map = pair_map(&json!({"1": "cat", "2": 3})).unwrap();
        assert_eq!(map.get("1").map(String::as_str), Some("cat"));
        assert_eq!(map.get("2").map(String::as_str), Some("3"));
        assert!(pair_map(&json!("{\"1\":\"cat\"}")).is_some());
        assert!(pair_map(&json!(["cat"])).is_none());
        assert!(pair_map(&json!("not json")).is_none());
    }

    #[test]
    fn null_items_are_unanswered_not_malformed() {
        let entries = pair_entries(&json!({"1": "cat", "2": null})).unwrap();
        assert_eq!(entries.get("1"), Some(&Some("cat".to_string())));
        assert_eq!(entries.get("2"), Some(&None));
        assert!(pair_entries(&json!({"1": ["cat"]})).is_none());
        // Answer keys may not leave an item blank.
        assert!(pair_map(&json!({"1": "cat", "2": null})).is_none());
    }

    #[test]
    fn subjective_types_have_no_key() {
        let key = AnswerKey::from_json(QuestionType::Essay, &json!("anything")).unwrap();
        assert!(key.is_none());
        assert!(AnswerKey::from_json(QuestionType::Matching, &json!(["x"])).is_err());
    }

    #[test]
    fn hidden_key_is_omitted_from_json() {
        let question = Question {
            id: Uuid::new_v4(),
            test_id: Uuid::new_v4(),
            question_text: "Pick one".into(),
            question_type: QuestionType::MultipleChoice,
            options: Some(json!(["A", "B"])),
            correct_answer: None,
            marks: 1.0,
            explanation: None,
            difficulty: DifficultyLevel::Medium,
            section: None,
            audio_file: None,
            image_file: None,
            order_index: 0,
        };
        let value = serde_json::to_value(&question).unwrap();
        assert!(value.get("correct_answer").is_none());
    }
}
