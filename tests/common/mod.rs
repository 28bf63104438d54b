#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};

use exam_backend::models::question::{AnswerKey, Question, QuestionType};
use exam_backend::models::test::{DifficultyLevel, Test, TestType, TestWithQuestions};
use uuid::Uuid;

pub fn choices(keys: &[&str]) -> AnswerKey {
    AnswerKey::Choices(keys.iter().map(|k| k.to_string()).collect::<BTreeSet<_>>())
}

pub fn pairs(entries: &[(&str, &str)]) -> AnswerKey {
    AnswerKey::Pairs(
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    )
}

pub fn build_test(
    test_type: TestType,
    is_active: bool,
    questions: Vec<(QuestionType, f64, Option<AnswerKey>)>,
) -> TestWithQuestions {
    let test_id = Uuid::new_v4();
    TestWithQuestions {
        test: Test {
            id: test_id,
            title: format!("{} practice", test_type.as_str()),
            description: None,
            test_type,
            difficulty_level: DifficultyLevel::Medium,
            duration_minutes: 60,
            instructions: Some("Answer every question".into()),
            is_active,
            is_premium: false,
            created_at: None,
            updated_at: None,
        },
        questions: questions
            .into_iter()
            .enumerate()
            .map(|(idx, (question_type, marks, key))| Question {
                id: Uuid::new_v4(),
                test_id,
                question_text: format!("Question {}", idx + 1),
                question_type,
                options: None,
                correct_answer: key,
                marks,
                explanation: Some("Because the passage says so".into()),
                difficulty: DifficultyLevel::Medium,
                section: Some("Section 1".into()),
                audio_file: None,
                image_file: None,
                order_index: idx as i32,
            })
            .collect(),
    }
}

/// Four objective questions worth 10 marks in total:
/// MC (2, "B"), fill-blank (4, 1=cat 2=dog), true/false (3, "true"), MC (1, "A").
pub fn reading_test() -> TestWithQuestions {
    build_test(
        TestType::Reading,
        true,
        vec![
            (QuestionType::MultipleChoice, 2.0, Some(choices(&["B"]))),
            (
                QuestionType::FillBlank,
                4.0,
                Some(pairs(&[("1", "cat"), ("2", "dog")])),
            ),
            (QuestionType::TrueFalse, 3.0, Some(choices(&["true"]))),
            (QuestionType::MultipleChoice, 1.0, Some(choices(&["A"]))),
        ],
    )
}

pub fn writing_test() -> TestWithQuestions {
    build_test(
        TestType::Writing,
        true,
        vec![(QuestionType::Essay, 1.0, None)],
    )
}
