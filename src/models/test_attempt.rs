use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "attempt_status", rename_all = "kebab-case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Submitted,
    Reviewed,
}

impl AttemptStatus {
    /// The only transitions an attempt may take:
    /// in-progress -> completed | submitted, submitted -> reviewed.
    pub fn can_transition_to(self, next: AttemptStatus) -> bool {
        matches!(
            (self, next),
            (AttemptStatus::InProgress, AttemptStatus::Completed)
                | (AttemptStatus::InProgress, AttemptStatus::Submitted)
                | (AttemptStatus::Submitted, AttemptStatus::Reviewed)
        )
    }

    pub fn accepts_answers(self) -> bool {
        self == AttemptStatus::InProgress
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in-progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::Reviewed => "reviewed",
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestAttempt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub test_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: AttemptStatus,
    pub total_score: Option<f64>,
    pub band_score: Option<f64>,
    pub feedback: Option<String>,
    pub feedback_by: Option<Uuid>,
    pub feedback_date: Option<DateTime<Utc>>,
    /// Bumped by every answer write; completion checks it hasn't moved.
    pub revision: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestAttempt {
    pub fn new_in_progress(user_id: Uuid, test_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            test_id,
            start_time: now,
            end_time: None,
            status: AttemptStatus::InProgress,
            total_score: None,
            band_score: None,
            feedback: None,
            feedback_by: None,
            feedback_date: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields written when an attempt changes status.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptTransition {
    Complete {
        end_time: DateTime<Utc>,
        total_score: f64,
        band_score: f64,
    },
    Submit {
        end_time: DateTime<Utc>,
    },
    Review {
        band_score: f64,
        feedback: Option<String>,
        feedback_by: Uuid,
        feedback_date: DateTime<Utc>,
    },
}

impl AttemptTransition {
    pub fn target(&self) -> AttemptStatus {
        match self {
            AttemptTransition::Complete { .. } => AttemptStatus::Completed,
            AttemptTransition::Submit { .. } => AttemptStatus::Submitted,
            AttemptTransition::Review { .. } => AttemptStatus::Reviewed,
        }
    }

    /// Applies the transition to an in-memory copy of the attempt.
    pub fn apply(&self, attempt: &mut TestAttempt, now: DateTime<Utc>) {
        attempt.status = self.target();
        attempt.updated_at = now;
        match self {
            AttemptTransition::Complete {
                end_time,
                total_score,
                band_score,
            } => {
                attempt.end_time = Some(*end_time);
                attempt.total_score = Some(*total_score);
                attempt.band_score = Some(*band_score);
            }
            AttemptTransition::Submit { end_time } => {
                attempt.end_time = Some(*end_time);
            }
            AttemptTransition::Review {
                band_score,
                feedback,
                feedback_by,
                feedback_date,
            } => {
                attempt.band_score = Some(*band_score);
                attempt.feedback = feedback.clone();
                attempt.feedback_by = Some(*feedback_by);
                attempt.feedback_date = Some(*feedback_date);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [AttemptStatus; 4] = [
        AttemptStatus::InProgress,
        AttemptStatus::Completed,
        AttemptStatus::Submitted,
        AttemptStatus::Reviewed,
    ];

    #[test]
    fn transition_table_is_closed() {
        let allowed: Vec<(AttemptStatus, AttemptStatus)> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();
        assert_eq!(
            allowed,
            vec![
                (AttemptStatus::InProgress, AttemptStatus::Completed),
                (AttemptStatus::InProgress, AttemptStatus::Submitted),
                (AttemptStatus::Submitted, AttemptStatus::Reviewed),
            ]
        );
    }

    #[test]
    fn nothing_returns_to_in_progress() {
        for from in ALL {
            assert!(!from.can_transition_to(AttemptStatus::InProgress));
        }
    }

    #[test]
    fn status_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(AttemptStatus::InProgress).unwrap(),
            serde_json::json!("in-progress")
        );
        assert_eq!(AttemptStatus::Reviewed.to_string(), "reviewed");
    }

    #[test]
    fn submit_leaves_band_unset() {
        let now = Utc::now();
        let mut attempt = TestAttempt::new_in_progress(Uuid::new_v4(), Uuid::new_v4(), now);
        AttemptTransition::Submit { end_time: now }.apply(&mut attempt, now);
        assert_eq!(attempt.status, AttemptStatus::Submitted);
        assert!(attempt.band_score.is_none());
        assert!(attempt.total_score.is_none());
        assert_eq!(attempt.end_time, Some(now));
    }
}
