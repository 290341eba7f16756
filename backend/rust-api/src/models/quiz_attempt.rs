use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::bson_datetime_as_chrono;
use super::quiz::AnswerValue;

/// One submitted attempt, stored in MongoDB "quizattempts" collection.
/// Never modified after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    #[serde(rename = "_id")]
    pub id: String,
    pub quiz_id: String,
    pub user_id: String,
    pub course_id: String,
    pub answers: Vec<GradedAnswer>,
    pub score: u32,
    pub total_points: u32,
    pub percentage: u32,
    pub passed: bool,
    /// Seconds.
    pub time_spent: u64,
    #[serde(with = "bson_datetime_as_chrono")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub submitted_at: DateTime<Utc>,
    pub attempt_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedAnswer {
    pub question_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_answer: Option<AnswerValue>,
    pub is_correct: bool,
    pub points_earned: u32,
}

/// An answer as posted by the client. Older clients send `answer`
/// instead of `userAnswer`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    #[serde(default)]
    pub user_answer: Option<AnswerValue>,
    #[serde(default)]
    pub answer: Option<AnswerValue>,
}

impl SubmittedAnswer {
    pub fn value(&self) -> Option<&AnswerValue> {
        self.user_answer.as_ref().or(self.answer.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttemptRequest {
    #[serde(default)]
    pub answers: Vec<SubmittedAnswer>,
    #[serde(default)]
    #[validate(range(
        min = 0.0,
        max = 31_536_000.0,
        message = "timeSpent must be between 0 and one year of seconds"
    ))]
    pub time_spent: Option<f64>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

/// Submission response. `results` and `answers` depend on the quiz's
/// display settings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub attempt_id: String,
    pub score: u32,
    pub total_points: u32,
    pub percentage: u32,
    pub passed: bool,
    pub attempt_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<AttemptScoreCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answers: Option<Vec<RevealedAnswer>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptScoreCard {
    pub score: u32,
    pub total_points: u32,
    pub percentage: u32,
    pub passed: bool,
    pub time_spent: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealedAnswer {
    #[serde(flatten)]
    pub graded: GradedAnswer,
    pub correct_answer: Option<AnswerValue>,
    pub explanation: Option<String>,
}

/// A learner's own attempt history entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub quiz_id: String,
    pub quiz_title: Option<String>,
    pub score: u32,
    pub total_points: u32,
    pub percentage: u32,
    pub passed: bool,
    pub time_spent: u64,
    pub submitted_at: DateTime<Utc>,
    pub attempt_number: u32,
}

/// Aggregate figures over every attempt of one quiz
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizStatistics {
    pub total_participants: usize,
    pub total_attempts: usize,
    pub average_score: f64,
    pub pass_rate: f64,
    pub average_time: u64,
    pub highest_score: Option<u32>,
    pub lowest_score: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttemptRow {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub student_name: Option<String>,
    pub student_email: Option<String>,
    pub score: u32,
    pub percentage: u32,
    pub passed: bool,
    pub attempt_number: u32,
    pub time_spent: u64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResultsHeader {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub course_title: Option<String>,
    pub total_points: u32,
    pub passing_score: u32,
    pub question_count: usize,
    pub duration: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResults {
    pub quiz: QuizResultsHeader,
    pub statistics: QuizStatistics,
    pub attempts: Vec<StudentAttemptRow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_legacy_answer_field() {
        let legacy: SubmittedAnswer =
            serde_json::from_value(serde_json::json!({ "questionId": "q1", "answer": "Paris" })).unwrap();
        assert_eq!(legacy.value(), Some(&AnswerValue::Text("Paris".into())));

        let current: SubmittedAnswer = serde_json::from_value(
            serde_json::json!({ "questionId": "q1", "userAnswer": 2, "answer": "ignored" }),
        )
        .unwrap();
        assert_eq!(current.value(), Some(&AnswerValue::Index(2)));
    }
}
