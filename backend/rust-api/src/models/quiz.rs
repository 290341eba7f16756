use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::{Validate, ValidationError};

use super::bson_datetime_as_chrono;

/// Quiz model stored in MongoDB "quizzes" collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    #[serde(rename = "_id")]
    pub id: String,
    pub course_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub questions: Vec<Question>,
    /// Minutes.
    pub duration: u32,
    /// Percent required to pass.
    pub passing_score: u32,
    pub total_points: u32,
    /// Attempt cap, `-1` for unlimited.
    pub attempts: i32,
    pub show_results: bool,
    pub show_correct_answers: bool,
    pub randomize_questions: bool,
    pub is_published: bool,
    pub created_by: String,
    #[serde(with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

pub const UNLIMITED_ATTEMPTS: i32 = -1;

impl Quiz {
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// Whether a user with `prior_attempts` submissions may start another.
    pub fn allows_attempt(&self, prior_attempts: u64) -> bool {
        self.attempts == UNLIMITED_ATTEMPTS || prior_attempts < self.attempts.max(0) as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub question: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub correct_answer: AnswerValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub points: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

/// An answer as stored on a question or submitted by a learner.
///
/// Option indexes, literal option text, booleans and lists of accepted
/// strings all occur in practice, so the value is kept untyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Flag(bool),
    Index(i64),
    Text(String),
    Choices(Vec<String>),
}

impl AnswerValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInput {
    #[serde(default)]
    pub id: Option<String>,
    #[validate(length(min = 1, message = "Question text is required"))]
    pub question: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    pub correct_answer: AnswerValue,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1, message = "Question points must be at least 1"))]
    pub points: Option<u32>,
}

/// Display settings accepted either flat or under `settings`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSettings {
    pub show_results: Option<bool>,
    pub show_correct_answers: Option<bool>,
    pub randomize_questions: Option<bool>,
}

/// Request DTO for creating or fully replacing a quiz
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_quiz_input"))]
pub struct QuizInput {
    #[validate(length(min = 1, message = "courseId is required"))]
    pub course_id: String,
    #[serde(default)]
    pub module_id: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: Option<String>,
    #[validate(length(min = 1, message = "A quiz needs at least one question"), nested)]
    pub questions: Vec<QuestionInput>,
    #[serde(default)]
    #[validate(range(min = 1, message = "Duration must be positive"))]
    pub duration: Option<u32>,
    #[serde(default)]
    #[validate(range(max = 100, message = "Passing score must be between 0 and 100"))]
    pub passing_score: Option<u32>,
    #[serde(default, alias = "maxAttempts")]
    pub attempts: Option<i32>,
    #[serde(default)]
    pub show_results: Option<bool>,
    #[serde(default)]
    pub show_correct_answers: Option<bool>,
    #[serde(default)]
    pub randomize_questions: Option<bool>,
    #[serde(default)]
    pub settings: Option<QuizSettings>,
}

fn validate_quiz_input(input: &QuizInput) -> Result<(), ValidationError> {
    if let Some(attempts) = input.attempts {
        if attempts != UNLIMITED_ATTEMPTS && attempts < 1 {
            return Err(message_error("attempts", "Attempts must be -1 (unlimited) or at least 1"));
        }
    }

    let mut seen = HashSet::new();
    for (index, question) in input.questions.iter().enumerate() {
        let id = question.id.clone().unwrap_or_else(|| default_question_id(index));
        if !seen.insert(id.clone()) {
            return Err(message_error(
                "questions",
                &format!("Question id '{}' appears more than once", id),
            ));
        }
        if question.kind == QuestionType::MultipleChoice
            && question.options.as_ref().map_or(true, |o| o.len() < 2)
        {
            return Err(message_error(
                "questions",
                &format!("Multiple-choice question '{}' needs at least two options", id),
            ));
        }
    }
    Ok(())
}

fn message_error(code: &'static str, message: &str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.to_string().into());
    err
}

fn default_question_id(index: usize) -> String {
    format!("q{}", index + 1)
}

impl QuizInput {
    fn setting(flat: Option<bool>, nested: Option<bool>, default: bool) -> bool {
        flat.or(nested).unwrap_or(default)
    }

    /// Applies defaults and builds the question list with computed total points.
    pub fn into_quiz(
        self,
        id: String,
        created_by: String,
        is_published: bool,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Quiz {
        let settings = self.settings.unwrap_or_default();
        let questions: Vec<Question> = self
            .questions
            .into_iter()
            .enumerate()
            .map(|(index, q)| Question {
                id: q.id.unwrap_or_else(|| default_question_id(index)),
                question: q.question,
                kind: q.kind,
                options: q.options,
                correct_answer: q.correct_answer,
                explanation: q.explanation,
                points: q.points.unwrap_or(1),
            })
            .collect();
        let total_points = questions.iter().map(|q| q.points).sum();

        Quiz {
            id,
            course_id: self.course_id,
            module_id: self.module_id.filter(|m| !m.is_empty()),
            title: self.title.trim().to_string(),
            description: self.description,
            instructions: self.instructions,
            questions,
            duration: self.duration.unwrap_or(30),
            passing_score: self.passing_score.unwrap_or(70),
            total_points,
            attempts: self.attempts.unwrap_or(3),
            show_results: Self::setting(self.show_results, settings.show_results, true),
            show_correct_answers: Self::setting(
                self.show_correct_answers,
                settings.show_correct_answers,
                true,
            ),
            randomize_questions: Self::setting(
                self.randomize_questions,
                settings.randomize_questions,
                false,
            ),
            is_published,
            created_by,
            created_at,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub is_published: bool,
}

/// Admin listing entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub course_id: String,
    pub course_title: String,
    pub duration: u32,
    pub total_points: u32,
    pub passing_score: u32,
    pub question_count: usize,
    pub total_attempts: u64,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

/// Learner listing entry for one course
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseQuizSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub module_id: Option<String>,
    pub description: String,
    pub duration: u32,
    pub total_points: u32,
    pub passing_score: u32,
    pub question_count: usize,
    pub attempts: u64,
    pub max_attempts: i32,
    pub is_published: bool,
}

/// Full admin view used for editing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizDetail {
    #[serde(rename = "_id")]
    pub id: String,
    pub course_id: String,
    pub module_id: Option<String>,
    pub title: String,
    pub description: String,
    pub instructions: Option<String>,
    pub questions: Vec<Question>,
    pub duration: u32,
    pub passing_score: u32,
    pub max_attempts: i32,
    pub settings: QuizSettingsView,
    pub total_points: u32,
    pub is_published: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSettingsView {
    pub show_results: bool,
    pub show_correct_answers: bool,
    pub randomize_questions: bool,
}

impl From<Quiz> for QuizDetail {
    fn from(quiz: Quiz) -> Self {
        Self {
            id: quiz.id,
            course_id: quiz.course_id,
            module_id: quiz.module_id,
            title: quiz.title,
            description: quiz.description,
            instructions: quiz.instructions,
            questions: quiz.questions,
            duration: quiz.duration,
            passing_score: quiz.passing_score,
            max_attempts: quiz.attempts,
            settings: QuizSettingsView {
                show_results: quiz.show_results,
                show_correct_answers: quiz.show_correct_answers,
                randomize_questions: quiz.randomize_questions,
            },
            total_points: quiz.total_points,
            is_published: quiz.is_published,
            created_by: quiz.created_by,
            created_at: quiz.created_at,
            updated_at: quiz.updated_at,
        }
    }
}

/// A question with its answer key removed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionForTaking {
    pub id: String,
    pub question: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub options: Option<Vec<String>>,
    pub points: u32,
}

impl From<&Question> for QuestionForTaking {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            question: q.question.clone(),
            kind: q.kind,
            options: q.options.clone(),
            points: q.points,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizForTaking {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub instructions: Option<String>,
    pub questions: Vec<QuestionForTaking>,
    pub duration: u32,
    pub total_points: u32,
    pub passing_score: u32,
    pub current_attempt: u64,
    pub max_attempts: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(questions: serde_json::Value) -> QuizInput {
        serde_json::from_value(serde_json::json!({
            "courseId": "course-1",
            "title": "  Ownership basics ",
            "questions": questions,
        }))
        .unwrap()
    }

    #[test]
    fn applies_defaults_and_total_points() {
        let quiz = input(serde_json::json!([
            { "question": "Is Rust memory safe?", "type": "true-false", "correctAnswer": true },
            { "question": "Pick the borrow", "type": "multiple-choice",
              "options": ["&x", "x"], "correctAnswer": 0, "points": 3 }
        ]))
        .into_quiz("quiz-1".into(), "admin".into(), false, Utc::now(), Utc::now());

        assert_eq!(quiz.title, "Ownership basics");
        assert_eq!(quiz.questions[0].id, "q1");
        assert_eq!(quiz.questions[1].id, "q2");
        assert_eq!(quiz.total_points, 4);
        assert_eq!(quiz.duration, 30);
        assert_eq!(quiz.passing_score, 70);
        assert_eq!(quiz.attempts, 3);
        assert!(quiz.show_results && quiz.show_correct_answers);
        assert!(!quiz.randomize_questions);
        assert_eq!(quiz.questions[1].correct_answer, AnswerValue::Index(0));
    }

    #[test]
    fn nested_settings_and_max_attempts_alias() {
        let quiz: QuizInput = serde_json::from_value(serde_json::json!({
            "courseId": "c",
            "title": "t",
            "maxAttempts": -1,
            "settings": { "randomizeQuestions": true, "showCorrectAnswers": false },
            "questions": [{ "question": "q", "type": "short-answer", "correctAnswer": "x" }]
        }))
        .unwrap();
        assert!(quiz.validate().is_ok());
        let quiz = quiz.into_quiz("id".into(), "a".into(), true, Utc::now(), Utc::now());
        assert_eq!(quiz.attempts, UNLIMITED_ATTEMPTS);
        assert!(quiz.randomize_questions);
        assert!(!quiz.show_correct_answers);
        assert!(quiz.allows_attempt(1_000));
    }

    #[test]
    fn rejects_invalid_definitions() {
        let dup = input(serde_json::json!([
            { "id": "a", "question": "1", "type": "short-answer", "correctAnswer": "x" },
            { "id": "a", "question": "2", "type": "short-answer", "correctAnswer": "y" }
        ]));
        assert!(dup.validate().is_err());

        let no_options = input(serde_json::json!([
            { "question": "1", "type": "multiple-choice", "correctAnswer": 0 }
        ]));
        assert!(no_options.validate().is_err());

        let mut zero_attempts = input(serde_json::json!([
            { "question": "1", "type": "true-false", "correctAnswer": false }
        ]));
        zero_attempts.attempts = Some(0);
        assert!(zero_attempts.validate().is_err());

        let empty = input(serde_json::json!([]));
        assert!(empty.validate().is_err());
    }

    #[test]
    fn question_entries_are_validated() {
        let zero_points = input(serde_json::json!([
            { "question": "1", "type": "true-false", "correctAnswer": false, "points": 0 }
        ]));
        assert!(zero_points.validate().is_err());

        let one_point = input(serde_json::json!([
            { "question": "1", "type": "true-false", "correctAnswer": false, "points": 1 }
        ]));
        assert!(one_point.validate().is_ok());
    }

    #[test]
    fn attempt_cap() {
        let mut quiz = input(serde_json::json!([
            { "question": "1", "type": "true-false", "correctAnswer": false }
        ]))
        .into_quiz("id".into(), "a".into(), true, Utc::now(), Utc::now());
        quiz.attempts = 2;
        assert!(quiz.allows_attempt(1));
        assert!(!quiz.allows_attempt(2));
    }
}
