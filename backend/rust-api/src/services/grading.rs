//! Pure scoring rules for quiz attempts and the per-quiz statistics built
//! from them. Nothing here touches the store.

use std::collections::HashSet;

use crate::models::quiz::{AnswerValue, Question, QuestionType, Quiz};
use crate::models::quiz_attempt::{GradedAnswer, QuizAttempt, QuizStatistics, SubmittedAnswer};

#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub answers: Vec<GradedAnswer>,
    pub score: u32,
    pub percentage: u32,
    pub passed: bool,
}

/// Whether `answer` is correct for `question`.
///
/// Multiple-choice and true/false compare values exactly. Short answers
/// compare trimmed, case-folded text; a list-valued key accepts any of its
/// entries.
pub fn is_correct(question: &Question, answer: Option<&AnswerValue>) -> bool {
    let Some(answer) = answer else {
        return false;
    };
    match question.kind {
        QuestionType::MultipleChoice | QuestionType::TrueFalse => *answer == question.correct_answer,
        QuestionType::ShortAnswer => {
            let Some(given) = answer.as_text() else {
                return false;
            };
            let given = normalize(given);
            match &question.correct_answer {
                AnswerValue::Text(expected) => normalize(expected) == given,
                AnswerValue::Choices(accepted) => accepted.iter().any(|a| normalize(a) == given),
                _ => false,
            }
        }
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// round(100 * score / total); 0 when the quiz carries no points.
pub fn score_percentage(score: u32, total_points: u32) -> u32 {
    if total_points == 0 {
        return 0;
    }
    (f64::from(score) / f64::from(total_points) * 100.0).round() as u32
}

/// Grades a submission. Answers naming an unknown question are dropped, and
/// only the first answer per question counts.
pub fn grade(quiz: &Quiz, submitted: &[SubmittedAnswer]) -> Grade {
    let mut seen = HashSet::new();
    let mut score = 0;

    let answers: Vec<GradedAnswer> = submitted
        .iter()
        .filter_map(|answer| {
            let question = quiz.question(&answer.question_id)?;
            if !seen.insert(question.id.as_str()) {
                return None;
            }
            let value = answer.value();
            let is_correct = is_correct(question, value);
            let points_earned = if is_correct { question.points } else { 0 };
            score += points_earned;
            Some(GradedAnswer {
                question_id: question.id.clone(),
                user_answer: value.cloned(),
                is_correct,
                points_earned,
            })
        })
        .collect();

    let percentage = score_percentage(score, quiz.total_points);
    Grade {
        answers,
        score,
        percentage,
        passed: percentage >= quiz.passing_score,
    }
}

fn one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn statistics(attempts: &[QuizAttempt]) -> QuizStatistics {
    let total_attempts = attempts.len();
    let total_participants = attempts
        .iter()
        .map(|a| a.user_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    if total_attempts == 0 {
        return QuizStatistics {
            total_participants,
            total_attempts,
            average_score: 0.0,
            pass_rate: 0.0,
            average_time: 0,
            highest_score: None,
            lowest_score: None,
        };
    }

    let count = total_attempts as f64;
    let score_sum: f64 = attempts.iter().map(|a| f64::from(a.percentage)).sum();
    let passed = attempts.iter().filter(|a| a.passed).count() as f64;
    let time_sum: f64 = attempts.iter().map(|a| a.time_spent as f64).sum();

    QuizStatistics {
        total_participants,
        total_attempts,
        average_score: one_decimal(score_sum / count),
        pass_rate: one_decimal(passed / count * 100.0),
        average_time: (time_sum / count).round() as u64,
        highest_score: attempts.iter().map(|a| a.percentage).max(),
        lowest_score: attempts.iter().map(|a| a.percentage).min(),
    }
}
